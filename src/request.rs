use std::fmt;

use derive_more::From;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

/// A single key-value attribute that the edge server may use during evaluation (e.g., a user id).
///
/// Both parts may be `null` on the wire; such entries are passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From)]
pub struct ContextEntry {
    /// Attribute name.
    pub key: Option<String>,
    /// Attribute value.
    pub value: Option<String>,
}

impl ContextEntry {
    /// Create a new context entry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> ContextEntry {
        ContextEntry {
            key: Some(key.into()),
            value: Some(value.into()),
        }
    }
}

/// Request describing one flag evaluation.
///
/// Requests are immutable once constructed. Credentials are optional and override the globally
/// configured ones when both a client id and a client secret are present.
///
/// Context is an ordered list of key-value pairs. Duplicate keys are allowed and the insertion
/// order is preserved on the wire.
///
/// # Examples
/// ```
/// # use fluxgate::EvaluationRequest;
/// let request = EvaluationRequest::with_context(
///     "new-checkout",
///     "prod",
///     [("userId", "123"), ("region", "us-east")],
/// )
/// .with_credentials("client-id", "client-secret");
/// assert_eq!(request.context().len(), 2);
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    feature_key: String,
    environment_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    context: Vec<ContextEntry>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

impl EvaluationRequest {
    /// Create a request without context and without credentials.
    pub fn new(
        feature_key: impl Into<String>,
        environment_id: impl Into<String>,
    ) -> EvaluationRequest {
        EvaluationRequest {
            feature_key: feature_key.into(),
            environment_id: environment_id.into(),
            context: Vec::new(),
            client_id: None,
            client_secret: None,
        }
    }

    /// Create a request with evaluation context. Pairs keep the iteration order of `context`.
    pub fn with_context<K, V>(
        feature_key: impl Into<String>,
        environment_id: impl Into<String>,
        context: impl IntoIterator<Item = (K, V)>,
    ) -> EvaluationRequest
    where
        K: Into<String>,
        V: Into<String>,
    {
        EvaluationRequest {
            context: context
                .into_iter()
                .map(|(key, value)| ContextEntry::new(key, value))
                .collect(),
            ..EvaluationRequest::new(feature_key, environment_id)
        }
    }

    /// Create a request from already-built context entries.
    pub fn with_entries(
        feature_key: impl Into<String>,
        environment_id: impl Into<String>,
        context: Vec<ContextEntry>,
    ) -> EvaluationRequest {
        EvaluationRequest {
            context,
            ..EvaluationRequest::new(feature_key, environment_id)
        }
    }

    /// Return a copy of this request carrying the given credentials.
    pub fn with_credentials(
        self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> EvaluationRequest {
        EvaluationRequest {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            ..self
        }
    }

    /// Identifier of the feature flag.
    pub fn feature_key(&self) -> &str {
        &self.feature_key
    }

    /// Identifier of the environment (e.g., `prod`, `staging`).
    pub fn environment_id(&self) -> &str {
        &self.environment_id
    }

    /// Evaluation context. Empty if none was provided.
    pub fn context(&self) -> &[ContextEntry] {
        &self.context
    }

    /// Per-request client id.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Per-request client secret.
    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    /// Returns `true` if both client id and client secret are present and non-blank.
    pub fn has_credentials(&self) -> bool {
        has_text(self.client_id()) && has_text(self.client_secret())
    }

    /// Check that the feature key and environment id are not blank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !has_text(Some(&self.feature_key[..])) {
            return Err(Error::InvalidArgument("feature key cannot be empty"));
        }
        if !has_text(Some(&self.environment_id[..])) {
            return Err(Error::InvalidArgument("environment id cannot be empty"));
        }
        Ok(())
    }
}

pub(crate) fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<ContextEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<ContextEntry>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// Client secret must never end up in logs.
impl fmt::Debug for EvaluationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationRequest")
            .field("feature_key", &self.feature_key)
            .field("environment_id", &self.environment_id)
            .field("context", &self.context)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl fmt::Display for EvaluationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "feature_key={}, environment_id={}",
            self.feature_key, self.environment_id
        )?;
        if !self.context.is_empty() {
            f.write_str(", context=[")?;
            for (i, entry) in self.context.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(
                    f,
                    "{}={}",
                    entry.key.as_deref().unwrap_or("null"),
                    entry.value.as_deref().unwrap_or("null")
                )?;
            }
            f.write_str("]")?;
        }
        if let Some(client_id) = &self.client_id {
            write!(f, ", client_id={client_id}")?;
        }
        if self.client_secret.is_some() {
            f.write_str(", client_secret=[REDACTED]")?;
        }
        Ok(())
    }
}
