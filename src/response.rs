use serde::{Deserialize, Deserializer, Serialize};

/// Body of a successful evaluation response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    /// Whether the feature is enabled. A body without this field, or with `null`, parses as
    /// `false`.
    #[serde(default, deserialize_with = "null_as_false")]
    pub enabled: bool,
}

impl EvaluationResponse {
    /// Create a new response.
    pub fn new(enabled: bool) -> EvaluationResponse {
        EvaluationResponse { enabled }
    }
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<bool>::deserialize(deserializer).map(Option::unwrap_or_default)
}
