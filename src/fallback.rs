//! Fallback and conditional-execution helpers.
//!
//! Only [`Error::Evaluation`] triggers fallback behavior. [`Error::InvalidArgument`] always
//! propagates since it points at a bug in the caller rather than at a degraded edge server.
use crate::{Client, Error, EvaluationRequest, Result};

impl Client {
    /// Check whether `feature_key` is enabled, returning `fallback` if the edge server cannot
    /// answer.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if either argument is empty.
    /// - [`Error::Evaluation`] if evaluation failed and fallback is disabled with
    ///   [`ClientConfig::fallback_enabled`](crate::ClientConfig::fallback_enabled).
    pub fn is_enabled_or(
        &self,
        feature_key: &str,
        environment_id: &str,
        fallback: bool,
    ) -> Result<bool> {
        self.evaluate_or(&EvaluationRequest::new(feature_key, environment_id), fallback)
    }

    /// Context-aware version of [`Client::is_enabled_or`].
    ///
    /// # Errors
    ///
    /// Same as [`Client::is_enabled_or`].
    pub fn is_enabled_with_context_or<K, V>(
        &self,
        feature_key: &str,
        environment_id: &str,
        context: impl IntoIterator<Item = (K, V)>,
        fallback: bool,
    ) -> Result<bool>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.evaluate_or(
            &EvaluationRequest::with_context(feature_key, environment_id, context),
            fallback,
        )
    }

    /// Evaluate `request`, returning `fallback` if the edge server cannot answer.
    ///
    /// # Examples
    /// ```no_run
    /// # fn test(client: &fluxgate::Client) -> fluxgate::Result<()> {
    /// use fluxgate::EvaluationRequest;
    ///
    /// let request = EvaluationRequest::with_context("new-checkout", "prod", [("userId", "123")]);
    /// if client.evaluate_or(&request, false)? {
    ///     // ...
    /// }
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Same as [`Client::is_enabled_or`].
    pub fn evaluate_or(&self, request: &EvaluationRequest, fallback: bool) -> Result<bool> {
        self.recover(request, self.evaluate(request), fallback)
    }

    /// Evaluate `request`, returning the configured
    /// [`default_fallback_value`](crate::ClientConfig::default_fallback_value) if the edge server
    /// cannot answer.
    ///
    /// # Errors
    ///
    /// Same as [`Client::is_enabled_or`].
    pub fn evaluate_or_default(&self, request: &EvaluationRequest) -> Result<bool> {
        self.evaluate_or(request, self.config.default_fallback_value)
    }

    /// Run `action` if `request` evaluates to `true`.
    ///
    /// Evaluation failures are logged and swallowed: `action` is simply not run.
    ///
    /// ```no_run
    /// # fn test(client: &fluxgate::Client) -> fluxgate::Result<()> {
    /// use fluxgate::EvaluationRequest;
    ///
    /// client.execute(&EvaluationRequest::new("audit-log", "prod"), || {
    ///     println!("audit logging is on");
    /// })?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the request is invalid. `action` is not run.
    pub fn execute(&self, request: &EvaluationRequest, action: impl FnOnce()) -> Result<()> {
        match self.evaluate(request) {
            Ok(true) => {
                action();
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(Error::Evaluation(err)) => {
                log::error!(target: "fluxgate",
                    feature_key = request.feature_key(),
                    environment_id = request.environment_id();
                    "skipping conditional action, feature evaluation failed: {}", err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Run `supplier` and return its value if `request` evaluates to `true`. Returns `Ok(None)`
    /// if the feature is disabled.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the request is invalid.
    /// - [`Error::Evaluation`] if evaluation failed. No fallback is applied.
    pub fn execute_and_return<T>(
        &self,
        request: &EvaluationRequest,
        supplier: impl FnOnce() -> T,
    ) -> Result<Option<T>> {
        Ok(self.evaluate(request)?.then(supplier))
    }

    /// Run `supplier` and return its value if `request` evaluates to `true`, otherwise return
    /// `fallback`. `fallback` is also returned if evaluation fails and fallback is enabled.
    ///
    /// # Errors
    ///
    /// Same as [`Client::is_enabled_or`].
    pub fn execute_and_return_or<T>(
        &self,
        request: &EvaluationRequest,
        supplier: impl FnOnce() -> T,
        fallback: T,
    ) -> Result<T> {
        if self.recover(request, self.evaluate(request), false)? {
            Ok(supplier())
        } else {
            Ok(fallback)
        }
    }

    /// Replace an evaluation failure with `fallback` when fallback is enabled.
    fn recover<T>(&self, request: &EvaluationRequest, result: Result<T>, fallback: T) -> Result<T> {
        match result {
            Err(Error::Evaluation(err)) if self.config.fallback_enabled => {
                log::warn!(target: "fluxgate",
                    feature_key = request.feature_key(),
                    environment_id = request.environment_id();
                    "feature evaluation failed, using fallback value: {}", err);
                Ok(fallback)
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use crate::{
        error::EvaluationErrorKind,
        test_support::{client, network_failure, ok_json, status, ScriptedTransport},
        ClientConfig, Error, EvaluationRequest,
    };

    #[derive(Debug, Clone, PartialEq)]
    struct Recommendation {
        product_ids: Vec<u64>,
        headline: String,
    }

    fn recommendation() -> Recommendation {
        Recommendation {
            product_ids: vec![17, 42],
            headline: "Picked for you".to_owned(),
        }
    }

    fn request() -> EvaluationRequest {
        EvaluationRequest::with_context("recommendations", "prod", [("userId", "123")])
    }

    #[test]
    fn fallback_value_replaces_evaluation_failures() {
        let transport = ScriptedTransport::repeating(network_failure());
        let client = client(&transport, ClientConfig::default());

        assert!(client.evaluate_or(&request(), true).unwrap());
        assert!(!client.evaluate_or(&request(), false).unwrap());
        assert!(client.is_enabled_or("feature", "prod", true).unwrap());
        assert!(client
            .is_enabled_with_context_or("feature", "prod", [("userId", "1")], true)
            .unwrap());
    }

    #[test]
    fn disabled_fallback_propagates_evaluation_failures() {
        let transport = ScriptedTransport::repeating(network_failure());
        let client = client(&transport, ClientConfig::default().fallback_enabled(false));

        let err = client.evaluate_or(&request(), true).unwrap_err();

        assert_eq!(
            err.as_evaluation_error().map(|e| e.kind()),
            Some(EvaluationErrorKind::Network)
        );
    }

    #[test]
    fn fallback_does_not_mask_successful_evaluation() {
        let transport = ScriptedTransport::repeating(ok_json(r#"{"enabled":false}"#));
        let client = client(&transport, ClientConfig::default());

        assert!(!client.evaluate_or(&request(), true).unwrap());
    }

    #[test]
    fn default_fallback_value_comes_from_config() {
        let transport = ScriptedTransport::repeating(status(500));
        let client = client(
            &transport,
            ClientConfig::default().default_fallback_value(true),
        );

        assert!(client.evaluate_or_default(&request()).unwrap());
    }

    #[test]
    fn invalid_arguments_are_never_replaced_by_fallback() {
        let transport = ScriptedTransport::repeating(network_failure());
        let client = client(&transport, ClientConfig::default());
        let invalid = EvaluationRequest::new("", "prod");
        let ran = Cell::new(false);

        assert!(client.evaluate_or(&invalid, true).unwrap_err().is_invalid_argument());
        assert!(client.evaluate_or_default(&invalid).unwrap_err().is_invalid_argument());
        assert!(client.is_enabled_or("feature", "", true).unwrap_err().is_invalid_argument());
        assert!(client
            .execute(&invalid, || ran.set(true))
            .unwrap_err()
            .is_invalid_argument());
        assert!(client
            .execute_and_return(&invalid, || ran.set(true))
            .unwrap_err()
            .is_invalid_argument());
        assert!(client
            .execute_and_return_or(&invalid, || ran.set(true), ())
            .unwrap_err()
            .is_invalid_argument());
        assert!(!ran.get());
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn execute_runs_action_only_when_enabled() {
        let enabled = ScriptedTransport::repeating(ok_json(r#"{"enabled":true}"#));
        let disabled = ScriptedTransport::repeating(ok_json(r#"{"enabled":false}"#));
        let ran = Cell::new(0);

        client(&enabled, ClientConfig::default())
            .execute(&request(), || ran.set(ran.get() + 1))
            .unwrap();
        client(&disabled, ClientConfig::default())
            .execute(&request(), || ran.set(ran.get() + 1))
            .unwrap();

        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn execute_swallows_evaluation_failures() {
        for response in [status(401), status(503), network_failure()] {
            let transport = ScriptedTransport::repeating(response);
            // Even with fallback disabled, execute never fails because of evaluation.
            let client = client(&transport, ClientConfig::default().fallback_enabled(false));
            let ran = Cell::new(false);

            client.execute(&request(), || ran.set(true)).unwrap();

            assert!(!ran.get());
        }
    }

    #[test]
    fn execute_and_return_supplies_value_when_enabled() {
        let transport = ScriptedTransport::repeating(ok_json(r#"{"enabled":true}"#));
        let client = client(&transport, ClientConfig::default());

        let value = client
            .execute_and_return(&request(), recommendation)
            .unwrap();

        assert_eq!(value, Some(recommendation()));
    }

    #[test]
    fn execute_and_return_is_absent_when_disabled() {
        let transport = ScriptedTransport::repeating(ok_json(r#"{"enabled":false}"#));
        let client = client(&transport, ClientConfig::default());

        let value = client
            .execute_and_return(&request(), || -> Recommendation {
                panic!("supplier must not run")
            })
            .unwrap();

        assert_eq!(value, None);
    }

    #[test]
    fn execute_and_return_propagates_evaluation_failures() {
        let transport = ScriptedTransport::repeating(status(404));
        // Fallback is enabled, but this call shape never applies it.
        let client = client(&transport, ClientConfig::default());

        let result = client.execute_and_return(&request(), recommendation);

        match result {
            Err(Error::Evaluation(err)) => {
                assert_eq!(err.kind(), EvaluationErrorKind::ClientError);
                assert_eq!(err.status_code(), Some(404));
                assert_eq!(err.feature_key(), Some("recommendations"));
            }
            other => panic!("expected evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn execute_and_return_or_chooses_between_supplier_and_fallback() {
        let fallback = Recommendation {
            product_ids: Vec::new(),
            headline: "Bestsellers".to_owned(),
        };
        let enabled = ScriptedTransport::repeating(ok_json(r#"{"enabled":true}"#));
        let disabled = ScriptedTransport::repeating(ok_json(r#"{"enabled":false}"#));
        let failing = ScriptedTransport::repeating(status(500));

        assert_eq!(
            client(&enabled, ClientConfig::default())
                .execute_and_return_or(&request(), recommendation, fallback.clone())
                .unwrap(),
            recommendation()
        );
        assert_eq!(
            client(&disabled, ClientConfig::default())
                .execute_and_return_or(&request(), recommendation, fallback.clone())
                .unwrap(),
            fallback
        );
        assert_eq!(
            client(&failing, ClientConfig::default())
                .execute_and_return_or(&request(), recommendation, fallback.clone())
                .unwrap(),
            fallback
        );
        assert!(client(&failing, ClientConfig::default().fallback_enabled(false))
            .execute_and_return_or(&request(), recommendation, fallback)
            .is_err());
    }
}
