//! Registry mapping contract kinds to validators.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::descriptor::{ContractDescriptor, ContractKind, ContractValidator};
use super::errors::{codes, ValidationFailure};
use super::json_schema::JsonSchemaValidator;
use super::template::TemplateValidator;
use super::test_suite::TestSuiteValidator;
use crate::config::ValidatorConfig;
use crate::observability::SpanTimer;

/// In-memory registry of contract validators, one per kind.
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: RwLock<HashMap<ContractKind, Arc<dyn ContractValidator>>>,
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ValidatorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in JSON schema, template and test-suite validators.
    #[must_use]
    pub fn with_defaults(config: ValidatorConfig) -> Self {
        let registry = Self::new();
        registry.register(Arc::new(JsonSchemaValidator::new()));
        registry.register(Arc::new(TemplateValidator::new()));
        registry.register(Arc::new(TestSuiteValidator::with_config(config)));
        registry
    }

    /// Registers a validator under its kind, returning the one it replaced.
    pub fn register(
        &self,
        validator: Arc<dyn ContractValidator>,
    ) -> Option<Arc<dyn ContractValidator>> {
        self.validators.write().insert(validator.kind(), validator)
    }

    /// Returns the validator for a kind.
    #[must_use]
    pub fn get(&self, kind: ContractKind) -> Option<Arc<dyn ContractValidator>> {
        self.validators.read().get(&kind).cloned()
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<ContractKind> {
        let mut kinds: Vec<_> = self.validators.read().keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Returns the number of registered validators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.read().len()
    }

    /// Returns true if no validator is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.read().is_empty()
    }

    /// Validates a step's output with the validator registered for the contract kind.
    ///
    /// A kind without a validator is a configuration failure.
    pub async fn validate(
        &self,
        contract: &ContractDescriptor,
        workspace: &Path,
    ) -> Result<(), ValidationFailure> {
        let validator = self.get(contract.kind).ok_or_else(|| {
            ValidationFailure::configuration(
                codes::UNKNOWN_KIND,
                format!("no validator registered for contract kind '{}'", contract.kind),
            )
        })?;

        let timer = SpanTimer::start(contract.kind.as_str());
        let result = validator.validate(contract, workspace).await;
        let duration_ms = timer.finish();

        match &result {
            Ok(()) => info!(kind = %contract.kind, duration_ms, "Contract satisfied"),
            Err(failure) => warn!(
                kind = %contract.kind,
                code = failure.code(),
                retryable = failure.retryable,
                duration_ms,
                "Contract failed: {}",
                failure.message
            ),
        }
        result
    }
}
