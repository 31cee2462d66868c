//! Contract validation for step outputs.
//!
//! A failed contract is what triggers a rollback. This module provides:
//! - Contract descriptors and the [`ContractValidator`] trait
//! - JSON schema, template and test-suite validators
//! - A registry dispatching contracts to validators by kind

mod descriptor;
mod errors;
mod json_schema;
mod registry;
mod template;
mod test_suite;

pub use descriptor::{ContractDescriptor, ContractKind, ContractValidator};
pub use errors::{codes, ContractErrorInfo, FailureKind, ValidationFailure};
pub use json_schema::JsonSchemaValidator;
pub use registry::ValidatorRegistry;
pub use template::{FieldConstraint, TemplateSpec, TemplateType, TemplateValidator};
pub use test_suite::TestSuiteValidator;
