//! Workflow pipelines orchestrating stateless services.

pub mod context;
pub mod engine;

pub use context::{CmsContext, DigestTarget, SigningContext, SigningOptions};
pub use engine::ActionWorkflowEngine;
