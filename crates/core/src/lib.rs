// Core capability model for Waypost: registry, argument validation,
// the sandboxed expression evaluator and the dispatcher that ties them together.

pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod sandbox;
pub mod types;
pub mod validator;

pub use dispatcher::Dispatcher;
pub use error::{CapabilityError, RegistryError};
pub use registry::{CapabilityRegistry, Resolved, UriTemplate};
pub use sandbox::{EvalError, Sandbox, SandboxLimits, Value};
pub use types::*;
pub use validator::{SchemaValidator, UnknownArgumentPolicy};
