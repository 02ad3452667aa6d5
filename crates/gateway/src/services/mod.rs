pub mod audit;
pub mod circuit_breaker;
pub mod dispatcher;
pub mod registry;
pub mod vault;

pub use audit::AuditLog;
pub use circuit_breaker::CircuitBreaker;
pub use dispatcher::{DispatchResponse, Dispatcher, RequestBody, RequestOptions};
pub use registry::IntegrationRegistry;
pub use vault::Vault;
