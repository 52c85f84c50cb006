pub mod engine; // adaptive type inference and query repair engine
pub mod export_service;
pub mod llm_service;
pub mod session_registry;

pub use export_service::*;
pub use llm_service::*;
pub use session_registry::*;
