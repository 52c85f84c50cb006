// Adaptive type inference and query repair engine
//
// The pipeline for one dataset: load CSV bytes all-text, narrow the schema
// by probabilistic column-type detection, then per query rewrite generator
// SQL for the engine's dialect, execute with a single-shot repair retry,
// and sanitize result rows for transport.

pub mod executor; // execution + repair loop
pub mod inference; // column type inference engine
pub mod normalizer; // dialect/type rewrite passes
pub mod sanitizer; // result row sanitizer
pub mod session; // tabular engine binding

pub use executor::QueryError;
pub use inference::{TypeDecision, TypeInferenceEngine};
pub use normalizer::QueryNormalizer;
pub use sanitizer::ResultSanitizer;
pub use session::{EngineConfig, TABLE_NAME};
