pub mod dataset;
pub mod history;
pub mod query;

pub use dataset::*;
pub use history::*;
pub use query::*;
