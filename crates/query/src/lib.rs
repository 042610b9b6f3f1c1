pub mod hybrid;
pub mod prompt;
pub mod safety;

pub use hybrid::{Answer, HybridRetriever, NO_INFORMATION_ANSWER};
pub use safety::{CypherSafetyChecker, UnsafeQuery};
