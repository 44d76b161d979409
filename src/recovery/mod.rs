pub mod classifier;
pub mod dispatcher;
pub mod types;

#[cfg(test)]
pub mod tests;

pub use classifier::ErrorClassifier;
pub use dispatcher::RecoveryDispatcher;
pub use types::*;
