//! Alert lifecycle: guarded transitions and the completed-work log.

/// Completed-work audit entries.
pub mod history;
/// Guarded transition engine.
pub mod machine;

pub use history::WorkHistoryEntry;
pub use machine::{AlertStateMachine, AlertView, TransitionOutcome};
