pub mod process;
pub mod redact;

// Trait-based abstraction for testability
pub mod executor;

// Re-export commonly used types and traits (used by test crate)
pub use executor::{CommandExecutor, RealExecutor};
pub use process::{Attempt, Backoff, BackoffStrategy, CommandSpec, ExecutionPolicy, ProcessResult};
pub use redact::Redactor;
