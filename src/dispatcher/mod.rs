pub mod core;
pub mod worker;


// Re-export the primary types so `crate::dispatcher::*` paths stay short.
pub use self::core::{BlockSummary, Dispatcher, RetireReport, ScriptId, ScriptState, ScriptStats};
pub use self::worker::ScriptFailure;
