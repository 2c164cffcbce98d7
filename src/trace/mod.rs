//! Interpretation of the agent runtime's trace stream.
//!
//! `interpreter` folds routing and orchestration records into per-turn state,
//! `assembler` drives one invocation stream and hands answer chunks to the
//! caller, and `notes` defines what gets rendered along the way.

pub mod assembler;
pub mod interpreter;
pub mod notes;

pub use assembler::{Invocation, ResponseChunk, extract_table_name};
pub use interpreter::{OrchestrationOutcome, RoutingState, TraceInterpreter};
pub use notes::{RoutingOutcome, TraceNote, TraceSink};

/// Escapes `$` so downstream markup never treats it as a math delimiter.
pub fn escape_markup(text: &str) -> String {
    text.replace('$', "\\$")
}
