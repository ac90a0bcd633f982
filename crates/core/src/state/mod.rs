//! Architectural CPU state model primitives.

/// Architectural register file types and storage model.
pub mod registers;

/// Run/step/halt state machine of the control unit.
pub mod run_state;

pub use registers::{Register, RegisterFile, REGISTER_COUNT};
pub use run_state::RunState;
