//! Instruction-set simulator core for the YARISC architecture.
//!
//! The crate models one 16-bit little-endian core: a fetch/decode/execute
//! control unit, an eight-register file with a hardwired-zero `r0`, a
//! region-based address space, and synchronous trap handling. Programs are
//! loaded and vectors configured by an external collaborator through the
//! public API; malformed guest programs surface as simulated trap outcomes,
//! never as host panics.

/// Trap cause taxonomy and configuration-time errors.
pub mod fault;
pub use fault::{ConfigError, TrapCause, TrapClass, TRAP_CAUSE_COUNT};

/// Memory model primitives and the configurable address space.
pub mod memory;
pub use memory::{
    is_word_aligned, read_word_le, write_word_le, AccessWidth, AddressSpace, DeviceBus,
    DeviceError, MemoryFault, MemoryRegion, NoDevices, Permissions, RegionKind, Word,
    ADDRESS_SPACE_BYTES, WORD_BYTES,
};

/// Deterministic opcode and encoding classification tables.
pub mod encoding;
pub use encoding::{Opcode, OpcodeClass, OPCODE_TABLE};

/// Instruction decode pipeline with field extraction and validation.
pub mod decoder;
pub use decoder::{
    AluOp, BranchCond, DecodeError, DecodedInstruction, Decoder, JumpTarget, SystemOp,
};

/// Architectural CPU state model primitives.
pub mod state;
pub use state::{Register, RegisterFile, RunState, REGISTER_COUNT};

/// Instruction execution pipeline.
pub mod exec;
pub use exec::{alu_apply, execute, ControlEffect, Update};

/// Trap vectors, trap state, and dispatch.
pub mod trap;
pub use trap::{Trap, TrapController, TrapState, VectorTable};

/// Host-facing configuration, outcome, and trace-hook types.
pub mod api;
pub use api::{
    HaltReason, NullTrace, RunOutcome, RunStatus, SimulatorConfig, StepOutcome, TraceEvent,
    TraceSink,
};

/// The control unit owning the fetch/decode/execute loop.
pub mod control;
pub use control::Simulator;

/// Mnemonic rendering of decoded instructions.
pub mod disasm;
pub use disasm::{disassemble, disassemble_word};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
