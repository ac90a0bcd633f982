//! Host-facing configuration, step/run outcome, and trace-hook types.

use crate::fault::TrapCause;
use crate::memory::Word;
use crate::trap::{TrapState, VectorTable};

/// Immutable configuration for a simulator instance, supplied by the
/// external loader and validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SimulatorConfig {
    /// Trap vector table; every entry is validated against the address
    /// space.
    pub vectors: VectorTable,
    /// Initial program counter.
    pub initial_pc: Word,
}

/// Why the simulator entered the terminal halted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum HaltReason {
    /// A `HLT` instruction retired.
    Halt,
    /// A trap was raised with no way to dispatch it; carries the full
    /// context (cause, faulting PC, and faulting address or word).
    UnhandledTrap(TrapState),
}

/// Status of one `step` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The instruction retired; the simulator is ready for the next step.
    Retired,
    /// A trap was dispatched to its handler; the next step resumes there.
    Trapped {
        /// Dispatched trap cause.
        cause: TrapCause,
    },
    /// The simulator is halted. Stepping a halted simulator returns this
    /// same outcome without executing anything.
    Halted(HaltReason),
}

/// Terminal status of a `run` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The simulator halted; no further progress is possible.
    Halted(HaltReason),
    /// The step budget ran out first.
    OutOfFuel,
}

/// Aggregate result of a `run` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Number of steps executed by this call.
    pub steps: u64,
    /// Terminal status.
    pub status: RunStatus,
}

/// Deterministic events emitted at step boundaries when a trace sink is
/// attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// An instruction word was fetched.
    Fetched {
        /// Fetch address.
        pc: Word,
        /// Raw primary instruction word.
        word: Word,
    },
    /// An instruction retired.
    Retired {
        /// Address of the retired instruction.
        pc: Word,
        /// Instruction length in bytes.
        length: Word,
    },
    /// A trap was raised (dispatched or not).
    Trapped {
        /// Trap cause.
        cause: TrapCause,
        /// PC of the trapping instruction.
        pc: Word,
    },
    /// The simulator halted.
    Halted {
        /// PC at the halt.
        pc: Word,
    },
}

/// Sink for deterministic trace hooks; events arrive in execution order.
pub trait TraceSink {
    /// Records one event.
    fn on_event(&mut self, event: TraceEvent);
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    fn on_event(&mut self, _event: TraceEvent) {}
}

#[cfg(test)]
mod tests {
    use super::{HaltReason, NullTrace, RunOutcome, RunStatus, SimulatorConfig, TraceSink};
    use crate::fault::TrapCause;
    use crate::trap::TrapState;

    #[test]
    fn default_config_has_no_vectors_and_boots_at_zero() {
        let config = SimulatorConfig::default();
        assert_eq!(config.initial_pc, 0);
        assert_eq!(config.vectors.configured().count(), 0);
    }

    #[test]
    fn unhandled_trap_reason_carries_full_context() {
        let state = TrapState {
            cause: TrapCause::AccessFault,
            value: 0x8000,
            pc: 0x0010,
            vector: None,
        };
        let RunOutcome { steps, status } = RunOutcome {
            steps: 3,
            status: RunStatus::Halted(HaltReason::UnhandledTrap(state)),
        };
        assert_eq!(steps, 3);
        match status {
            RunStatus::Halted(HaltReason::UnhandledTrap(trap)) => {
                assert_eq!(trap.cause, TrapCause::AccessFault);
                assert_eq!(trap.pc, 0x0010);
                assert_eq!(trap.value, 0x8000);
            }
            RunStatus::Halted(HaltReason::Halt) | RunStatus::OutOfFuel => {
                panic!("unexpected status")
            }
        }
    }

    #[test]
    fn null_trace_accepts_events() {
        let mut sink = NullTrace;
        sink.on_event(super::TraceEvent::Halted { pc: 0 });
    }
}
