//! The control unit: fetch/decode/execute loop, PC advancement, and the
//! run/step/halt state machine.

#![allow(clippy::cast_possible_truncation)]

use crate::api::{
    HaltReason, NullTrace, RunOutcome, RunStatus, SimulatorConfig, StepOutcome, TraceEvent,
    TraceSink,
};
use crate::decoder::Decoder;
use crate::exec::{self, ControlEffect};
use crate::fault::{ConfigError, TrapCause};
use crate::memory::{AddressSpace, DeviceBus, NoDevices, Word, WORD_BYTES};
use crate::state::{RegisterFile, RunState};
use crate::trap::{Trap, TrapController, TrapState};

/// One simulated core: register file, address space, trap controller, and
/// the stepping state machine.
///
/// A simulator owns its state exclusively; modeling multiple cores means
/// multiple independent instances driven by an external scheduler. `step`
/// and `run` are synchronous, bounded computations with no internal
/// suspension points.
#[derive(Debug)]
pub struct Simulator {
    regs: RegisterFile,
    mem: AddressSpace,
    traps: TrapController,
    run_state: RunState,
    halt: Option<HaltReason>,
    initial_pc: Word,
    retired: u64,
}

impl Simulator {
    /// Creates a simulator over a configured address space.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidVector`] when a configured trap vector
    /// does not point at executable mapped memory.
    pub fn new(mem: AddressSpace, config: SimulatorConfig) -> Result<Self, ConfigError> {
        for (cause, handler) in config.vectors.configured() {
            if !mem.is_executable(handler) {
                return Err(ConfigError::InvalidVector {
                    cause,
                    target: handler,
                });
            }
        }

        let mut regs = RegisterFile::new();
        regs.set_pc(config.initial_pc);

        Ok(Self {
            regs,
            mem,
            traps: TrapController::new(config.vectors),
            run_state: RunState::Ready,
            halt: None,
            initial_pc: config.initial_pc,
            retired: 0,
        })
    }

    /// Executes one atomic fetch/decode/execute(/trap) cycle.
    pub fn step(&mut self) -> StepOutcome {
        self.step_observed(&mut NoDevices, &mut NullTrace)
    }

    /// Executes one step, resolving device regions through `bus`.
    pub fn step_with(&mut self, bus: &mut dyn DeviceBus) -> StepOutcome {
        self.step_observed(bus, &mut NullTrace)
    }

    /// Executes one step, reporting trace events to `sink`.
    ///
    /// A step ends `Retired` (back in `Ready`), `Trapped` (redirected to a
    /// handler), or `Halted`. No partial register or memory mutation is
    /// observable when the step ends in a fault.
    pub fn step_observed(
        &mut self,
        bus: &mut dyn DeviceBus,
        sink: &mut dyn TraceSink,
    ) -> StepOutcome {
        if let Some(reason) = self.halt {
            return StepOutcome::Halted(reason);
        }

        self.run_state = RunState::Fetching;
        let pc = self.regs.pc();

        let primary = match self.mem.fetch(pc) {
            Ok(word) => word,
            Err(fault) => return self.take_trap(Trap::new(fault.cause, fault.addr), pc, sink),
        };
        sink.on_event(TraceEvent::Fetched { pc, word: primary });

        let extension = if Decoder::wants_extension(primary) {
            let ext_pc = pc.wrapping_add(WORD_BYTES as Word);
            match self.mem.fetch(ext_pc) {
                Ok(word) => Some(word),
                Err(fault) => {
                    return self.take_trap(Trap::new(fault.cause, fault.addr), pc, sink)
                }
            }
        } else {
            None
        };

        self.run_state = RunState::Decoding;
        let decoded = match Decoder::decode(primary, extension) {
            Ok(decoded) => decoded,
            Err(_) => {
                return self.take_trap(Trap::new(TrapCause::IllegalInstruction, primary), pc, sink)
            }
        };

        self.run_state = RunState::Executing;
        let update = match exec::execute(&decoded, pc, &self.regs, &self.mem, bus) {
            Ok(update) => update,
            Err(trap) => {
                // Faults save the trapping instruction's address; ECALL saves
                // the following one so TRET resumes past the call.
                let saved_pc = if trap.cause == TrapCause::EnvironmentCall {
                    pc.wrapping_add(decoded.length())
                } else {
                    pc
                };
                return self.take_trap(trap, saved_pc, sink);
            }
        };

        // Trap-return carries no other effects; resolve it before any
        // mutation so a failing TRET leaves the step side-effect free.
        if update.effect == ControlEffect::TrapReturn {
            return match self.traps.trap_return(&mut self.regs) {
                Ok(_) => self.retire(pc, decoded.length(), sink),
                Err(trap) => self.take_trap(trap, pc, sink),
            };
        }

        if let Some((addr, width, value)) = update.store {
            if let Err(fault) = self.mem.store(bus, addr, width, value) {
                return self.take_trap(Trap::new(fault.cause, fault.addr), pc, sink);
            }
        }
        if let Some((reg, value)) = update.write_back {
            self.regs.write(reg, value);
        }
        self.regs.set_pc(update.next_pc);

        match update.effect {
            ControlEffect::Halt => {
                self.retired += 1;
                self.halt = Some(HaltReason::Halt);
                self.run_state = RunState::Halted;
                sink.on_event(TraceEvent::Halted {
                    pc: self.regs.pc(),
                });
                StepOutcome::Halted(HaltReason::Halt)
            }
            ControlEffect::Advance | ControlEffect::TrapReturn => {
                self.retire(pc, decoded.length(), sink)
            }
        }
    }

    fn retire(&mut self, pc: Word, length: Word, sink: &mut dyn TraceSink) -> StepOutcome {
        self.retired += 1;
        self.run_state = RunState::Ready;
        sink.on_event(TraceEvent::Retired { pc, length });
        StepOutcome::Retired
    }

    fn take_trap(&mut self, trap: Trap, pc: Word, sink: &mut dyn TraceSink) -> StepOutcome {
        sink.on_event(TraceEvent::Trapped {
            cause: trap.cause,
            pc,
        });

        match self.traps.dispatch(trap, pc, &mut self.regs) {
            Some(_) => {
                self.run_state = RunState::Trapped(trap.cause);
                StepOutcome::Trapped { cause: trap.cause }
            }
            None => {
                let state = TrapState {
                    cause: trap.cause,
                    value: trap.value,
                    pc,
                    vector: None,
                };
                let reason = HaltReason::UnhandledTrap(state);
                self.halt = Some(reason);
                self.run_state = RunState::Halted;
                sink.on_event(TraceEvent::Halted { pc });
                StepOutcome::Halted(reason)
            }
        }
    }

    /// Repeats `step` until the simulator halts or `max_steps` runs out.
    pub fn run(&mut self, max_steps: u64) -> RunOutcome {
        self.run_with(max_steps, &mut NoDevices)
    }

    /// Runs with device regions resolved through `bus`.
    pub fn run_with(&mut self, max_steps: u64, bus: &mut dyn DeviceBus) -> RunOutcome {
        let mut steps = 0;

        while steps < max_steps && !self.run_state.is_terminal() {
            let outcome = self.step_with(bus);
            steps += 1;
            if let StepOutcome::Halted(reason) = outcome {
                return RunOutcome {
                    steps,
                    status: RunStatus::Halted(reason),
                };
            }
        }

        match self.halt {
            Some(reason) => RunOutcome {
                steps,
                status: RunStatus::Halted(reason),
            },
            None => RunOutcome {
                steps,
                status: RunStatus::OutOfFuel,
            },
        }
    }

    /// Resets registers, trap context, and the state machine to the initial
    /// configuration. The memory image is preserved.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.regs.set_pc(self.initial_pc);
        self.traps.reset();
        self.run_state = RunState::Ready;
        self.halt = None;
        self.retired = 0;
    }

    /// Read-only view of the register file.
    #[must_use]
    pub const fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// Mutable register access for loader pre-seeding.
    pub const fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    /// Read-only view of the address space.
    #[must_use]
    pub const fn memory(&self) -> &AddressSpace {
        &self.mem
    }

    /// Mutable address-space access for loader image writes.
    pub const fn memory_mut(&mut self) -> &mut AddressSpace {
        &mut self.mem
    }

    /// Current control-unit state.
    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Halt reason, when the simulator is halted.
    #[must_use]
    pub const fn halt_reason(&self) -> Option<&HaltReason> {
        self.halt.as_ref()
    }

    /// Most recently raised trap.
    #[must_use]
    pub const fn last_trap(&self) -> Option<&TrapState> {
        self.traps.last_trap()
    }

    /// Number of instructions retired since construction or reset.
    #[must_use]
    pub const fn steps_retired(&self) -> u64 {
        self.retired
    }
}
