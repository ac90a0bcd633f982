//! Trap vectors, trap state, and dispatch.

use crate::fault::{TrapCause, TRAP_CAUSE_COUNT};
use crate::memory::Word;
use crate::state::RegisterFile;

/// A fault or system call raised while executing one instruction, before
/// dispatch has resolved it against the vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Trap {
    /// Trap cause.
    pub cause: TrapCause,
    /// Faulting address, offending instruction word, or zero.
    pub value: Word,
}

impl Trap {
    /// Creates a pending trap.
    #[must_use]
    pub const fn new(cause: TrapCause, value: Word) -> Self {
        Self { cause, value }
    }
}

/// A dispatched (or dispatch-failed) trap with its full context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TrapState {
    /// Trap cause.
    pub cause: TrapCause,
    /// Faulting address, offending instruction word, or zero.
    pub value: Word,
    /// PC of the trapping instruction.
    pub pc: Word,
    /// Handler entry the trap was dispatched to, `None` when no vector was
    /// configured.
    pub vector: Option<Word>,
}

/// Mapping from trap cause to handler entry address.
///
/// Supplied by the external loader at configuration time; causes without an
/// entry halt the simulator when raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct VectorTable {
    entries: [Option<Word>; TRAP_CAUSE_COUNT],
}

impl VectorTable {
    /// Creates a table with no vectors configured.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [None; TRAP_CAUSE_COUNT],
        }
    }

    /// Sets the handler entry for a cause.
    pub const fn set(&mut self, cause: TrapCause, handler: Word) {
        self.entries[cause as usize - 1] = Some(handler);
    }

    /// Returns the handler entry for a cause.
    #[must_use]
    pub const fn get(&self, cause: TrapCause) -> Option<Word> {
        self.entries[cause as usize - 1]
    }

    /// Iterates over the configured `(cause, handler)` pairs.
    pub fn configured(&self) -> impl Iterator<Item = (TrapCause, Word)> + '_ {
        TrapCause::ALL
            .into_iter()
            .filter_map(|cause| self.get(cause).map(|handler| (cause, handler)))
    }
}

/// Detects and dispatches traps, and manages trap-return.
///
/// Dispatch saves the trapping PC, cause, and value into the register file's
/// trap registers and redirects the PC to the handler vector. With a single
/// saved-context register set, a trap raised while a handler is active is
/// unrecoverable and reported as undispatchable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TrapController {
    vectors: VectorTable,
    in_handler: bool,
    last: Option<TrapState>,
}

impl TrapController {
    /// Creates a controller around a vector table.
    #[must_use]
    pub const fn new(vectors: VectorTable) -> Self {
        Self {
            vectors,
            in_handler: false,
            last: None,
        }
    }

    /// Returns the vector table.
    #[must_use]
    pub const fn vectors(&self) -> &VectorTable {
        &self.vectors
    }

    /// Returns the most recently raised trap, dispatched or not.
    #[must_use]
    pub const fn last_trap(&self) -> Option<&TrapState> {
        self.last.as_ref()
    }

    /// Returns whether a handler is currently active.
    #[must_use]
    pub const fn in_handler(&self) -> bool {
        self.in_handler
    }

    /// Records a raised trap and redirects control flow to its handler.
    ///
    /// On success the handler entry is returned and the register file holds
    /// the saved context. `None` means the trap cannot be dispatched (no
    /// vector configured, or a handler is already active) and the control
    /// unit must halt.
    pub fn dispatch(&mut self, trap: Trap, pc: Word, regs: &mut RegisterFile) -> Option<Word> {
        let vector = if self.in_handler {
            None
        } else {
            self.vectors.get(trap.cause)
        };

        self.last = Some(TrapState {
            cause: trap.cause,
            value: trap.value,
            pc,
            vector,
        });

        let handler = vector?;
        regs.set_tpc(pc);
        regs.set_tcause(Word::from(trap.cause.as_u8()));
        regs.set_tval(trap.value);
        regs.set_pc(handler);
        self.in_handler = true;

        Some(handler)
    }

    /// Executes trap-return: restores the PC from `tpc` and leaves the
    /// handler context.
    ///
    /// # Errors
    ///
    /// Returns an `IllegalInstruction` trap when no handler is active.
    pub fn trap_return(&mut self, regs: &mut RegisterFile) -> Result<Word, Trap> {
        if !self.in_handler {
            return Err(Trap::new(TrapCause::IllegalInstruction, 0));
        }

        self.in_handler = false;
        let resume = regs.tpc();
        regs.set_pc(resume);
        Ok(resume)
    }

    /// Clears the handler context and trap history, keeping the vectors.
    pub fn reset(&mut self) {
        self.in_handler = false;
        self.last = None;
    }
}
