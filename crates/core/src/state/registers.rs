//! Architectural register file.
//!
//! Eight general-purpose registers `r0..r7` with `r0` hardwired to zero,
//! a program counter held outside the indexed array, and the trap register
//! set (`tpc`, `tcause`, `tval`) written on dispatch and consumed by `TRET`.
//!
//! By convention `r1..r3` are caller-saved scratch registers, `r4` holds a
//! result pointer, `r5` a return address, and `r6` the downward-growing
//! stack pointer; the core itself treats `r1..r7` uniformly.

use crate::memory::Word;

/// Number of architecturally visible general-purpose registers.
pub const REGISTER_COUNT: usize = 8;

/// Architectural register identifier for a 3-bit register field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Register {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
}

impl Register {
    /// Ordered list of all architectural registers.
    pub const ALL: [Self; REGISTER_COUNT] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
    ];

    /// Returns the array index for this register.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Decodes a 3-bit register field into a register identifier.
    #[must_use]
    pub const fn from_u3(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::R0),
            1 => Some(Self::R1),
            2 => Some(Self::R2),
            3 => Some(Self::R3),
            4 => Some(Self::R4),
            5 => Some(Self::R5),
            6 => Some(Self::R6),
            7 => Some(Self::R7),
            _ => None,
        }
    }
}

/// Register file plus program counter and trap register set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    gpr: [Word; REGISTER_COUNT],
    pc: Word,
    tpc: Word,
    tcause: Word,
    tval: Word,
}

impl RegisterFile {
    /// Creates a zero-initialized register file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a general-purpose register. `r0` always reads as zero.
    #[must_use]
    pub const fn read(&self, reg: Register) -> Word {
        match reg {
            Register::R0 => 0,
            _ => self.gpr[reg.index()],
        }
    }

    /// Writes a general-purpose register. Writes to `r0` are discarded.
    pub const fn write(&mut self, reg: Register, value: Word) {
        match reg {
            Register::R0 => {}
            _ => self.gpr[reg.index()] = value,
        }
    }

    /// Reads the program counter.
    #[must_use]
    pub const fn pc(&self) -> Word {
        self.pc
    }

    /// Writes the program counter.
    pub const fn set_pc(&mut self, value: Word) {
        self.pc = value;
    }

    /// Reads the saved trap PC.
    #[must_use]
    pub const fn tpc(&self) -> Word {
        self.tpc
    }

    /// Writes the saved trap PC.
    ///
    /// Handlers may adjust this before `TRET` to resume past the trapping
    /// instruction.
    pub const fn set_tpc(&mut self, value: Word) {
        self.tpc = value;
    }

    /// Reads the trap cause register.
    #[must_use]
    pub const fn tcause(&self) -> Word {
        self.tcause
    }

    /// Writes the trap cause register.
    pub const fn set_tcause(&mut self, value: Word) {
        self.tcause = value;
    }

    /// Reads the trap value register (faulting address or offending word).
    #[must_use]
    pub const fn tval(&self) -> Word {
        self.tval
    }

    /// Writes the trap value register.
    pub const fn set_tval(&mut self, value: Word) {
        self.tval = value;
    }

    /// Restores the reset state: every register and the PC read as zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
