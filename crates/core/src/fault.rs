use thiserror::Error;

use crate::memory::Word;

/// Coarse fault classes used to group trap causes by the pipeline stage that
/// raises them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TrapClass {
    /// The decoder rejected an instruction encoding.
    Decode,
    /// A load, store, or fetch violated the memory access policy.
    Memory,
    /// An arithmetic operation with no defined result.
    Arithmetic,
    /// A trap requested by a system instruction.
    System,
}

/// Architectural trap causes.
///
/// Every simulated fault is one of these values. The discriminants are the
/// stable cause codes written to the `tcause` register on dispatch and used
/// to index the trap vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum TrapCause {
    /// Reserved opcode, non-zero must-be-zero operand bits, or an
    /// out-of-range field value.
    #[error("illegal instruction encoding")]
    IllegalInstruction = 0x01,
    /// Word access on an odd address, for data or instruction fetch.
    #[error("unaligned memory access")]
    AlignmentFault = 0x02,
    /// Access to an unmapped address or one that lacks the required
    /// permission.
    #[error("memory access violation")]
    AccessFault = 0x03,
    /// Division or remainder by zero.
    #[error("undefined arithmetic operation")]
    ArithmeticTrap = 0x04,
    /// `ECALL` executed.
    #[error("environment call")]
    EnvironmentCall = 0x05,
}

/// Number of assigned trap causes, which is also the vector table size.
pub const TRAP_CAUSE_COUNT: usize = 5;

impl TrapCause {
    /// All assigned causes in cause-code order.
    pub const ALL: [Self; TRAP_CAUSE_COUNT] = [
        Self::IllegalInstruction,
        Self::AlignmentFault,
        Self::AccessFault,
        Self::ArithmeticTrap,
        Self::EnvironmentCall,
    ];

    /// Converts a cause to the stable code stored in `tcause`.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable `tcause` code back into a cause.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::IllegalInstruction),
            0x02 => Some(Self::AlignmentFault),
            0x03 => Some(Self::AccessFault),
            0x04 => Some(Self::ArithmeticTrap),
            0x05 => Some(Self::EnvironmentCall),
            _ => None,
        }
    }

    /// Returns the pipeline-stage class for this cause.
    #[must_use]
    pub const fn class(self) -> TrapClass {
        match self {
            Self::IllegalInstruction => TrapClass::Decode,
            Self::AlignmentFault | Self::AccessFault => TrapClass::Memory,
            Self::ArithmeticTrap => TrapClass::Arithmetic,
            Self::EnvironmentCall => TrapClass::System,
        }
    }
}

/// Errors rejected when the simulator is configured by the external loader.
///
/// These are the only hard host-level errors the crate produces; once a
/// simulator is constructed, malformed guest programs surface as simulated
/// trap outcomes instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A new region intersects one that is already mapped.
    #[error("region at {base:#06x} overlaps a mapped region")]
    OverlappingRegion {
        /// Base address of the rejected region.
        base: Word,
    },
    /// Region base or size is not word-aligned.
    #[error("region at {base:#06x} with size {size} is not word-aligned")]
    MisalignedRegion {
        /// Base address of the rejected region.
        base: Word,
        /// Size in bytes of the rejected region.
        size: usize,
    },
    /// Region has zero size.
    #[error("region at {base:#06x} is empty")]
    EmptyRegion {
        /// Base address of the rejected region.
        base: Word,
    },
    /// Region extends past the top of the 64 KiB address space.
    #[error("region at {base:#06x} with size {size} exceeds the address space")]
    RegionOutOfRange {
        /// Base address of the rejected region.
        base: Word,
        /// Size in bytes of the rejected region.
        size: usize,
    },
    /// A loader image does not fall inside a single mapped region.
    #[error("image of {len} bytes at {base:#06x} is not backed by one region")]
    ImageOutOfBounds {
        /// Base address of the rejected image.
        base: Word,
        /// Length in bytes of the rejected image.
        len: usize,
    },
    /// A trap vector points outside executable mapped memory.
    #[error("vector for {cause} targets invalid address {target:#06x}")]
    InvalidVector {
        /// Cause whose vector entry was rejected.
        cause: TrapCause,
        /// Rejected handler entry address.
        target: Word,
    },
}
