//! Instruction decode pipeline.
//!
//! Decoding is a pure function of the instruction word(s): it validates the
//! opcode, the must-be-zero operand bits, and the immediate ranges, and
//! produces a class-tagged [`DecodedInstruction`]. Anything the decoder
//! rejects is never partially executed.

#![allow(clippy::cast_possible_truncation)]

use thiserror::Error;

use crate::encoding::{
    ext_flag, field_a, field_b, field_c, opcode_field, short_jump_target, sign_extend_3bit, Opcode,
    OpcodeClass, EXT_FLAG, FIELD_A_OFFSET, FIELD_B_OFFSET, FIELD_C_OFFSET, OPERAND_MASK,
    SHORT_TARGET_MASK,
};
use crate::memory::{AccessWidth, Word, WORD_BYTES};
use crate::state::Register;

/// ALU operations shared by the register-register and register-immediate
/// classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Slt,
    Sltu,
    Shl,
    Shr,
    Sra,
    Div,
    Rem,
}

impl AluOp {
    /// Returns `true` for the shift operations, whose immediates are
    /// zero-extended and range-checked.
    #[must_use]
    pub const fn is_shift(self) -> bool {
        matches!(self, Self::Shl | Self::Shr | Self::Sra)
    }
}

/// Branch predicates comparing two register operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BranchCond {
    Eq,
    Ne,
    Lt,
    Ge,
    Ltu,
    Geu,
}

/// Operand-free system operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemOp {
    /// Raise an `EnvironmentCall` trap.
    Ecall,
    /// Return from the active trap handler.
    Tret,
    /// Do nothing.
    Nop,
    /// Halt the simulator.
    Halt,
}

/// Target of an unconditional jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpTarget {
    /// Absolute byte address.
    Absolute(Word),
    /// Byte address taken from a register.
    Register(Register),
}

/// A fully validated instruction, tagged by operand-layout class.
///
/// Immediates and displacements are stored already extended and scaled, so
/// execution applies them with plain wrapping arithmetic. `long` records
/// whether the instruction was encoded with an extension word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodedInstruction {
    /// Three-register ALU operation.
    RegReg {
        /// Operation applied to the two source registers.
        op: AluOp,
        /// Destination register.
        rd: Register,
        /// First source register.
        rs1: Register,
        /// Second source register.
        rs2: Register,
    },
    /// Register-immediate ALU operation.
    RegImm {
        /// Operation applied to the source register and immediate.
        op: AluOp,
        /// Destination register.
        rd: Register,
        /// Source register.
        rs1: Register,
        /// Immediate, already sign- or zero-extended per operation.
        imm: Word,
        /// Encoded with an extension word.
        long: bool,
    },
    /// Memory load.
    Load {
        /// Access width.
        width: AccessWidth,
        /// Sign-extend a byte load into the destination.
        sign_extend: bool,
        /// Destination register.
        rd: Register,
        /// Base address register.
        base: Register,
        /// Sign-extended byte displacement.
        disp: Word,
        /// Encoded with an extension word.
        long: bool,
    },
    /// Memory store.
    Store {
        /// Access width.
        width: AccessWidth,
        /// Data source register.
        rs: Register,
        /// Base address register.
        base: Register,
        /// Sign-extended byte displacement.
        disp: Word,
        /// Encoded with an extension word.
        long: bool,
    },
    /// Conditional PC-relative branch.
    Branch {
        /// Compare predicate.
        cond: BranchCond,
        /// First compared register.
        rs1: Register,
        /// Second compared register.
        rs2: Register,
        /// Byte displacement from the branch address, already scaled.
        offset: Word,
        /// Encoded with an extension word.
        long: bool,
    },
    /// Unconditional jump.
    Jump {
        /// Jump target.
        target: JumpTarget,
        /// Encoded with an extension word.
        long: bool,
    },
    /// Operand-free system instruction.
    System {
        /// System operation.
        op: SystemOp,
    },
}

impl DecodedInstruction {
    /// Returns the instruction length in bytes (2 or 4).
    #[must_use]
    pub const fn length(&self) -> Word {
        if self.is_long() {
            (WORD_BYTES * 2) as Word
        } else {
            WORD_BYTES as Word
        }
    }

    const fn is_long(&self) -> bool {
        match self {
            Self::RegImm { long, .. }
            | Self::Load { long, .. }
            | Self::Store { long, .. }
            | Self::Branch { long, .. }
            | Self::Jump { long, .. } => *long,
            Self::RegReg { .. } | Self::System { .. } => false,
        }
    }

    /// Re-encodes this instruction into its primary word and optional
    /// extension word. `decode` of the result reproduces `self`.
    #[must_use]
    pub fn encode(&self) -> (Word, Option<Word>) {
        match *self {
            Self::RegReg { op, rd, rs1, rs2 } => (
                pack(reg_reg_opcode(op), rd.index(), rs1.index(), rs2.index()),
                None,
            ),
            Self::RegImm {
                op,
                rd,
                rs1,
                imm,
                long,
            } => {
                let opcode = reg_imm_opcode(op);
                if long {
                    (
                        pack(opcode, rd.index(), rs1.index(), 0) | EXT_FLAG,
                        Some(imm),
                    )
                } else {
                    (
                        pack(opcode, rd.index(), rs1.index(), (imm & 0x7) as usize),
                        None,
                    )
                }
            }
            Self::Load {
                width,
                sign_extend,
                rd,
                base,
                disp,
                long,
            } => {
                let opcode = match (width, sign_extend) {
                    (AccessWidth::Word, _) => Opcode::Lw,
                    (AccessWidth::Byte, true) => Opcode::Lb,
                    (AccessWidth::Byte, false) => Opcode::Lbu,
                };
                pack_displacement(opcode, rd.index(), base.index(), disp, long)
            }
            Self::Store {
                width,
                rs,
                base,
                disp,
                long,
            } => {
                let opcode = match width {
                    AccessWidth::Word => Opcode::Sw,
                    AccessWidth::Byte => Opcode::Sb,
                };
                pack_displacement(opcode, rs.index(), base.index(), disp, long)
            }
            Self::Branch {
                cond,
                rs1,
                rs2,
                offset,
                long,
            } => {
                let opcode = branch_opcode(cond);
                if long {
                    (
                        pack(opcode, 0, rs1.index(), rs2.index()) | EXT_FLAG,
                        Some(offset),
                    )
                } else {
                    let off3 = ((offset >> 1) & 0x7) as usize;
                    (pack(opcode, off3, rs1.index(), rs2.index()), None)
                }
            }
            Self::Jump { target, long } => match target {
                JumpTarget::Absolute(addr) => {
                    if long {
                        (
                            Word::from(Opcode::Jmp.as_u6()) | EXT_FLAG,
                            Some(addr),
                        )
                    } else {
                        let field = (addr >> 1) << FIELD_A_OFFSET;
                        (
                            Word::from(Opcode::Jmp.as_u6()) | (field & SHORT_TARGET_MASK),
                            None,
                        )
                    }
                }
                JumpTarget::Register(rs1) => (
                    pack(Opcode::Jr, 0, rs1.index(), 0),
                    None,
                ),
            },
            Self::System { op } => {
                let opcode = match op {
                    SystemOp::Ecall => Opcode::Ecall,
                    SystemOp::Tret => Opcode::Tret,
                    SystemOp::Nop => Opcode::Nop,
                    SystemOp::Halt => Opcode::Hlt,
                };
                (Word::from(opcode.as_u6()), None)
            }
        }
    }
}

fn pack(opcode: Opcode, a: usize, b: usize, c: usize) -> Word {
    Word::from(opcode.as_u6())
        | ((a as Word) << FIELD_A_OFFSET)
        | ((b as Word) << FIELD_B_OFFSET)
        | ((c as Word) << FIELD_C_OFFSET)
}

fn pack_displacement(
    opcode: Opcode,
    a: usize,
    b: usize,
    disp: Word,
    long: bool,
) -> (Word, Option<Word>) {
    if long {
        (pack(opcode, a, b, 0) | EXT_FLAG, Some(disp))
    } else {
        (pack(opcode, a, b, (disp & 0x7) as usize), None)
    }
}

const fn reg_reg_opcode(op: AluOp) -> Opcode {
    match op {
        AluOp::Add => Opcode::Add,
        AluOp::Sub => Opcode::Sub,
        AluOp::And => Opcode::And,
        AluOp::Or => Opcode::Or,
        AluOp::Xor => Opcode::Xor,
        AluOp::Slt => Opcode::Slt,
        AluOp::Sltu => Opcode::Sltu,
        AluOp::Shl => Opcode::Shl,
        AluOp::Shr => Opcode::Shr,
        AluOp::Sra => Opcode::Sra,
        AluOp::Div => Opcode::Div,
        AluOp::Rem => Opcode::Rem,
    }
}

const fn reg_imm_opcode(op: AluOp) -> Opcode {
    match op {
        AluOp::Add => Opcode::Addi,
        AluOp::And => Opcode::Andi,
        AluOp::Or => Opcode::Ori,
        AluOp::Xor => Opcode::Xori,
        AluOp::Slt => Opcode::Slti,
        AluOp::Shl => Opcode::Shli,
        AluOp::Shr => Opcode::Shri,
        AluOp::Sra => Opcode::Srai,
        // No immediate forms are assigned for these operations; decoded
        // instructions never carry them in the RegImm class.
        AluOp::Sub | AluOp::Sltu | AluOp::Div | AluOp::Rem => Opcode::Addi,
    }
}

const fn branch_opcode(cond: BranchCond) -> Opcode {
    match cond {
        BranchCond::Eq => Opcode::Beq,
        BranchCond::Ne => Opcode::Bne,
        BranchCond::Lt => Opcode::Blt,
        BranchCond::Ge => Opcode::Bge,
        BranchCond::Ltu => Opcode::Bltu,
        BranchCond::Geu => Opcode::Bgeu,
    }
}

/// Reasons the decoder rejects an instruction word.
///
/// Every variant surfaces to the guest as an `IllegalInstruction` trap; the
/// distinction exists for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum DecodeError {
    /// The 6-bit opcode value has no assigned instruction.
    #[error("reserved opcode value")]
    ReservedOpcode,
    /// A must-be-zero operand bit was set.
    #[error("non-zero bits in a reserved operand field")]
    ReservedBits,
    /// A long-form shift amount above 15.
    #[error("shift amount out of range")]
    ShiftRange,
    /// The extension flag is set but no extension word was supplied.
    #[error("missing extension word")]
    MissingExtension,
}

/// Instruction decoder.
///
/// Stateless; the same word(s) always decode identically.
pub struct Decoder;

impl Decoder {
    /// Returns whether `primary` requires an extension word, so the control
    /// unit knows to fetch a second word before decoding.
    ///
    /// Reserved opcodes and classes without a long form report `false`; the
    /// subsequent `decode` call rejects them without touching memory again.
    #[must_use]
    pub fn wants_extension(primary: Word) -> bool {
        if !ext_flag(primary) {
            return false;
        }

        Opcode::from_u6(opcode_field(primary)).is_some_and(|opcode| {
            matches!(
                opcode.class(),
                OpcodeClass::RegImm | OpcodeClass::Load | OpcodeClass::Store | OpcodeClass::Branch
            ) || opcode == Opcode::Jmp
        })
    }

    /// Decodes a primary word plus its extension word, when one is required.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for reserved opcodes, non-zero must-be-zero
    /// operand bits, out-of-range shift amounts, and a missing extension
    /// word. All of them surface as `IllegalInstruction`.
    pub fn decode(
        primary: Word,
        extension: Option<Word>,
    ) -> Result<DecodedInstruction, DecodeError> {
        let opcode =
            Opcode::from_u6(opcode_field(primary)).ok_or(DecodeError::ReservedOpcode)?;
        let ext = ext_flag(primary);

        let reg_a = register(field_a(primary));
        let reg_b = register(field_b(primary));
        let reg_c = register(field_c(primary));

        match opcode.class() {
            OpcodeClass::RegReg => {
                if ext {
                    return Err(DecodeError::ReservedBits);
                }
                Ok(DecodedInstruction::RegReg {
                    op: alu_op(opcode),
                    rd: reg_a,
                    rs1: reg_b,
                    rs2: reg_c,
                })
            }
            OpcodeClass::RegImm => {
                let op = alu_op(opcode);
                let (imm, long) = if ext {
                    if field_c(primary) != 0 {
                        return Err(DecodeError::ReservedBits);
                    }
                    let imm = extension.ok_or(DecodeError::MissingExtension)?;
                    if op.is_shift() && imm > 15 {
                        return Err(DecodeError::ShiftRange);
                    }
                    (imm, true)
                } else if op.is_shift() {
                    (Word::from(field_c(primary)), false)
                } else {
                    (sign_extend_3bit(field_c(primary)), false)
                };
                Ok(DecodedInstruction::RegImm {
                    op,
                    rd: reg_a,
                    rs1: reg_b,
                    imm,
                    long,
                })
            }
            OpcodeClass::Load => {
                let (disp, long) = displacement(primary, extension)?;
                let (width, sign_extend) = match opcode {
                    Opcode::Lw => (AccessWidth::Word, false),
                    Opcode::Lb => (AccessWidth::Byte, true),
                    _ => (AccessWidth::Byte, false),
                };
                Ok(DecodedInstruction::Load {
                    width,
                    sign_extend,
                    rd: reg_a,
                    base: reg_b,
                    disp,
                    long,
                })
            }
            OpcodeClass::Store => {
                let (disp, long) = displacement(primary, extension)?;
                let width = if opcode == Opcode::Sw {
                    AccessWidth::Word
                } else {
                    AccessWidth::Byte
                };
                Ok(DecodedInstruction::Store {
                    width,
                    rs: reg_a,
                    base: reg_b,
                    disp,
                    long,
                })
            }
            OpcodeClass::Branch => {
                let (offset, long) = if ext {
                    if field_a(primary) != 0 {
                        return Err(DecodeError::ReservedBits);
                    }
                    (extension.ok_or(DecodeError::MissingExtension)?, true)
                } else {
                    // Short offsets are word-scaled: -8..=+6 bytes.
                    (sign_extend_3bit(field_a(primary)).wrapping_shl(1), false)
                };
                Ok(DecodedInstruction::Branch {
                    cond: branch_cond(opcode),
                    rs1: reg_b,
                    rs2: reg_c,
                    offset,
                    long,
                })
            }
            OpcodeClass::Jump => match opcode {
                Opcode::Jmp => {
                    if ext {
                        if primary & SHORT_TARGET_MASK != 0 {
                            return Err(DecodeError::ReservedBits);
                        }
                        let target = extension.ok_or(DecodeError::MissingExtension)?;
                        Ok(DecodedInstruction::Jump {
                            target: JumpTarget::Absolute(target),
                            long: true,
                        })
                    } else {
                        Ok(DecodedInstruction::Jump {
                            target: JumpTarget::Absolute(short_jump_target(primary)),
                            long: false,
                        })
                    }
                }
                _ => {
                    // JR carries only rs1; everything else must be zero.
                    let reserved = OPERAND_MASK & !(FIELD_MASK_B);
                    if primary & reserved != 0 {
                        return Err(DecodeError::ReservedBits);
                    }
                    Ok(DecodedInstruction::Jump {
                        target: JumpTarget::Register(reg_b),
                        long: false,
                    })
                }
            },
            OpcodeClass::System => {
                if primary & OPERAND_MASK != 0 {
                    return Err(DecodeError::ReservedBits);
                }
                let op = match opcode {
                    Opcode::Ecall => SystemOp::Ecall,
                    Opcode::Tret => SystemOp::Tret,
                    Opcode::Nop => SystemOp::Nop,
                    _ => SystemOp::Halt,
                };
                Ok(DecodedInstruction::System { op })
            }
        }
    }
}

/// Mask of operand field B inside the primary word.
const FIELD_MASK_B: Word = 0x7 << FIELD_B_OFFSET;

fn displacement(primary: Word, extension: Option<Word>) -> Result<(Word, bool), DecodeError> {
    if ext_flag(primary) {
        if field_c(primary) != 0 {
            return Err(DecodeError::ReservedBits);
        }
        Ok((extension.ok_or(DecodeError::MissingExtension)?, true))
    } else {
        Ok((sign_extend_3bit(field_c(primary)), false))
    }
}

const fn register(bits: u8) -> Register {
    // Operand fields are masked to three bits, so every value names a
    // register.
    match bits & 0x7 {
        0 => Register::R0,
        1 => Register::R1,
        2 => Register::R2,
        3 => Register::R3,
        4 => Register::R4,
        5 => Register::R5,
        6 => Register::R6,
        _ => Register::R7,
    }
}

const fn alu_op(opcode: Opcode) -> AluOp {
    match opcode {
        Opcode::Add | Opcode::Addi => AluOp::Add,
        Opcode::Sub => AluOp::Sub,
        Opcode::And | Opcode::Andi => AluOp::And,
        Opcode::Or | Opcode::Ori => AluOp::Or,
        Opcode::Xor | Opcode::Xori => AluOp::Xor,
        Opcode::Slt | Opcode::Slti => AluOp::Slt,
        Opcode::Sltu => AluOp::Sltu,
        Opcode::Shl | Opcode::Shli => AluOp::Shl,
        Opcode::Shr | Opcode::Shri => AluOp::Shr,
        Opcode::Sra | Opcode::Srai => AluOp::Sra,
        Opcode::Div => AluOp::Div,
        _ => AluOp::Rem,
    }
}

const fn branch_cond(opcode: Opcode) -> BranchCond {
    match opcode {
        Opcode::Beq => BranchCond::Eq,
        Opcode::Bne => BranchCond::Ne,
        Opcode::Blt => BranchCond::Lt,
        Opcode::Bge => BranchCond::Ge,
        Opcode::Bltu => BranchCond::Ltu,
        _ => BranchCond::Geu,
    }
}
