//! Instruction execution.
//!
//! Execution is split in two phases so faults are precise. `execute`
//! computes the complete side-effect set of one instruction — pending store,
//! register write-back, next PC, control effect — reading memory but
//! mutating nothing. The control unit then commits the set in a fixed order
//! (store, write-back, PC), so an instruction that faults anywhere leaves no
//! partial state behind.

#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]

use crate::decoder::{AluOp, BranchCond, DecodedInstruction, JumpTarget, SystemOp};
use crate::fault::TrapCause;
use crate::memory::{AccessWidth, AddressSpace, DeviceBus, Word};
use crate::state::{Register, RegisterFile};
use crate::trap::Trap;

/// What the control unit does after committing an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlEffect {
    /// Continue with the next instruction.
    Advance,
    /// Enter the terminal halted state.
    Halt,
    /// Return from the active trap handler.
    TrapReturn,
}

/// Side-effect set of one executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Update {
    /// Pending memory store, applied first at commit.
    pub store: Option<(Word, AccessWidth, Word)>,
    /// Pending register write-back.
    pub write_back: Option<(Register, Word)>,
    /// PC value after this instruction.
    pub next_pc: Word,
    /// Follow-up action for the control unit.
    pub effect: ControlEffect,
}

impl Update {
    const fn advance(next_pc: Word) -> Self {
        Self {
            store: None,
            write_back: None,
            next_pc,
            effect: ControlEffect::Advance,
        }
    }

    const fn with_write_back(next_pc: Word, reg: Register, value: Word) -> Self {
        Self {
            store: None,
            write_back: Some((reg, value)),
            next_pc,
            effect: ControlEffect::Advance,
        }
    }
}

/// Executes one decoded instruction against the architectural state.
///
/// `pc` is the address of the instruction. Loads are performed here (they
/// are side-effect-free on the address space); stores are deferred to
/// commit.
///
/// # Errors
///
/// Returns the raised [`Trap`] for memory faults, undefined arithmetic, and
/// `ECALL`. The returned update of a successful execution is the only state
/// change the instruction requests.
pub fn execute(
    instr: &DecodedInstruction,
    pc: Word,
    regs: &RegisterFile,
    mem: &AddressSpace,
    bus: &mut dyn DeviceBus,
) -> Result<Update, Trap> {
    let fall_through = pc.wrapping_add(instr.length());

    match *instr {
        DecodedInstruction::RegReg { op, rd, rs1, rs2 } => {
            let value = alu_apply(op, regs.read(rs1), regs.read(rs2))?;
            Ok(Update::with_write_back(fall_through, rd, value))
        }
        DecodedInstruction::RegImm {
            op, rd, rs1, imm, ..
        } => {
            let value = alu_apply(op, regs.read(rs1), imm)?;
            Ok(Update::with_write_back(fall_through, rd, value))
        }
        DecodedInstruction::Load {
            width,
            sign_extend,
            rd,
            base,
            disp,
            ..
        } => {
            let addr = regs.read(base).wrapping_add(disp);
            let raw = mem
                .load(bus, addr, width)
                .map_err(|fault| Trap::new(fault.cause, fault.addr))?;
            let value = if sign_extend && width == AccessWidth::Byte {
                (raw as u8 as i8 as i16) as Word
            } else {
                raw
            };
            Ok(Update::with_write_back(fall_through, rd, value))
        }
        DecodedInstruction::Store {
            width,
            rs,
            base,
            disp,
            ..
        } => {
            let addr = regs.read(base).wrapping_add(disp);
            Ok(Update {
                store: Some((addr, width, regs.read(rs))),
                write_back: None,
                next_pc: fall_through,
                effect: ControlEffect::Advance,
            })
        }
        DecodedInstruction::Branch {
            cond,
            rs1,
            rs2,
            offset,
            ..
        } => {
            let taken = branch_taken(cond, regs.read(rs1), regs.read(rs2));
            let next_pc = if taken {
                pc.wrapping_add(offset)
            } else {
                fall_through
            };
            Ok(Update::advance(next_pc))
        }
        DecodedInstruction::Jump { target, .. } => {
            let next_pc = match target {
                JumpTarget::Absolute(addr) => addr,
                JumpTarget::Register(rs1) => regs.read(rs1),
            };
            Ok(Update::advance(next_pc))
        }
        DecodedInstruction::System { op } => match op {
            SystemOp::Nop => Ok(Update::advance(fall_through)),
            SystemOp::Halt => Ok(Update {
                store: None,
                write_back: None,
                next_pc: fall_through,
                effect: ControlEffect::Halt,
            }),
            SystemOp::Ecall => Err(Trap::new(TrapCause::EnvironmentCall, 0)),
            SystemOp::Tret => Ok(Update {
                store: None,
                write_back: None,
                next_pc: fall_through,
                effect: ControlEffect::TrapReturn,
            }),
        },
    }
}

/// Applies an ALU operation with two's-complement wraparound semantics.
///
/// # Errors
///
/// Returns an `ArithmeticTrap` for division or remainder by zero.
pub fn alu_apply(op: AluOp, a: Word, b: Word) -> Result<Word, Trap> {
    let shift = u32::from(b & 0xF);

    Ok(match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::And => a & b,
        AluOp::Or => a | b,
        AluOp::Xor => a ^ b,
        AluOp::Slt => Word::from((a as i16) < (b as i16)),
        AluOp::Sltu => Word::from(a < b),
        AluOp::Shl => a.wrapping_shl(shift),
        AluOp::Shr => a.wrapping_shr(shift),
        AluOp::Sra => ((a as i16).wrapping_shr(shift)) as Word,
        AluOp::Div => {
            if b == 0 {
                return Err(Trap::new(TrapCause::ArithmeticTrap, 0));
            }
            (a as i16).wrapping_div(b as i16) as Word
        }
        AluOp::Rem => {
            if b == 0 {
                return Err(Trap::new(TrapCause::ArithmeticTrap, 0));
            }
            (a as i16).wrapping_rem(b as i16) as Word
        }
    })
}

const fn branch_taken(cond: BranchCond, a: Word, b: Word) -> bool {
    match cond {
        BranchCond::Eq => a == b,
        BranchCond::Ne => a != b,
        BranchCond::Lt => (a as i16) < (b as i16),
        BranchCond::Ge => (a as i16) >= (b as i16),
        BranchCond::Ltu => a < b,
        BranchCond::Geu => a >= b,
    }
}
