//! Mnemonic rendering of decoded instructions, for diagnostics and hosts.

use std::fmt::Write as _;

use crate::decoder::{
    AluOp, BranchCond, DecodedInstruction, Decoder, JumpTarget, SystemOp,
};
use crate::encoding::Opcode;
use crate::memory::{AccessWidth, Word};

/// Renders a decoded instruction as assembler text, e.g. `ADD r1, r2, r3`
/// or `LW r1, 4(r2)`.
#[must_use]
pub fn disassemble(instr: &DecodedInstruction) -> String {
    let mut text = String::new();

    match *instr {
        DecodedInstruction::RegReg { op, rd, rs1, rs2 } => {
            let _ = write!(
                text,
                "{} r{}, r{}, r{}",
                alu_mnemonic(op, false),
                rd.index(),
                rs1.index(),
                rs2.index()
            );
        }
        DecodedInstruction::RegImm {
            op, rd, rs1, imm, ..
        } => {
            let _ = write!(
                text,
                "{} r{}, r{}, {}",
                alu_mnemonic(op, true),
                rd.index(),
                rs1.index(),
                signed(imm)
            );
        }
        DecodedInstruction::Load {
            width,
            sign_extend,
            rd,
            base,
            disp,
            ..
        } => {
            let mnemonic = match (width, sign_extend) {
                (AccessWidth::Word, _) => Opcode::Lw.mnemonic(),
                (AccessWidth::Byte, true) => Opcode::Lb.mnemonic(),
                (AccessWidth::Byte, false) => Opcode::Lbu.mnemonic(),
            };
            let _ = write!(
                text,
                "{mnemonic} r{}, {}(r{})",
                rd.index(),
                signed(disp),
                base.index()
            );
        }
        DecodedInstruction::Store {
            width, rs, base, disp, ..
        } => {
            let mnemonic = if width == AccessWidth::Word {
                Opcode::Sw.mnemonic()
            } else {
                Opcode::Sb.mnemonic()
            };
            let _ = write!(
                text,
                "{mnemonic} r{}, {}(r{})",
                rs.index(),
                signed(disp),
                base.index()
            );
        }
        DecodedInstruction::Branch {
            cond,
            rs1,
            rs2,
            offset,
            ..
        } => {
            let mnemonic = match cond {
                BranchCond::Eq => Opcode::Beq.mnemonic(),
                BranchCond::Ne => Opcode::Bne.mnemonic(),
                BranchCond::Lt => Opcode::Blt.mnemonic(),
                BranchCond::Ge => Opcode::Bge.mnemonic(),
                BranchCond::Ltu => Opcode::Bltu.mnemonic(),
                BranchCond::Geu => Opcode::Bgeu.mnemonic(),
            };
            let _ = write!(
                text,
                "{mnemonic} r{}, r{}, {}",
                rs1.index(),
                rs2.index(),
                signed(offset)
            );
        }
        DecodedInstruction::Jump { target, .. } => match target {
            JumpTarget::Absolute(addr) => {
                let _ = write!(text, "{} {addr:#06x}", Opcode::Jmp.mnemonic());
            }
            JumpTarget::Register(rs1) => {
                let _ = write!(text, "{} r{}", Opcode::Jr.mnemonic(), rs1.index());
            }
        },
        DecodedInstruction::System { op } => {
            text.push_str(match op {
                SystemOp::Ecall => Opcode::Ecall.mnemonic(),
                SystemOp::Tret => Opcode::Tret.mnemonic(),
                SystemOp::Nop => Opcode::Nop.mnemonic(),
                SystemOp::Halt => Opcode::Hlt.mnemonic(),
            });
        }
    }

    text
}

/// Decodes and renders a raw instruction word pair.
///
/// Undecodable words render as a `.word` directive so memory dumps stay
/// readable.
#[must_use]
pub fn disassemble_word(primary: Word, extension: Option<Word>) -> String {
    Decoder::decode(primary, extension)
        .map_or_else(|_| format!(".word {primary:#06x}"), |i| disassemble(&i))
}

fn alu_mnemonic(op: AluOp, immediate: bool) -> &'static str {
    let opcode = match (op, immediate) {
        (AluOp::Add, false) => Opcode::Add,
        (AluOp::Add, true) => Opcode::Addi,
        (AluOp::Sub, _) => Opcode::Sub,
        (AluOp::And, false) => Opcode::And,
        (AluOp::And, true) => Opcode::Andi,
        (AluOp::Or, false) => Opcode::Or,
        (AluOp::Or, true) => Opcode::Ori,
        (AluOp::Xor, false) => Opcode::Xor,
        (AluOp::Xor, true) => Opcode::Xori,
        (AluOp::Slt, false) => Opcode::Slt,
        (AluOp::Slt, true) => Opcode::Slti,
        (AluOp::Sltu, _) => Opcode::Sltu,
        (AluOp::Shl, false) => Opcode::Shl,
        (AluOp::Shl, true) => Opcode::Shli,
        (AluOp::Shr, false) => Opcode::Shr,
        (AluOp::Shr, true) => Opcode::Shri,
        (AluOp::Sra, false) => Opcode::Sra,
        (AluOp::Sra, true) => Opcode::Srai,
        (AluOp::Div, _) => Opcode::Div,
        (AluOp::Rem, _) => Opcode::Rem,
    };
    opcode.mnemonic()
}

#[allow(clippy::cast_possible_wrap)]
fn signed(value: Word) -> i16 {
    value as i16
}
