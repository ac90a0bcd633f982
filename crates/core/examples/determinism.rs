//! Deterministic replay fingerprint generator used for cross-host
//! comparison: runs the same program twice and prints the shared state
//! fingerprint.

#![allow(clippy::pedantic, clippy::nursery)]

use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use yarisc_core::{
    AccessWidth, AddressSpace, AluOp, BranchCond, DecodedInstruction, Register, Simulator,
    SimulatorConfig, SystemOp, Word,
};

fn assemble(program: &[DecodedInstruction]) -> Vec<u8> {
    let mut image = Vec::new();
    for instr in program {
        let (primary, extension) = instr.encode();
        image.extend_from_slice(&primary.to_le_bytes());
        if let Some(word) = extension {
            image.extend_from_slice(&word.to_le_bytes());
        }
    }
    image
}

fn program() -> Vec<DecodedInstruction> {
    vec![
        DecodedInstruction::RegImm {
            op: AluOp::Add,
            rd: Register::R1,
            rs1: Register::R0,
            imm: 6,
            long: false,
        },
        DecodedInstruction::RegImm {
            op: AluOp::Add,
            rd: Register::R2,
            rs1: Register::R0,
            imm: 0x4000,
            long: true,
        },
        // loop: mem[r2] = r1; r2 += 2; r1 -= 1; until r1 == 0
        DecodedInstruction::Store {
            width: AccessWidth::Word,
            rs: Register::R1,
            base: Register::R2,
            disp: 0,
            long: false,
        },
        DecodedInstruction::RegImm {
            op: AluOp::Add,
            rd: Register::R2,
            rs1: Register::R2,
            imm: 2,
            long: false,
        },
        DecodedInstruction::RegImm {
            op: AluOp::Add,
            rd: Register::R1,
            rs1: Register::R1,
            imm: 0xFFFF,
            long: false,
        },
        DecodedInstruction::Branch {
            cond: BranchCond::Ne,
            rs1: Register::R1,
            rs2: Register::R0,
            offset: 0xFFFA,
            long: false,
        },
        DecodedInstruction::System {
            op: SystemOp::Halt,
        },
    ]
}

fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(0x100_0000_01B3);
    }
}

fn fingerprint() -> u64 {
    let mut mem = AddressSpace::flat();
    mem.write_image(0, &assemble(&program()))
        .expect("program fits in flat memory");
    let mut sim =
        Simulator::new(mem, SimulatorConfig::default()).expect("valid configuration");

    let outcome = sim.run(1_000);

    let mut hash = 0xCBF2_9CE4_8422_2325_u64;
    hash_bytes(&mut hash, &outcome.steps.to_le_bytes());
    hash_bytes(&mut hash, &sim.registers().pc().to_le_bytes());
    for reg in Register::ALL {
        hash_bytes(&mut hash, &sim.registers().read(reg).to_le_bytes());
    }
    for addr in (0x4000..0x4010_u16).step_by(2) {
        let word: Word = sim
            .memory()
            .peek(addr, AccessWidth::Word)
            .expect("table address is mapped");
        hash_bytes(&mut hash, &word.to_le_bytes());
    }
    hash
}

fn main() {
    let first = fingerprint();
    let second = fingerprint();
    assert_eq!(first, second, "simulation must be deterministic");
    println!("state fingerprint: {first:#018x}");
}
