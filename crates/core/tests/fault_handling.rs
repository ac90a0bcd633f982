//! Trap dispatch, fault precedence, and step-atomicity coverage.

#![allow(clippy::pedantic, clippy::nursery, clippy::too_many_lines)]

use proptest as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use yarisc_core::{
    AccessWidth, AddressSpace, AluOp, DecodedInstruction, DeviceBus, DeviceError, HaltReason,
    JumpTarget, MemoryRegion, Permissions, Register, RunState, RunStatus, Simulator,
    SimulatorConfig, StepOutcome, SystemOp, TrapCause, VectorTable, Word,
};

const HLT: DecodedInstruction = DecodedInstruction::System {
    op: SystemOp::Halt,
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

/// RAM at 0x0000..0x1000 for code, RAM at 0x4000..0x5000 for data, ROM at
/// 0x7000, and a small device window at 0xE000.
fn segmented_space() -> AddressSpace {
    let mut mem = AddressSpace::new();
    mem.map_region(MemoryRegion::ram(0x0000, 0x1000)).expect("code ram");
    mem.map_region(
        MemoryRegion::ram(0x4000, 0x1000).with_permissions(Permissions::RW),
    )
    .expect("data ram");
    mem.map_region(MemoryRegion::rom(0x7000, vec![0; 0x100])).expect("rom");
    mem.map_region(MemoryRegion::device(0xE000, 0x10)).expect("device");
    mem
}

fn simulator_with(program: &[DecodedInstruction], vectors: VectorTable) -> Simulator {
    let mut mem = segmented_space();
    mem.write_image(0, &assemble(program)).expect("program fits");
    Simulator::new(
        mem,
        SimulatorConfig {
            vectors,
            initial_pc: 0,
        },
    )
    .expect("valid configuration")
}

fn load_imm(rd: Register, value: Word) -> DecodedInstruction {
    DecodedInstruction::RegImm {
        op: AluOp::Add,
        rd,
        rs1: Register::R0,
        imm: value,
        long: true,
    }
}

fn expect_unhandled(outcome: StepOutcome, cause: TrapCause) -> (Word, Word) {
    match outcome {
        StepOutcome::Halted(HaltReason::UnhandledTrap(state)) => {
            assert_eq!(state.cause, cause);
            (state.pc, state.value)
        }
        outcome => panic!("expected unhandled {cause:?}, got {outcome:?}"),
    }
}

#[rstest]
#[case::load(false)]
#[case::store(true)]
fn unaligned_word_access_faults_without_side_effects(#[case] is_store: bool) {
    let access = if is_store {
        DecodedInstruction::Store {
            width: AccessWidth::Word,
            rs: Register::R2,
            base: Register::R1,
            disp: 0,
            long: false,
        }
    } else {
        DecodedInstruction::Load {
            width: AccessWidth::Word,
            sign_extend: false,
            rd: Register::R2,
            base: Register::R1,
            disp: 0,
            long: false,
        }
    };
    let mut sim = simulator_with(
        &[
            load_imm(Register::R1, 0x4001),
            load_imm(Register::R2, 0x5555),
            access,
            HLT,
        ],
        VectorTable::new(),
    );

    assert_eq!(sim.step(), StepOutcome::Retired);
    assert_eq!(sim.step(), StepOutcome::Retired);
    let before = sim.registers().clone();

    let (pc, value) = expect_unhandled(sim.step(), TrapCause::AlignmentFault);
    assert_eq!(pc, 8);
    assert_eq!(value, 0x4001);

    // No register or memory mutation is observable.
    assert_eq!(*sim.registers(), before);
    assert_eq!(sim.memory().peek(0x4000, AccessWidth::Word), Some(0));
    assert_eq!(sim.memory().peek(0x4002, AccessWidth::Word), Some(0));
}

#[rstest]
#[case::unmapped(0x3000)]
#[case::rom(0x7000)]
#[case::no_write_permission(0x0000)]
fn illegal_stores_fault_and_mutate_nothing(#[case] target: Word) {
    // Code RAM keeps default RWX; narrow it to catch the self-store case.
    let mut mem = AddressSpace::new();
    mem.map_region(
        MemoryRegion::ram(0x0000, 0x1000).with_permissions(Permissions::RX),
    )
    .expect("code ram");
    mem.map_region(MemoryRegion::rom(0x7000, vec![0xEE; 0x100])).expect("rom");

    let program = [
        load_imm(Register::R1, target),
        load_imm(Register::R2, 0x1234),
        DecodedInstruction::Store {
            width: AccessWidth::Word,
            rs: Register::R2,
            base: Register::R1,
            disp: 0,
            long: false,
        },
        HLT,
    ];
    mem.write_image(0, &assemble(&program)).expect("program fits");
    let mut sim =
        Simulator::new(mem, SimulatorConfig::default()).expect("valid configuration");

    sim.step();
    sim.step();
    let (_, value) = expect_unhandled(sim.step(), TrapCause::AccessFault);
    assert_eq!(value, target);
    assert_eq!(sim.run_state(), RunState::Halted);

    // ROM contents and code are untouched.
    assert_eq!(sim.memory().peek(0x7000, AccessWidth::Byte), Some(0xEE));
}

#[rstest]
#[case::div(AluOp::Div)]
#[case::rem(AluOp::Rem)]
fn division_by_zero_traps(#[case] op: AluOp) {
    let mut sim = simulator_with(
        &[
            load_imm(Register::R1, 42),
            DecodedInstruction::RegReg {
                op,
                rd: Register::R3,
                rs1: Register::R1,
                rs2: Register::R2,
            },
            HLT,
        ],
        VectorTable::new(),
    );

    sim.step();
    let before = sim.registers().clone();
    let (pc, _) = expect_unhandled(sim.step(), TrapCause::ArithmeticTrap);
    assert_eq!(pc, 4);
    assert_eq!(*sim.registers(), before);
}

#[test]
fn reserved_opcode_leaves_prior_state_untouched() {
    let mut sim = simulator_with(&[load_imm(Register::R1, 0x0042)], VectorTable::new());
    assert_eq!(sim.step(), StepOutcome::Retired);
    let before = sim.registers().clone();

    // PC now points at zeroed memory: opcode 0x00 is reserved.
    let (pc, value) = expect_unhandled(sim.step(), TrapCause::IllegalInstruction);
    assert_eq!(pc, 4);
    assert_eq!(value, 0x0000);
    assert_eq!(*sim.registers(), before);
    assert_eq!(sim.registers().read(Register::R1), 0x0042);
}

#[test]
fn vectored_fault_enters_trapped_then_resumes_in_handler() {
    let mut vectors = VectorTable::new();
    vectors.set(TrapCause::ArithmeticTrap, 0x0100);

    let mut sim = simulator_with(
        &[
            DecodedInstruction::RegReg {
                op: AluOp::Div,
                rd: Register::R3,
                rs1: Register::R1,
                rs2: Register::R0,
            },
            HLT,
        ],
        vectors,
    );
    // Handler: mark r7 and halt.
    let handler = assemble(&[
        DecodedInstruction::RegImm {
            op: AluOp::Add,
            rd: Register::R7,
            rs1: Register::R0,
            imm: 7,
            long: false,
        },
        HLT,
    ]);
    sim.memory_mut().write_image(0x0100, &handler).expect("handler fits");

    assert_eq!(
        sim.step(),
        StepOutcome::Trapped {
            cause: TrapCause::ArithmeticTrap
        }
    );
    assert_eq!(sim.run_state(), RunState::Trapped(TrapCause::ArithmeticTrap));
    assert_eq!(sim.registers().pc(), 0x0100);
    assert_eq!(sim.registers().tpc(), 0x0000);
    assert_eq!(sim.registers().tcause(), 0x0004);

    let outcome = sim.run(10);
    assert_eq!(outcome.status, RunStatus::Halted(HaltReason::Halt));
    assert_eq!(sim.registers().read(Register::R7), 7);
}

#[test]
fn ecall_saves_the_return_point_and_tret_resumes_there() {
    let mut vectors = VectorTable::new();
    vectors.set(TrapCause::EnvironmentCall, 0x0200);

    let mut sim = simulator_with(
        &[
            DecodedInstruction::System {
                op: SystemOp::Ecall,
            }, // 0x0000
            load_imm(Register::R1, 0x00AA), // 0x0002, runs after TRET
            HLT,                            // 0x0006
        ],
        vectors,
    );
    let handler = assemble(&[
        DecodedInstruction::RegImm {
            op: AluOp::Add,
            rd: Register::R6,
            rs1: Register::R0,
            imm: 1,
            long: false,
        },
        DecodedInstruction::System { op: SystemOp::Tret },
    ]);
    sim.memory_mut().write_image(0x0200, &handler).expect("handler fits");

    assert_eq!(
        sim.step(),
        StepOutcome::Trapped {
            cause: TrapCause::EnvironmentCall
        }
    );
    // ECALL saves the address of the following instruction.
    assert_eq!(sim.registers().tpc(), 0x0002);

    let outcome = sim.run(10);
    assert_eq!(outcome.status, RunStatus::Halted(HaltReason::Halt));
    assert_eq!(sim.registers().read(Register::R6), 1);
    assert_eq!(sim.registers().read(Register::R1), 0x00AA);
}

#[test]
fn tret_outside_a_handler_is_illegal() {
    let mut sim = simulator_with(
        &[DecodedInstruction::System { op: SystemOp::Tret }],
        VectorTable::new(),
    );

    let (pc, _) = expect_unhandled(sim.step(), TrapCause::IllegalInstruction);
    assert_eq!(pc, 0);
}

#[test]
fn fault_inside_a_handler_halts_instead_of_looping() {
    let mut vectors = VectorTable::new();
    vectors.set(TrapCause::EnvironmentCall, 0x0300);
    vectors.set(TrapCause::IllegalInstruction, 0x0300);

    let mut sim = simulator_with(
        &[DecodedInstruction::System {
            op: SystemOp::Ecall,
        }],
        vectors,
    );
    // The handler itself hits a reserved opcode (zeroed memory).

    assert_eq!(
        sim.step(),
        StepOutcome::Trapped {
            cause: TrapCause::EnvironmentCall
        }
    );
    let (pc, _) = expect_unhandled(sim.step(), TrapCause::IllegalInstruction);
    assert_eq!(pc, 0x0300);
    assert!(sim.run_state().is_terminal());
}

#[test]
fn unvectored_run_reports_cause_and_pc() {
    let mut sim = simulator_with(
        &[
            load_imm(Register::R1, 0x4001),
            DecodedInstruction::Load {
                width: AccessWidth::Word,
                sign_extend: false,
                rd: Register::R2,
                base: Register::R1,
                disp: 0,
                long: false,
            },
        ],
        VectorTable::new(),
    );

    let outcome = sim.run(100);
    assert_eq!(outcome.steps, 2);
    match outcome.status {
        RunStatus::Halted(HaltReason::UnhandledTrap(state)) => {
            assert_eq!(state.cause, TrapCause::AlignmentFault);
            assert_eq!(state.pc, 4);
            assert_eq!(state.value, 0x4001);
        }
        status => panic!("expected unhandled alignment fault, got {status:?}"),
    }

    let last = sim.last_trap().expect("trap recorded");
    assert_eq!(last.cause, TrapCause::AlignmentFault);
    assert_eq!(last.vector, None);
}

#[test]
fn jump_to_odd_address_faults_at_fetch() {
    let mut sim = simulator_with(
        &[
            load_imm(Register::R5, 0x0101),
            DecodedInstruction::Jump {
                target: JumpTarget::Register(Register::R5),
                long: false,
            },
            HLT,
        ],
        VectorTable::new(),
    );

    assert_eq!(sim.step(), StepOutcome::Retired);
    assert_eq!(sim.step(), StepOutcome::Retired);
    // The jump itself retires; the following fetch faults.
    let (pc, value) = expect_unhandled(sim.step(), TrapCause::AlignmentFault);
    assert_eq!(pc, 0x0101);
    assert_eq!(value, 0x0101);
}

struct FlakyDevice {
    fail: bool,
    stored: Option<(Word, Word)>,
}

impl DeviceBus for FlakyDevice {
    fn read(&mut self, _addr: Word, _width: AccessWidth) -> Result<Word, DeviceError> {
        if self.fail {
            Err(DeviceError::ReadFailed)
        } else {
            Ok(0x0077)
        }
    }

    fn write(&mut self, addr: Word, _width: AccessWidth, value: Word) -> Result<(), DeviceError> {
        if self.fail {
            Err(DeviceError::WriteFailed)
        } else {
            self.stored = Some((addr, value));
            Ok(())
        }
    }
}

#[test]
fn device_regions_round_trip_through_the_bus() {
    let mut sim = simulator_with(
        &[
            load_imm(Register::R1, 0xE004),
            DecodedInstruction::Load {
                width: AccessWidth::Word,
                sign_extend: false,
                rd: Register::R2,
                base: Register::R1,
                disp: 0,
                long: false,
            },
            DecodedInstruction::Store {
                width: AccessWidth::Word,
                rs: Register::R2,
                base: Register::R1,
                disp: 2,
                long: false,
            },
            HLT,
        ],
        VectorTable::new(),
    );
    let mut bus = FlakyDevice {
        fail: false,
        stored: None,
    };

    let outcome = sim.run_with(10, &mut bus);
    assert_eq!(outcome.status, RunStatus::Halted(HaltReason::Halt));
    assert_eq!(sim.registers().read(Register::R2), 0x0077);
    assert_eq!(bus.stored, Some((0xE006, 0x0077)));
}

#[test]
fn failing_device_surfaces_as_access_fault() {
    let mut sim = simulator_with(
        &[
            load_imm(Register::R1, 0xE004),
            DecodedInstruction::Load {
                width: AccessWidth::Word,
                sign_extend: false,
                rd: Register::R2,
                base: Register::R1,
                disp: 0,
                long: false,
            },
            HLT,
        ],
        VectorTable::new(),
    );
    let mut bus = FlakyDevice {
        fail: true,
        stored: None,
    };

    assert_eq!(sim.step_with(&mut bus), StepOutcome::Retired);
    let (_, value) = expect_unhandled(sim.step_with(&mut bus), TrapCause::AccessFault);
    assert_eq!(value, 0xE004);
}
