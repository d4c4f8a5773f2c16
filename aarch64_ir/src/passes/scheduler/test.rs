use super::*;
use crate::{instr, Label};

fn x(n: u8) -> Reg {
    Reg::X(n)
}

fn block_with(instrs: Vec<Instr>) -> BasicBlock {
    let mut block = BasicBlock::new("entry".into());
    block.instrs = instrs;
    block
}

fn sorted(instrs: &[Instr]) -> Vec<String> {
    let mut lines: Vec<String> = instrs.iter().map(|instr| instr.to_string()).collect();
    lines.sort();
    lines
}

#[test]
fn interleaves_independent_multiply_chains() {
    let mut block = block_with(vec![
        instr::mul(x(2), x(0), x(0)),
        instr::mul(x(3), x(2), x(2)),
        instr::mul(x(4), x(3), x(3)),
        instr::mul(x(5), x(1), x(1)),
        instr::mul(x(6), x(5), x(5)),
        instr::mul(x(7), x(6), x(6)),
        instr::add(x(0), x(4), x(7)),
        instr::ret(Some(x(0))),
    ]);
    schedule_block(&mut block);

    assert_eq!(
        vec![
            instr::mul(x(2), x(0), x(0)),
            instr::mul(x(5), x(1), x(1)),
            instr::mul(x(3), x(2), x(2)),
            instr::mul(x(6), x(5), x(5)),
            instr::mul(x(4), x(3), x(3)),
            instr::mul(x(7), x(6), x(6)),
            instr::add(x(0), x(4), x(7)),
            instr::ret(Some(x(0))),
        ],
        block.instrs
    );
}

#[test]
fn keeps_the_same_instructions() {
    let original = vec![
        instr::ldr(x(1), Reg::FP, -8),
        instr::mul(x(2), x(0), x(0)),
        instr::add(x(3), x(1), x(2)),
        instr::str(x(3), Reg::FP, -16),
        instr::mov_imm(x(4), 7),
        instr::sub(x(0), x(3), x(4)),
        instr::ret(Some(x(0))),
    ];
    let mut block = block_with(original.clone());
    schedule_block(&mut block);

    assert_eq!(sorted(&original), sorted(&block.instrs));
    assert_eq!(original.last(), block.instrs.last());
}

#[test]
fn starts_long_latency_loads_first() {
    let mut block = block_with(vec![
        instr::mov_imm(x(1), 1),
        instr::ldr(x(2), Reg::FP, -8),
        instr::add(x(3), x(2), x(1)),
        instr::ret(Some(x(3))),
    ]);
    schedule_block(&mut block);

    assert_eq!(instr::ldr(x(2), Reg::FP, -8), block.instrs[0]);
    assert_eq!(instr::mov_imm(x(1), 1), block.instrs[1]);
}

#[test]
fn loads_stay_after_stores() {
    let mut block = block_with(vec![
        instr::str(x(0), Reg::FP, -8),
        instr::mul(x(3), x(4), x(4)),
        instr::mul(x(3), x(3), x(3)),
        instr::ldr(x(1), Reg::FP, -8),
        instr::add(x(0), x(1), x(3)),
        instr::ret(Some(x(0))),
    ]);
    schedule_block(&mut block);

    let store = block
        .instrs
        .iter()
        .position(|instr| instr.opcode == crate::Opcode::Str)
        .unwrap();
    let load = block
        .instrs
        .iter()
        .position(|instr| instr.opcode == crate::Opcode::Ldr)
        .unwrap();
    assert!(store < load);
}

#[test]
fn stores_stay_after_earlier_loads() {
    let mut block = block_with(vec![
        instr::ldr(x(1), Reg::FP, -8),
        instr::mul(x(2), x(3), x(3)),
        instr::mul(x(2), x(2), x(2)),
        instr::mul(x(2), x(2), x(2)),
        instr::str(x(2), Reg::FP, -8),
        instr::add(x(0), x(1), x(1)),
        instr::ret(Some(x(0))),
    ]);
    schedule_block(&mut block);

    let load = block
        .instrs
        .iter()
        .position(|instr| instr.opcode == crate::Opcode::Ldr)
        .unwrap();
    let store = block
        .instrs
        .iter()
        .position(|instr| instr.opcode == crate::Opcode::Str)
        .unwrap();
    assert!(load < store);
}

#[test]
fn respects_register_reuse() {
    let mut block = block_with(vec![
        instr::add(x(1), x(0), x(0)),
        instr::mov_imm(x(0), 5),
        instr::mul(x(2), x(0), x(1)),
        instr::mul(x(2), x(2), x(2)),
        instr::add(x(0), x(2), x(1)),
        instr::ret(Some(x(0))),
    ]);
    let original = block.instrs.clone();
    schedule_block(&mut block);

    assert_eq!(original, block.instrs);
}

#[test]
fn flags_are_not_reordered_across_compares() {
    let mut block = block_with(vec![
        instr::cmp(x(0), x(1)),
        instr::cset(x(2), crate::Cond::Lt),
        instr::cmp(x(3), x(4)),
        instr::cset(x(5), crate::Cond::Eq),
        instr::add(x(0), x(2), x(5)),
        instr::ret(Some(x(0))),
    ]);
    let original = block.instrs.clone();
    schedule_block(&mut block);

    assert_eq!(original, block.instrs);
}

#[test]
fn calls_are_barriers() {
    let mut block = block_with(vec![
        instr::mov_imm(x(19), 1),
        instr::bl(Label::from("g"), 0, 0),
        instr::mul(x(20), x(21), x(21)),
        instr::mul(x(20), x(20), x(20)),
        instr::ret(None),
    ]);
    let original = block.instrs.clone();
    schedule_block(&mut block);

    assert_eq!(original, block.instrs);
}

#[test]
fn leaves_terminators_in_place() {
    let mut block = block_with(vec![
        instr::mov_imm(x(1), 1),
        instr::ldr(x(2), Reg::FP, -8),
        instr::cmp(x(2), x(1)),
        instr::b_cond(crate::Cond::Eq, "a".into()),
        instr::b("b".into()),
    ]);
    schedule_block(&mut block);

    assert_eq!(instr::b_cond(crate::Cond::Eq, "a".into()), block.instrs[3]);
    assert_eq!(instr::b("b".into()), block.instrs[4]);
}

#[test]
fn is_deterministic() {
    let instrs = vec![
        instr::mov_imm(x(1), 1),
        instr::mov_imm(x(2), 2),
        instr::mov_imm(x(3), 3),
        instr::add(x(4), x(1), x(2)),
        instr::add(x(5), x(3), x(4)),
        instr::ret(Some(x(5))),
    ];
    let mut first = block_with(instrs.clone());
    let mut second = block_with(instrs.clone());
    schedule_block(&mut first);
    schedule_block(&mut second);

    assert_eq!(first.instrs, second.instrs);
    // Nothing to gain here, program order is kept.
    assert_eq!(instrs, first.instrs);
}
