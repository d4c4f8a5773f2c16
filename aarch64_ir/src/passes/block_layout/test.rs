use super::*;
use crate::{Cond, Reg};

fn block(name: &str, instrs: Vec<crate::Instr>) -> BasicBlock {
    let mut block = BasicBlock::new(name.into());
    block.instrs = instrs;
    block
}

fn function_of(blocks: Vec<BasicBlock>) -> Function {
    let mut blocks = blocks.into_iter();
    let mut function = Function::new("f".into(), blocks.next().unwrap());
    function.blocks.extend(blocks);
    function
}

fn names(function: &Function) -> Vec<&str> {
    function
        .blocks
        .iter()
        .map(|block| block.name.as_str())
        .collect()
}

fn suboptimal_loop() -> Function {
    function_of(vec![
        block("entry", vec![instr::b("start".into())]),
        block(
            "exit",
            vec![instr::mov(Reg::X0, Reg::X(1)), instr::ret(Some(Reg::X0))],
        ),
        block(
            "start",
            vec![instr::mov_imm(Reg::X(1), 0), instr::b("loop".into())],
        ),
        block(
            "loop",
            vec![
                instr::add_imm(Reg::X(1), Reg::X(1), 1),
                instr::cmp(Reg::X(1), Reg::X0),
                instr::b_cond(Cond::Lt, "loop".into()),
                instr::b("exit".into()),
            ],
        ),
    ])
}

#[test]
fn follows_unconditional_branches() {
    let mut function = suboptimal_loop();
    run(&mut function);
    assert_eq!(vec!["entry", "start", "loop", "exit"], names(&function));
}

#[test]
fn keeps_blocks_and_instructions() {
    let original = suboptimal_loop();
    let mut function = original.clone();
    run(&mut function);

    for block in &original.blocks {
        assert_eq!(Some(block), function.block(block.name.as_str()));
    }
    assert_eq!(original.blocks.len(), function.blocks.len());
}

#[test]
fn second_run_changes_nothing() {
    let mut function = suboptimal_loop();
    run(&mut function);
    let once = function.clone();
    run(&mut function);
    assert_eq!(once, function);
}

#[test]
fn keeps_an_already_good_order() {
    let mut function = function_of(vec![
        block("entry", vec![instr::b("loop".into())]),
        block(
            "loop",
            vec![
                instr::cmp_imm(Reg::X0, 0),
                instr::b_cond(Cond::Ne, "loop".into()),
                instr::b("exit".into()),
            ],
        ),
        block("exit", vec![instr::ret(None)]),
    ]);
    let original = function.clone();
    run(&mut function);
    assert_eq!(original, function);
}

#[test]
fn does_not_follow_placed_targets() {
    let mut function = function_of(vec![
        block("entry", vec![instr::b("b".into())]),
        block("a", vec![instr::ret(None)]),
        block("b", vec![instr::b("entry".into())]),
    ]);
    run(&mut function);
    assert_eq!(vec!["entry", "b", "a"], names(&function));
}

#[test]
fn restarts_at_lowest_unplaced_block() {
    let mut function = function_of(vec![
        block(
            "entry",
            vec![
                instr::cbz(Reg::X0, "c".into()),
                instr::b("d".into()),
            ],
        ),
        block("b", vec![instr::ret(None)]),
        block("c", vec![instr::b("b".into())]),
        block("d", vec![instr::ret(None)]),
    ]);
    run(&mut function);
    assert_eq!(vec!["entry", "d", "b", "c"], names(&function));
}

#[test]
fn broken_fall_throughs_become_branches() {
    let mut function = function_of(vec![
        block("entry", vec![instr::b("c".into())]),
        block(
            "b",
            vec![instr::mov_imm(Reg::X0, 1), instr::fall_through("c".into())],
        ),
        block("c", vec![instr::ret(Some(Reg::X0))]),
    ]);
    run(&mut function);

    assert_eq!(vec!["entry", "c", "b"], names(&function));
    assert_eq!(
        Some(&instr::b("c".into())),
        function.block("b").unwrap().instrs.last()
    );
}

#[test]
fn single_block_functions_are_left_alone() {
    let mut function = function_of(vec![block("entry", vec![instr::ret(None)])]);
    let original = function.clone();
    run(&mut function);
    assert_eq!(original, function);
}

#[test]
fn moves_the_trap_block_off_the_straight_path() {
    let mut function = function_of(vec![
        block(
            "entry",
            vec![
                instr::cmp_imm(Reg::X(1), 0),
                instr::b_cond(Cond::Eq, "1.trap".into()),
                instr::b("2.entry".into()),
            ],
        ),
        block(
            "1.trap",
            vec![instr::bl("rt_trap".into(), 0, 0), instr::ret(None)],
        ),
        block("2.entry", vec![instr::ret(Some(Reg::X0))]),
    ]);
    run(&mut function);
    assert_eq!(vec!["entry", "2.entry", "1.trap"], names(&function));
    assert_eq!(
        vec![instr::bl("rt_trap".into(), 0, 0), instr::ret(None)],
        function.blocks[2].instrs
    );
}
