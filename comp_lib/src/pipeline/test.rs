use super::*;
use aarch64_ir::{validator, Abi, Opcode};
use pretty_assertions::assert_eq;
use std::{cell::Cell, rc::Rc};
use viper_il::parse_module;

const LOOP: &str = "
func @count(%n:i64) -> i64 {
entry:
  br loop(0)
loop(%i:i64):
  %next = add %i, 1
  %done = scmp_ge %next, %n
  cbr %done, exit(%next), loop(%next)
exit(%r:i64):
  ret %r
}";

/// The exit block is defined before the hot loop.
const EXIT_FIRST: &str = "
func @sum(%n:i64) -> i64 {
entry:
  br start
exit(%r:i64):
  ret %r
start:
  br loop(0, 0)
loop(%i:i64, %acc:i64):
  %acc2 = add %acc, %i
  %i2 = add %i, 1
  %done = scmp_ge %i2, %n
  cbr %done, exit(%acc2), loop(%i2, %acc2)
}";

const CHAINS: &str = "
func @chains(%a:i64, %b:i64) -> i64 {
entry:
  %a1 = mul %a, %a
  %a2 = mul %a1, %a
  %a3 = mul %a2, %a
  %b1 = mul %b, %b
  %b2 = mul %b1, %b
  %b3 = mul %b2, %b
  %r = add %a3, %b3
  %s = add %r, %a
  ret %s
}";

const CALL: &str = "
func @callee() -> i64 {
entry:
  ret 7
}
func @caller() -> i64 {
entry:
  %r = call @callee()
  ret %r
}";

const CHECKED: &str = "
func @quot(%a:i64, %b:i64) -> i64 {
entry:
  %q = sdiv.chk0 %a, %b
  ret %q
}";

const SWITCH: &str = "
func @pick(%x:i32) -> i64 {
entry:
  switch.i32 %x, other, 1 -> one, 2 -> two
one:
  ret 10
two:
  ret 20
other:
  ret 0
}";

const STACK_ARGS: &str = "
func @many(%a:i64, %b:i64, %c:i64, %d:i64, %e:i64, %f:i64, %g:i64, %h:i64, %i:i64) -> i64 {
entry:
  ret %i
}
func @caller() -> i64 {
entry:
  %r = call @many(1, 2, 3, 4, 5, 6, 7, 8, 9)
  ret %r
}";

struct Output {
    ok: bool,
    assembly: String,
    mir: Vec<aarch64_ir::Function>,
    diagnostics: Vec<String>,
}

fn run_with(mut manager: PassManager, source: &str, abi: Abi) -> Output {
    let il = parse_module(source).unwrap();
    let target = TargetInfo::new(abi);
    let mut module = Module::new(&il, &target);
    let mut diagnostics = Vec::new();
    let ok = manager.run(&mut module, &mut diagnostics);
    Output {
        ok,
        assembly: module.assembly,
        mir: module.mir,
        diagnostics,
    }
}

fn compile(source: &str, abi: Abi) -> String {
    let output = run_with(PassManager::standard(), source, abi);
    assert!(output.ok, "{:?}", output.diagnostics);
    output.assembly
}

fn manager_with(passes: Vec<Box<dyn Pass>>) -> PassManager {
    let mut manager = PassManager::new();
    manager.passes = passes;
    manager
}

fn count_lines(assembly: &str, prefix: &str) -> usize {
    assembly
        .lines()
        .filter(|line| line.starts_with(prefix))
        .count()
}

#[test]
fn empty_module() {
    let output = run_with(PassManager::standard(), "", Abi::Linux);
    assert!(output.ok);
    assert!(output.mir.is_empty());
    assert_eq!("", output.assembly);
}

#[test]
fn constant_return_darwin() {
    let assembly = compile("func @forty_two() -> i64 { entry: ret 42 }", Abi::Darwin);
    assert!(assembly.contains("\n_forty_two:\n"));
    assert!(assembly.contains("  mov x0, #42\n"));
    assert!(assembly.contains("  ret\n"));
    assert!(!assembly.contains(".type"));
    assert!(!assembly.contains(".size"));
}

#[test]
fn constant_return_linux() {
    let assembly = compile("func @forty_two() -> i64 { entry: ret 42 }", Abi::Linux);
    assert_eq!(
        "  .text
  .globl forty_two
  .p2align 2
  .type forty_two, @function
forty_two:
  stp x29, x30, [sp, #-16]!
  mov x29, sp
.L9forty_two_entry:
  mov x0, #42
  ldp x29, x30, [sp], #16
  ret
  .size forty_two, .-forty_two
",
        assembly
    );
}

#[test]
fn single_ret_function() {
    let assembly = compile("func @nothing() -> void { entry: ret }", Abi::Darwin);
    assert!(assembly.contains("_nothing:\n"));
    assert!(assembly.contains("  stp x29, x30, [sp, #-16]!\n"));
    assert!(assembly.ends_with("  ldp x29, x30, [sp], #16\n  ret\n"));
}

#[test]
fn three_address_add() {
    let assembly = compile(
        "func @add_two(%a:i64, %b:i64) -> i64 { entry: %r = add %a, %b; ret %r }",
        Abi::Linux,
    );
    assert_eq!(1, count_lines(&assembly, "  add "));
    assert!(assembly.contains("  add x0, x0, x1\n"));
}

#[test]
fn simple_loop_falls_through() {
    let output = run_with(PassManager::standard(), LOOP, Abi::Linux);
    assert!(output.ok);

    let names: Vec<_> = output.mir[0].blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(vec!["entry", "loop", "exit"], names);
    assert!(!output.assembly.contains("  b .L5count_loop\n.L5count_loop:"));
    assert_eq!(0, count_lines(&output.assembly, "  b "));
}

#[test]
fn block_layout_fixes_suboptimal_order() {
    let output = run_with(PassManager::standard(), EXIT_FIRST, Abi::Linux);
    assert!(output.ok);
    let names: Vec<_> = output.mir[0].blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(vec!["entry", "start", "loop", "exit"], names);

    let without_layout = manager_with(vec![
        Box::new(LoweringPass),
        Box::new(RegAllocPass),
        Box::new(SchedulerPass),
        Box::new(PeepholePass),
        Box::new(EmitPass),
    ]);
    let unordered = run_with(without_layout, EXIT_FIRST, Abi::Linux);
    assert!(unordered.ok);

    let with = count_lines(&output.assembly, "  b ");
    let without = count_lines(&unordered.assembly, "  b ");
    assert!(with < without, "{with} >= {without}");
}

#[test]
fn scheduler_interleaves_independent_chains() {
    let allocated = run_with(
        manager_with(vec![Box::new(LoweringPass), Box::new(RegAllocPass)]),
        CHAINS,
        Abi::Linux,
    );
    let scheduled = run_with(
        manager_with(vec![
            Box::new(LoweringPass),
            Box::new(RegAllocPass),
            Box::new(SchedulerPass),
        ]),
        CHAINS,
        Abi::Linux,
    );
    assert!(scheduled.ok);

    let before = &allocated.mir[0].blocks[0].instrs;
    let after = &scheduled.mir[0].blocks[0].instrs;
    assert_eq!(before.len(), after.len());
    for instr in before {
        assert_eq!(
            before.iter().filter(|other| *other == instr).count(),
            after.iter().filter(|other| *other == instr).count()
        );
    }

    let dests = |instrs: &[aarch64_ir::Instr]| -> Vec<_> {
        instrs
            .iter()
            .filter(|instr| instr.opcode == Opcode::MulRRR)
            .filter_map(|instr| instr.reg(0))
            .collect()
    };
    let after = dests(after);
    assert_eq!(6, after.len());
    assert_ne!(after[0], after[1]);
}

#[test]
fn call_sequence_linux() {
    let assembly = compile(CALL, Abi::Linux);
    assert!(assembly.contains("  bl callee\n"));
    assert!(!assembly.contains("bl _callee"));
    assert!(!assembly.contains("_caller"));
}

#[test]
fn call_sequence_darwin() {
    let assembly = compile(CALL, Abi::Darwin);
    assert!(assembly.contains("  bl _callee\n"));
    assert!(assembly.contains("\n_caller:\n"));
    assert!(assembly.contains("\n_callee:\n"));
    assert!(assembly.contains("L6caller_entry:\n"));
    assert!(!assembly.contains(".L6caller_entry"));
}

#[test]
fn trap_block_survives_layout_and_peephole() {
    let output = run_with(PassManager::standard(), CHECKED, Abi::Linux);
    assert!(output.ok, "{:?}", output.diagnostics);

    let names: Vec<_> = output.mir[0].blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(vec!["entry", "2.entry", "1.trap"], names);

    let assembly = &output.assembly;
    assert_eq!(1, count_lines(assembly, "  cbz "));
    assert!(assembly.contains(", .L4quot_1.trap\n"));
    assert!(assembly.contains(".L4quot_1.trap:\n  bl rt_trap\n"));
    assert_eq!(0, count_lines(assembly, "  b.eq "));
}

#[test]
fn switch_falls_through_its_compare_chain() {
    let output = run_with(PassManager::standard(), SWITCH, Abi::Linux);
    assert!(output.ok, "{:?}", output.diagnostics);

    let assembly = &output.assembly;
    assert_eq!(1, count_lines(assembly, "  sxtw "));
    assert!(assembly.contains(".L4pick_1.entry:\n"));
    assert!(assembly.contains(".L4pick_2.entry:\n"));
    assert_eq!(2, count_lines(assembly, "  cmp "));
}

#[test]
fn stack_arguments_use_the_outgoing_area() {
    let output = run_with(PassManager::standard(), STACK_ARGS, Abi::Linux);
    assert!(output.ok, "{:?}", output.diagnostics);

    let caller = &output.mir[1];
    assert_eq!(8, caller.frame.outgoing_bytes);
    let assembly = &output.assembly;
    assert!(assembly.contains("  sub sp, sp, #16\n"));
    assert!(assembly
        .lines()
        .any(|line| line.starts_with("  str ") && line.ends_with(", [sp]")));
    assert!(assembly.contains("  add sp, sp, #16\n"));
    assert!(assembly
        .lines()
        .any(|line| line.starts_with("  ldr ") && line.ends_with(", [x29, #16]")));
}

#[test]
fn every_stage_keeps_the_mir_valid() {
    let mut manager = PassManager::new();
    manager.add_pass(LoweringPass);
    manager.add_pass(VerifyPass::new("lowering", MirStage::Lowered));
    manager.add_pass(RegAllocPass);
    for pass in [
        Box::new(SchedulerPass) as Box<dyn Pass>,
        Box::new(BlockLayoutPass),
        Box::new(PeepholePass),
    ] {
        manager.passes.push(pass);
        manager.add_pass(VerifyPass::new("a pass", MirStage::Allocated));
    }
    manager.add_pass(EmitPass);

    for source in [LOOP, EXIT_FIRST, CHAINS, CALL, CHECKED, SWITCH, STACK_ARGS] {
        let il = parse_module(source).unwrap();
        let target = TargetInfo::new(Abi::Linux);
        let mut module = Module::new(&il, &target);
        let mut diagnostics = Vec::new();
        assert!(manager.run(&mut module, &mut diagnostics), "{diagnostics:?}");
        for function in &module.mir {
            validator::validate_allocated(function).unwrap();
        }
    }
}

#[test]
fn peephole_and_layout_are_idempotent() {
    let output = run_with(PassManager::standard(), EXIT_FIRST, Abi::Linux);
    let il = parse_module(EXIT_FIRST).unwrap();
    let target = TargetInfo::new(Abi::Linux);
    let mut module = Module::new(&il, &target);
    module.mir = output.mir.clone();

    let mut diagnostics = Vec::new();
    assert!(PeepholePass.run(&mut module, &mut diagnostics));
    assert_eq!(output.mir, module.mir);
    assert!(BlockLayoutPass.run(&mut module, &mut diagnostics));
    assert_eq!(output.mir, module.mir);
    assert!(diagnostics.is_empty());
}

#[test]
fn output_is_deterministic() {
    for source in [LOOP, EXIT_FIRST, CHAINS, CALL] {
        assert_eq!(compile(source, Abi::Darwin), compile(source, Abi::Darwin));
    }
}

struct Counting(Rc<Cell<usize>>);

impl Pass for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn run(&mut self, _module: &mut Module<'_>, _diagnostics: &mut dyn Diagnostics) -> bool {
        self.0.set(self.0.get() + 1);
        true
    }
}

#[test]
fn stops_at_the_first_failing_pass() {
    let runs = Rc::new(Cell::new(0));
    let mut manager = PassManager::new();
    manager.add_pass(Counting(runs.clone()));
    manager.add_pass(LoweringPass);
    manager.add_pass(Counting(runs.clone()));

    let il = parse_module("func @f() -> void { entry: call @missing(); ret }").unwrap();
    let target = TargetInfo::new(Abi::Linux);
    let mut module = Module::new(&il, &target);
    let mut diagnostics = Vec::new();

    assert!(!manager.run(&mut module, &mut diagnostics));
    assert_eq!(1, runs.get());
    assert_eq!(
        vec!["call to unknown function `@missing` (in block `entry` of `@f`)"],
        diagnostics
    );
    let failed = manager.failed_pass().unwrap();
    assert_eq!("lowering", failed.name());
    assert_eq!(Code::MalformedIl, failed.error_code());
}
