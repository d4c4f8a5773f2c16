use super::*;
use aarch64_ir::{Abi, Function, TargetInfo};
use pretty_assertions::assert_eq;
use viper_il::{parse_module, Opcode};

fn lower(source: &str) -> Result<Vec<Function>, LoweringError> {
    let il = parse_module(source).unwrap();
    build_from_il(&il, &TargetInfo::new(Abi::Linux))
}

fn lower_one(source: &str) -> Function {
    let mut functions = lower(source).unwrap();
    assert_eq!(1, functions.len());
    functions.remove(0)
}

fn block_text(function: &Function, index: usize) -> String {
    function.blocks[index].to_string()
}

#[test]
fn constant_return() {
    let function = lower_one("func @forty_two() -> i64 { entry: ret 42 }");
    assert_eq!(
        "\
fn forty_two
entry:
  mov %v0, #42
  mov x0, %v0
  ret x0
",
        function.to_string()
    );
}

#[test]
fn three_address_add() {
    let function =
        lower_one("func @add_two(%a:i64, %b:i64) -> i64 { entry: %r = add %a, %b; ret %r }");
    assert_eq!(
        "\
entry:
  mov %v0, x0
  mov %v1, x1
  add %v2, %v0, %v1
  mov x0, %v2
  ret x0
",
        block_text(&function, 0)
    );
    assert_eq!(3, function.vregs.count());
}

#[test]
fn small_constants_use_immediate_forms() {
    let function = lower_one(
        "func @f(%a:i64) -> i64 {
entry:
  %b = sub %a, 5
  %c = add %b, -3
  %d = add 2, %c
  %e = shl %d, 67
  ret %e
}",
    );
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!(
        vec![
            "mov %v0, x0",
            "sub %v1, %v0, #5",
            "sub %v2, %v1, #3",
            "add %v3, %v2, #2",
            "lsl %v4, %v3, #3",
            "mov x0, %v4",
            "ret x0",
        ],
        lines
    );
}

#[test]
fn remainder_expands_to_divide_and_msub() {
    let function =
        lower_one("func @rem(%a:i64, %b:i64) -> i64 { entry: %r = srem %a, %b; ret %r }");
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!("sdiv %v3, %v0, %v1", lines[2]);
    assert_eq!("msub %v2, %v3, %v1, %v0", lines[3]);
}

#[test]
fn float_constants_go_through_a_gpr() {
    let function =
        lower_one("func @half(%x:f64) -> f64 { entry: %r = fmul %x, 0.5; ret %r }");
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!("fmov %f0, d0", lines[0]);
    assert!(lines.contains(&"fmov %f3, %v2".to_owned()));
    assert!(lines.contains(&"fmul %f1, %f0, %f3".to_owned()));
    assert_eq!(
        vec!["fmov d0, %f1", "ret d0"],
        lines[lines.len() - 2..].to_vec()
    );
}

#[test]
fn float_compares_use_unordered_false_conditions() {
    let function = lower_one(
        "func @lt(%a:f64, %b:f64) -> i1 { entry: %c = fcmp_lt %a, %b; ret %c }",
    );
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!("fcmp %f0, %f1", lines[2]);
    assert_eq!("cset %v2, mi", lines[3]);
}

#[test]
fn conditional_branch() {
    let function = lower_one(
        "func @pick(%c:i1) -> i64 {
entry:
  cbr %c, yes, no
yes:
  ret 1
no:
  ret 2
}",
    );
    assert_eq!(
        "\
entry:
  mov %v0, x0
  cmp %v0, #0
  b.ne yes
  b no
",
        block_text(&function, 0)
    );
    assert_eq!(
        "\
no:
  mov %v2, #2
  mov x0, %v2
  ret x0
",
        block_text(&function, 2)
    );
}

#[test]
fn block_parameters_pass_through_frame_slots() {
    let function = lower_one(
        "func @count(%n:i64) -> i64 {
entry:
  br loop(0)
loop(%i:i64):
  %next = add %i, 1
  %done = scmp_ge %next, %n
  cbr %done, exit(%next), loop(%next)
exit(%r:i64):
  ret %r
}",
    );
    assert_eq!(16, function.frame.local_bytes);
    assert_eq!(
        "\
entry:
  mov %v0, x0
  mov %v5, #0
  str %v5, [x29, #-8]
  b loop
",
        block_text(&function, 0)
    );
    assert_eq!(
        "\
loop:
  ldr %v1, [x29, #-8]
  add %v3, %v1, #1
  cmp %v3, %v0
  cset %v4, ge
  str %v3, [x29, #-16]
  str %v3, [x29, #-8]
  cmp %v4, #0
  b.ne exit
  b loop
",
        block_text(&function, 1)
    );
    assert_eq!(
        "\
exit:
  ldr %v2, [x29, #-16]
  mov x0, %v2
  ret x0
",
        block_text(&function, 2)
    );
}

#[test]
fn alloca_load_and_store() {
    let function = lower_one(
        "func @slot() -> i64 {
entry:
  %p = alloca 16
  store i64, %p, 7
  %v = load i64, %p
  ret %v
}",
    );
    assert_eq!(16, function.frame.local_bytes);
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!(
        vec![
            "sub %v0, x29, #16",
            "mov %v2, #7",
            "str %v2, [%v0]",
            "ldr %v1, [%v0]",
            "mov x0, %v1",
            "ret x0",
        ],
        lines
    );
}

#[test]
fn call_sequence() {
    let function = lower_one(
        "extern @callee(i64, f64) -> i64
func @caller() -> i64 {
entry:
  %r = call @callee(7, 1.0)
  ret %r
}",
    );
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    let bl = lines.iter().position(|line| line == "bl callee").unwrap();
    assert_eq!("mov x0, %v1", lines[bl - 2]);
    assert_eq!("fmov d0, %f3", lines[bl - 1]);
    assert_eq!("mov %v0, x0", lines[bl + 1]);

    let bl = function
        .instrs()
        .find(|instr| instr.opcode == aarch64_ir::Opcode::Bl)
        .unwrap();
    assert_eq!(
        Some(&aarch64_ir::Operand::Label("callee".into())),
        bl.operands.first()
    );
    assert!(bl.branch_target().is_none());
}

#[test]
fn trap_calls_the_runtime() {
    let function = lower_one("func @boom() -> void { entry: trap }");
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!(vec!["bl rt_trap", "ret"], lines);
}

#[test]
fn i32_results_are_sign_extended() {
    let function = lower_one(
        "func @f(%a:i32) -> i1 {
entry:
  %b = add %a, 1
  %c = scmp_lt %b, 0
  ret %c
}",
    );
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!(
        vec![
            "mov %v0, x0",
            "sxtw %v0, %v0",
            "add %v1, %v0, #1",
            "sxtw %v1, %v1",
            "cmp %v1, #0",
            "cset %v2, lt",
            "mov x0, %v2",
            "ret x0",
        ],
        lines
    );

    // Only the low 32 bits of an `i32` constant count.
    let function = lower_one("func @wrap() -> i32 { entry: ret 4294967297 }");
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!(vec!["mov %v0, #1", "mov x0, %v0", "ret x0"], lines);
}

#[test]
fn i32_call_results_are_sign_extended() {
    let function = lower_one(
        "extern @g() -> i32
func @f() -> i32 { entry: %r = call @g(); ret %r }",
    );
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!(
        vec!["bl g", "mov %v0, x0", "sxtw %v0, %v0", "mov x0, %v0", "ret x0"],
        lines
    );
}

#[test]
fn unsigned_i32_division_zero_extends_the_operands() {
    let function =
        lower_one("func @f(%a:i32, %b:i32) -> i32 { entry: %q = udiv %a, %b; ret %q }");
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!(
        vec![
            "mov %v0, x0",
            "sxtw %v0, %v0",
            "mov %v1, x1",
            "sxtw %v1, %v1",
            "mov %v3, %v0",
            "mov %v4, %v1",
            "udiv %v2, %v3, %v4",
            "sxtw %v2, %v2",
            "mov x0, %v2",
            "ret x0",
        ],
        lines
    );

    assert_eq!(aarch64_ir::Opcode::UxtW, function.blocks[0].instrs[4].opcode);
}

#[test]
fn i32_shift_amounts_are_masked() {
    let function = lower_one(
        "func @f(%a:i32, %b:i32) -> i32 {
entry:
  %c = shl %a, 33
  %d = ashr %c, %b
  ret %d
}",
    );
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!("lsl %v2, %v0, #1", lines[4]);
    assert_eq!(
        vec![
            "mov %v4, #31",
            "and %v5, %v1, %v4",
            "asr %v3, %v2, %v5",
            "sxtw %v3, %v3",
        ],
        lines[6..10].to_vec()
    );
}

fn labels(function: &Function) -> Vec<&str> {
    function
        .blocks
        .iter()
        .map(|block| block.name.as_str())
        .collect()
}

#[test]
fn zero_checks_branch_to_a_shared_trap_block() {
    let function = lower_one(
        "func @f(%a:i64, %b:i64) -> i64 {
entry:
  %q = sdiv.chk0 %a, %b
  %r = srem.chk0 %q, %b
  ret %r
}",
    );
    assert_eq!(vec!["entry", "2.entry", "3.entry", "1.trap"], labels(&function));
    assert_eq!(
        "\
entry:
  mov %v0, x0
  mov %v1, x1
  cmp %v1, #0
  b.eq 1.trap
  b 2.entry
",
        block_text(&function, 0)
    );
    assert_eq!(
        "\
2.entry:
  sdiv %v2, %v0, %v1
  cmp %v1, #0
  b.eq 1.trap
  b 3.entry
",
        block_text(&function, 1)
    );
    assert_eq!(
        "\
3.entry:
  sdiv %v4, %v2, %v1
  msub %v3, %v4, %v1, %v2
  mov x0, %v3
  ret x0
",
        block_text(&function, 2)
    );
    assert_eq!(
        "\
1.trap:
  bl rt_trap
  ret
",
        block_text(&function, 3)
    );
}

#[test]
fn functions_without_checks_have_no_trap_block() {
    let function =
        lower_one("func @f(%a:i64, %b:i64) -> i64 { entry: %q = sdiv %a, %b; ret %q }");
    assert_eq!(vec!["entry"], labels(&function));
}

#[test]
fn i64_overflow_checks() {
    let function = lower_one(
        "func @f(%a:i64, %b:i64) -> i64 {
entry:
  %s = iadd.ovf %a, %b
  %p = imul.ovf %s, %b
  ret %p
}",
    );
    assert_eq!(vec!["entry", "2.entry", "3.entry", "1.trap"], labels(&function));
    assert_eq!(
        "\
entry:
  mov %v0, x0
  mov %v1, x1
  adds %v2, %v0, %v1
  b.vs 1.trap
  b 2.entry
",
        block_text(&function, 0)
    );
    assert_eq!(
        "\
2.entry:
  mul %v3, %v2, %v1
  smulh %v4, %v2, %v1
  asr %v5, %v3, #63
  cmp %v4, %v5
  b.ne 1.trap
  b 3.entry
",
        block_text(&function, 1)
    );
}

#[test]
fn i32_overflow_compares_with_the_sign_extended_result() {
    let function =
        lower_one("func @f(%a:i32, %b:i32) -> i32 { entry: %s = isub.ovf %a, %b; ret %s }");
    assert_eq!(
        "\
entry:
  mov %v0, x0
  sxtw %v0, %v0
  mov %v1, x1
  sxtw %v1, %v1
  sub %v2, %v0, %v1
  sxtw %v3, %v2
  cmp %v3, %v2
  b.ne 1.trap
  b 2.entry
",
        block_text(&function, 0)
    );
}

#[test]
fn switch_compares_the_cases_in_order() {
    let function = lower_one(
        "func @f(%x:i32) -> i64 {
entry:
  switch.i32 %x, other, 1 -> one, 5000 -> big
one:
  ret 1
big:
  ret 2
other:
  ret 0
}",
    );
    assert_eq!(
        vec!["entry", "1.entry", "2.entry", "one", "big", "other"],
        labels(&function)
    );
    assert_eq!(
        "\
entry:
  mov %v0, x0
  sxtw %v0, %v0
  cmp %v0, #1
  b.eq one
  b 1.entry
",
        block_text(&function, 0)
    );
    assert_eq!(
        "\
1.entry:
  mov %v1, #5000
  cmp %v0, %v1
  b.eq big
  b 2.entry
",
        block_text(&function, 1)
    );
    assert_eq!("2.entry:\n  b other\n", block_text(&function, 2));
}

#[test]
fn switch_edges_store_their_arguments() {
    let function = lower_one(
        "func @f(%x:i32) -> i64 {
entry:
  switch.i32 %x, done(0), 3 -> done(7)
done(%r:i64):
  ret %r
}",
    );
    assert_eq!(
        "\
entry:
  mov %v0, x0
  sxtw %v0, %v0
  mov %v2, #7
  str %v2, [x29, #-8]
  cmp %v0, #3
  b.eq done
  b 1.entry
",
        block_text(&function, 0)
    );
    assert_eq!(
        "\
1.entry:
  mov %v3, #0
  str %v3, [x29, #-8]
  b done
",
        block_text(&function, 1)
    );
}

#[test]
fn unsigned_conversions() {
    let function = lower_one(
        "func @f(%a:i32, %d:f64) -> f64 {
entry:
  %x = uitofp %a
  %y = fptoui %d
  %z = uitofp %y
  ret %x
}",
    );
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!(
        vec![
            "mov %v0, x0",
            "sxtw %v0, %v0",
            "fmov %f1, d0",
            "mov %v5, %v0",
            "ucvtf %f2, %v5",
            "fcvtzu %v3, %f1",
            "ucvtf %f4, %v3",
            "fmov d0, %f2",
            "ret d0",
        ],
        lines
    );
}

#[test]
fn arguments_past_the_registers_go_on_the_stack() {
    let function = lower_one(
        "extern @g(i64, i64, i64, i64, i64, i64, i64, i64, i64, i32) -> void
func @f() -> void { entry: call @g(1, 2, 3, 4, 5, 6, 7, 8, 9, 10); ret }",
    );
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!("mov x7, %v7", lines[17]);
    assert_eq!(
        vec!["str %v8, [sp]", "str %v9, [sp, #8]", "bl g", "ret"],
        lines[18..].to_vec()
    );
    assert_eq!(aarch64_ir::Opcode::StrW, function.blocks[0].instrs[19].opcode);
    assert_eq!(16, function.frame.outgoing_bytes);
    assert_eq!(0, function.frame.local_bytes);
}

#[test]
fn parameters_past_the_registers_are_loaded_from_the_caller() {
    let function = lower_one(
        "func @h(%a:i64, %b:i64, %c:i64, %d:i64, %e:i64, %f:i64, %g:i64, %h:f64, %i:i64, %j:i32, %k:i64) -> i32 {
entry:
  ret %j
}",
    );
    let lines: Vec<_> = function.instrs().map(ToString::to_string).collect();
    assert_eq!("fmov %f7, d0", lines[7]);
    assert_eq!(
        vec![
            "mov %v8, x7",
            "ldrsw %v9, [x29, #16]",
            "ldr %v10, [x29, #24]",
            "mov x0, %v9",
            "ret x0",
        ],
        lines[8..].to_vec()
    );
}

#[test]
fn functions_keep_their_order() {
    let functions = lower(
        "func @a() -> void { entry: ret }
func @b() -> void { entry: ret }",
    )
    .unwrap();
    let names: Vec<_> = functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(vec!["a", "b"], names);
}

fn lowering_error(source: &str) -> LoweringErrorKind {
    match lower(source).unwrap_err() {
        LoweringError::InBlock { kind, .. } => kind,
        error => panic!("unexpected error: {error}"),
    }
}

#[test]
fn reports_missing_terminator() {
    let error = lower("func @f() -> i64 { entry: %x = add 1, 2 }").unwrap_err();
    assert_eq!(
        LoweringError::InBlock {
            function: "f".into(),
            block: "entry".into(),
            kind: LoweringErrorKind::MissingTerminator,
        },
        error
    );
    assert_eq!(
        "block doesn't end in a terminator (in block `entry` of `@f`)",
        error.to_string()
    );
}

#[test]
fn reports_terminator_in_the_middle() {
    assert_eq!(
        LoweringErrorKind::TerminatorNotAtEnd(Opcode::Ret),
        lowering_error("func @f() -> void { entry: ret; ret }")
    );
}

#[test]
fn reports_unknown_callee() {
    assert_eq!(
        LoweringErrorKind::UnknownCallee("nope".into()),
        lowering_error("func @f() -> void { entry: call @nope(); ret }")
    );
}

#[test]
fn reports_call_argument_count() {
    assert_eq!(
        LoweringErrorKind::CallArgCount {
            callee: "g".into(),
            expected: 1,
            found: 0,
        },
        lowering_error(
            "extern @g(i64) -> void
func @f() -> void { entry: call @g(); ret }"
        )
    );
}

#[test]
fn reports_broken_branches() {
    assert_eq!(
        LoweringErrorKind::UnknownBlock("nowhere".into()),
        lowering_error("func @f() -> void { entry: br nowhere }")
    );
    assert_eq!(
        LoweringErrorKind::BranchArgCount {
            target: "next".into(),
            expected: 1,
            found: 0,
        },
        lowering_error(
            "func @f() -> void {
entry:
  br next
next(%x:i64):
  ret
}"
        )
    );
    assert_eq!(
        LoweringErrorKind::ConflictingBranchArgs("next".into()),
        lowering_error(
            "func @f(%c:i1) -> void {
entry:
  cbr %c, next(1), next(2)
next(%x:i64):
  ret
}"
        )
    );
}

#[test]
fn reports_entry_parameters_and_duplicate_blocks() {
    assert_eq!(
        LoweringErrorKind::EntryParams,
        lowering_error("func @f() -> void { entry(%x:i64): ret }")
    );
    assert_eq!(
        LoweringErrorKind::DuplicateBlock,
        lowering_error("func @f() -> void { entry: ret\nentry: ret }")
    );
}
