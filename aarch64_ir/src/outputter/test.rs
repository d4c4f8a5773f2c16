use super::*;
use crate::{Cond, RegClass};

fn emit(abi: Abi, functions: &[Function]) -> String {
    let mut output = String::new();
    AsmOutputter::new(&mut output, TargetInfo::new(abi))
        .write_module(functions)
        .unwrap();
    output
}

fn function_of(name: &str, blocks: Vec<(&str, Vec<Instr>)>) -> Function {
    let mut blocks = blocks.into_iter().map(|(name, instrs)| {
        let mut block = BasicBlock::new(name.into());
        block.instrs = instrs;
        block
    });
    let mut function = Function::new(name.into(), blocks.next().unwrap());
    function.blocks.extend(blocks);
    function
}

fn answer() -> Function {
    function_of(
        "f",
        vec![(
            "entry",
            vec![instr::mov_imm(Reg::X0, 42), instr::ret(Some(Reg::X0))],
        )],
    )
}

#[test]
fn empty_module() {
    assert_eq!("", emit(Abi::Linux, &[]));
    assert_eq!("", emit(Abi::Darwin, &[]));
}

#[test]
fn elf_function() {
    assert_eq!(
        "  .text
  .globl f
  .p2align 2
  .type f, @function
f:
  stp x29, x30, [sp, #-16]!
  mov x29, sp
.L1f_entry:
  mov x0, #42
  ldp x29, x30, [sp], #16
  ret
  .size f, .-f
",
        emit(Abi::Linux, &[answer()])
    );
}

#[test]
fn darwin_function() {
    assert_eq!(
        "  .text
  .globl _f
  .p2align 2
_f:
  stp x29, x30, [sp, #-16]!
  mov x29, sp
L1f_entry:
  mov x0, #42
  ldp x29, x30, [sp], #16
  ret
",
        emit(Abi::Darwin, &[answer()])
    );
}

#[test]
fn frame_with_locals_and_callee_saved_registers() {
    let mut function = function_of(
        "main",
        vec![
            (
                "entry",
                vec![
                    instr::mov(Reg::X(19), Reg::X0),
                    instr::bl("foo".into(), 1, 0),
                    instr::cbz(Reg::X0, "done".into()),
                    instr::fall_through("loop".into()),
                ],
            ),
            (
                "loop",
                vec![
                    instr::str(Reg::X(19), Reg::FP, -8),
                    instr::b_cond(Cond::Ne, "entry".into()),
                    instr::b("entry".into()),
                ],
            ),
            ("done", vec![instr::ret(Some(Reg::X0))]),
        ],
    );
    function.frame.local_bytes = 24;
    function
        .frame
        .set_callee_saved([Reg::X(19), Reg::X(20), Reg::X(21), Reg::D(8)]);

    assert_eq!(
        "  .text
  .globl _main
  .p2align 2
_main:
  stp x29, x30, [sp, #-16]!
  mov x29, sp
  sub sp, sp, #32
  stp x19, x20, [sp, #-16]!
  str x21, [sp, #-16]!
  str d8, [sp, #-16]!
L4main_entry:
  mov x19, x0
  bl _foo
  cbz x0, L4main_done
L4main_loop:
  str x19, [x29, #-8]
  b.ne L4main_entry
  b L4main_entry
L4main_done:
  ldr d8, [sp], #16
  ldr x21, [sp], #16
  ldp x19, x20, [sp], #16
  mov sp, x29
  ldp x29, x30, [sp], #16
  ret
",
        emit(Abi::Darwin, &[function])
    );
}

#[test]
fn large_frames_are_allocated_in_chunks() {
    let mut function = answer();
    function.frame.local_bytes = 5000;
    let output = emit(Abi::Linux, &[function]);
    assert!(output.contains("  sub sp, sp, #4095\n  sub sp, sp, #913\n"), "{output}");
    assert!(output.contains("  mov sp, x29\n"), "{output}");
}

#[test]
fn out_of_range_offsets_go_through_scratch_register() {
    let function = answer();
    let write = |instr: Instr| {
        let mut output = String::new();
        AsmOutputter::new(&mut output, TargetInfo::new(Abi::Linux))
            .write_instr(&function, &instr)
            .unwrap();
        output
    };

    assert_eq!(
        "  mov x16, #-4096\n  add x16, x29, x16\n  ldr x0, [x16]\n",
        write(instr::ldr(Reg::X0, Reg::FP, -4096))
    );
    assert_eq!(
        "  mov x16, #-300\n  add x16, x29, x16\n  strb w1, [x16]\n",
        write(instr::strb(Reg::X(1), Reg::FP, -300))
    );
    assert_eq!(
        "  str x1, [sp, #800]\n",
        write(instr::str(Reg::X(1), Reg::SP, 800))
    );
    assert_eq!(
        "  ldr x2, [x29, #-256]\n",
        write(instr::ldr(Reg::X(2), Reg::FP, -256))
    );
    assert_eq!(
        "  mov x16, #-520\n  add x16, x29, x16\n  ldp x1, x2, [x16]\n",
        write(instr::ldp(Reg::X(1), Reg::X(2), Reg::FP, -520))
    );
}

#[test]
fn functions_are_separated_by_blank_lines() {
    let mut second = answer();
    second.name = "g".into();
    let output = emit(Abi::Linux, &[answer(), second]);
    assert_eq!(1, output.matches(".text").count());
    assert!(output.contains("  .size f, .-f\n\n  .globl g\n"), "{output}");
    assert!(output.ends_with("  .size g, .-g\n"));
}

#[test]
fn virtual_registers_are_an_error() {
    let mut function = answer();
    let v = function.new_vreg(RegClass::Gpr);
    function.blocks[0].instrs.insert(0, instr::mov(Reg::X0, v));

    let mut output = String::new();
    let result = AsmOutputter::new(&mut output, TargetInfo::new(Abi::Linux))
        .write_module(std::slice::from_ref(&function));
    assert_eq!(
        Err(EmitError::VirtualRegister {
            function: "f".to_owned(),
            reg: v,
        }),
        result
    );
}

#[test]
fn local_labels_of_different_functions_never_clash() {
    let jump = |from: &str, to: &str, value| {
        function_of(
            from,
            vec![
                ("entry", vec![instr::b(to.into())]),
                (to, vec![instr::mov_imm(Reg::X0, value), instr::ret(Some(Reg::X0))]),
            ],
        )
    };
    let output = emit(Abi::Linux, &[jump("a_b", "c", 1), jump("a", "b_c", 2)]);

    assert!(output.contains("  b .L3a_b_c\n.L3a_b_c:\n"));
    assert!(output.contains("  b .L1a_b_c\n.L1a_b_c:\n"));
    let definitions: Vec<_> = output.lines().filter(|line| line.ends_with(':')).collect();
    let mut unique = definitions.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(definitions.len(), unique.len());
}

#[test]
fn outgoing_arguments_sit_below_the_callee_saved_registers() {
    let mut function = function_of(
        "many",
        vec![(
            "entry",
            vec![
                instr::mov(Reg::X(19), Reg::X0),
                instr::str(Reg::X(19), Reg::SP, 0),
                instr::bl("callee".into(), 8, 0),
                instr::ret(Some(Reg::X0)),
            ],
        )],
    );
    function.frame.reserve_outgoing(8);
    function.frame.set_callee_saved([Reg::X(19)]);

    let output = emit(Abi::Linux, &[function]);
    assert!(
        output.contains(
            "  str x19, [sp, #-16]!
  sub sp, sp, #16
.L4many_entry:
  mov x19, x0
  str x19, [sp]
  bl callee
  add sp, sp, #16
  ldr x19, [sp], #16
  ldp x29, x30, [sp], #16
  ret
"
        ),
        "{output}"
    );
}
