use std::{env, fs, process::Command, time::Duration};

use comp_lib::{
    compile::{compile, Abi, CompileOptsBuilder},
    diagnostic::{AggregateResult, Code, DiagnosticKind},
};
use wait_timeout::ChildExt;

include! {concat!(env!("OUT_DIR"), "/tests.rs")}

const ASSEMBLER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
enum Check<'a> {
    Contains(&'a str),
    Excludes(&'a str),
    /// The number of lines containing the text.
    Count(usize, &'a str),
}

fn compile_file(file: &str, abi: Abi) -> AggregateResult<Vec<u8>> {
    let source = fs::read_to_string(file).unwrap();
    let opts = CompileOptsBuilder::new().abi(abi).verify(true).build().unwrap();
    compile(&source, &opts)
}

fn print_diagnostics<T>(res: &AggregateResult<T>) {
    for (t, d) in res.diagnostics() {
        match t {
            DiagnosticKind::Rec => println!("Rec: {d:?}"),
            DiagnosticKind::Err => println!("Err: {d:?}"),
        }
    }
}

/// Runs the assembler named by `VIPER_AS` on the output, when it's set and can target `abi`.
fn assemble(assembly: &str, abi: Abi) {
    let Some(assembler) = env::var_os("VIPER_AS") else {
        return;
    };
    if abi != Abi::host() {
        return;
    }

    let file = temp_file::with_contents(assembly.as_bytes());
    let mut child = Command::new(assembler)
        .arg("-o")
        .arg(if cfg!(windows) { "NUL" } else { "/dev/null" })
        .arg(file.path())
        .spawn()
        .expect("Failed to spawn the assembler");

    let status = match child
        .wait_timeout(ASSEMBLER_TIMEOUT)
        .expect("Failed to wait on the assembler")
    {
        Some(status) => status,
        None => {
            child.kill().unwrap();
            panic!("The assembler didn't finish in {ASSEMBLER_TIMEOUT:?}");
        }
    };
    assert!(status.success(), "The assembler rejected:\n{assembly}");
}

fn asm_test(file: &str, abi: Abi, checks: &[Check]) {
    let res = compile_file(file, abi);
    if res.is_err() {
        println!(
            "Expected file `{}` to compile successfully but got the following diagnostics:",
            file
        );
        print_diagnostics(&res);
        println!();
    }
    let assembly = String::from_utf8(res.into_value().unwrap()).unwrap();

    for check in checks {
        match check {
            Check::Contains(text) => assert!(
                assembly.contains(text),
                "Expected `{text}` in the assembly:\n{assembly}"
            ),
            Check::Excludes(text) => assert!(
                !assembly.contains(text),
                "Didn't expect `{text}` in the assembly:\n{assembly}"
            ),
            Check::Count(count, text) => pretty_assertions::assert_eq!(
                *count,
                assembly.lines().filter(|line| line.contains(text)).count(),
                "Lines containing `{}` in the assembly:\n{}",
                text,
                assembly
            ),
        }
    }

    assemble(&assembly, abi);
}

fn diagnostics_test(file: &str, expected_codes: Vec<Code>, needs_err: bool) {
    let res = compile_file(file, Abi::Linux);
    if needs_err && !res.is_err() {
        panic!("Expected compile to fail, but it didn't!");
    }
    if !needs_err && res.is_err() {
        println!("Expected compile to succeed with only warnings, but it didn't! Here are the diagnostics:");
        print_diagnostics(&res);
        panic!("");
    }

    let found_codes: Vec<_> = res.diagnostics().map(|(_, d)| *d.code()).collect();
    pretty_assertions::assert_eq!(
        expected_codes,
        found_codes,
        "The diagnostic codes (left) don't match the ones found (right)"
    );
}
