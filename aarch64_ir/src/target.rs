use crate::{Reg, RegClass};
use std::fmt;

/// The object format and symbol conventions to emit for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Abi {
    /// Mach-O on macOS: global symbols get a leading `_`, local labels start with `L`.
    Darwin,
    /// ELF on Linux: symbols are undecorated, local labels start with `.L` and functions carry
    /// `.type` and `.size` directives.
    Linux,
}

impl Abi {
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            Abi::Darwin
        } else {
            Abi::Linux
        }
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Abi::Darwin => "darwin",
            Abi::Linux => "linux",
        })
    }
}

impl std::str::FromStr for Abi {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "darwin" | "macos" => Ok(Abi::Darwin),
            "linux" | "elf" => Ok(Abi::Linux),
            _ => Err(()),
        }
    }
}

const GPR_ARGS: [Reg; 8] = [
    Reg::X(0),
    Reg::X(1),
    Reg::X(2),
    Reg::X(3),
    Reg::X(4),
    Reg::X(5),
    Reg::X(6),
    Reg::X(7),
];
const FPR_ARGS: [Reg; 8] = [
    Reg::D(0),
    Reg::D(1),
    Reg::D(2),
    Reg::D(3),
    Reg::D(4),
    Reg::D(5),
    Reg::D(6),
    Reg::D(7),
];

/// The target descriptor: ABI constants and naming rules for AArch64 (AAPCS64).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub abi: Abi,
}

impl TargetInfo {
    pub const STACK_ALIGNMENT: u32 = 16;

    pub fn new(abi: Abi) -> Self {
        Self { abi }
    }

    pub fn host() -> Self {
        Self::new(Abi::host())
    }

    /// The assembler symbol of a global function or extern.
    pub fn mangle(&self, name: &str) -> String {
        match self.abi {
            Abi::Darwin => format!("_{name}"),
            Abi::Linux => name.to_owned(),
        }
    }

    /// The assembler-local label of `block` in `function`.
    ///
    /// The function name is prefixed with its length. Function names never start with a digit,
    /// so distinct (function, block) pairs never share a label, even when the names contain `_`.
    pub fn local_label(&self, function: &str, block: &str) -> String {
        let len = function.len();
        match self.abi {
            Abi::Darwin => format!("L{len}{function}_{block}"),
            Abi::Linux => format!(".L{len}{function}_{block}"),
        }
    }

    pub fn arg_regs(&self, class: RegClass) -> &'static [Reg] {
        match class {
            RegClass::Gpr => &GPR_ARGS,
            RegClass::Fpr => &FPR_ARGS,
        }
    }

    pub fn return_reg(&self, class: RegClass) -> Reg {
        match class {
            RegClass::Gpr => Reg::X0,
            RegClass::Fpr => Reg::D0,
        }
    }

    /// Registers that are never handed out by the register allocator.
    pub fn is_reserved(&self, reg: Reg) -> bool {
        matches!(
            reg,
            Reg::SP | Reg::FP | Reg::LR | Reg::PR | Reg::IP0 | Reg::IP1
        )
    }

    /// The registers the allocator may assign, lowest register number first.
    pub fn allocatable(&self, class: RegClass) -> Vec<Reg> {
        match class {
            RegClass::Gpr => (0..=15)
                .chain(19..=28)
                .map(Reg::X)
                .filter(|reg| !self.is_reserved(*reg))
                .collect(),
            RegClass::Fpr => (0..=31).map(Reg::D).collect(),
        }
    }
}
