
mod vreg_generator;

pub use vreg_generator::*;

/// The register file a register belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegClass {
    /// General-purpose 64-bit registers.
    Gpr,
    /// Floating-point registers, used as 64-bit doubles.
    Fpr,
}

impl std::fmt::Display for RegClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RegClass::Gpr => "general-purpose",
            RegClass::Fpr => "floating-point",
        })
    }
}

/// Represents a (possibly virtual) AArch64 register.
///
/// The registers are conventionally used as follows (AAPCS64):
///
/// | register    | preserved? | usage |
/// | ----------- | --- | ------------ |
/// |`x0` - `x7`  | no  | arguments and results |
/// |`x8`         | no  | indirect result location |
/// |`x9` - `x15` | no  | temporaries |
/// |`x16` - `x17`| no  | intra-procedure-call scratch, never allocated |
/// |`x18`        | -   | platform register, never allocated |
/// |`x19` - `x28`| yes | saved temporaries |
/// |`x29`        | yes | frame pointer |
/// |`x30`        | yes | link register |
/// |`sp`         | yes | stack pointer, encoded as `X(31)` |
/// |`d0` - `d7`  | no  | floating-point arguments and results |
/// |`d8` - `d15` | yes | saved temporaries (low 64 bits only) |
/// |`d16` - `d31`| no  | temporaries |
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reg {
    /// x0 - x30, and the stack pointer as 31.
    X(u8),
    /// d0 - d31
    D(u8),
    /// A virtual register that yet has to be assigned a physical register of its class.
    Virtual(RegClass, u32),
}

impl Reg {
    pub const X0: Self = Self::X(0);
    pub const X1: Self = Self::X(1);
    pub const D0: Self = Self::D(0);
    /// Scratch registers used by the emitter for out-of-range addressing.
    pub const IP0: Self = Self::X(16);
    pub const IP1: Self = Self::X(17);
    /// Platform register.
    pub const PR: Self = Self::X(18);
    pub const FP: Self = Self::X(29);
    pub const LR: Self = Self::X(30);
    pub const SP: Self = Self::X(31);

    /// Returns `true` if this is a physical register.
    pub fn is_phys(&self) -> bool {
        !self.is_virtual()
    }

    /// Returns `true` if this is a virtual register.
    ///
    /// Lowering names every IL value with a virtual register. There is an unbounded number of
    /// them; register allocation replaces each with a physical register of the same class.
    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual(..))
    }

    pub fn class(&self) -> RegClass {
        match self {
            Self::X(_) => RegClass::Gpr,
            Self::D(_) => RegClass::Fpr,
            Self::Virtual(class, _) => *class,
        }
    }

    /// The register number for physical registers, or the virtual id.
    pub fn id(&self) -> u32 {
        match self {
            Self::X(n) | Self::D(n) => *n as u32,
            Self::Virtual(_, id) => *id,
        }
    }

    /// Returns `true` if a callee has to preserve the register.
    ///
    /// Virtual registers are not considered callee-saved.
    pub fn is_callee_saved(&self) -> bool {
        matches!(self, Self::X(19..=28) | Self::D(8..=15))
    }

    /// Returns `true` if a call may clobber the register.
    pub fn is_caller_saved(&self) -> bool {
        matches!(self, Self::X(0..=17) | Self::D(0..=7) | Self::D(16..=31))
    }
}

impl std::fmt::Debug for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// Formats the register with its 64-bit name. The alternate form (`{:#}`) gives the 32-bit view of
/// general-purpose registers (`w3`, `wsp`), which narrow loads and stores need.
impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X(31) if f.alternate() => f.write_str("wsp"),
            Self::X(31) => f.write_str("sp"),
            Self::X(n @ 0..=30) if f.alternate() => write!(f, "w{n}"),
            Self::X(n @ 0..=30) => write!(f, "x{n}"),
            Self::X(n) => panic!("encountered nonexistent register x{n}"),
            Self::D(n @ 0..=31) => write!(f, "d{n}"),
            Self::D(n) => panic!("encountered nonexistent register d{n}"),
            Self::Virtual(RegClass::Gpr, id) => write!(f, "%v{id}"),
            Self::Virtual(RegClass::Fpr, id) => write!(f, "%f{id}"),
        }
    }
}
