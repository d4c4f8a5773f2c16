use crate::{write_comma_separated, Name, Type, Value};
use std::{fmt, str::FromStr};

macro_rules! define_opcodes {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// The closed set of IL opcodes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($variant),+
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant),+];

            /// The mnemonic used in the textual IL.
            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name),+
                }
            }
        }

        impl FromStr for Opcode {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Opcode::$variant),)+
                    _ => Err(()),
                }
            }
        }
    };
}

define_opcodes! {
    Add => "add",
    Sub => "sub",
    Mul => "mul",
    SDiv => "sdiv",
    UDiv => "udiv",
    SRem => "srem",
    URem => "urem",
    IAddOvf => "iadd.ovf",
    ISubOvf => "isub.ovf",
    IMulOvf => "imul.ovf",
    SDivChk0 => "sdiv.chk0",
    UDivChk0 => "udiv.chk0",
    SRemChk0 => "srem.chk0",
    URemChk0 => "urem.chk0",
    And => "and",
    Or => "or",
    Xor => "xor",
    Shl => "shl",
    LShr => "lshr",
    AShr => "ashr",
    FAdd => "fadd",
    FSub => "fsub",
    FMul => "fmul",
    FDiv => "fdiv",
    ICmpEq => "icmp_eq",
    ICmpNe => "icmp_ne",
    SCmpLt => "scmp_lt",
    SCmpLe => "scmp_le",
    SCmpGt => "scmp_gt",
    SCmpGe => "scmp_ge",
    UCmpLt => "ucmp_lt",
    UCmpLe => "ucmp_le",
    UCmpGt => "ucmp_gt",
    UCmpGe => "ucmp_ge",
    FCmpEq => "fcmp_eq",
    FCmpNe => "fcmp_ne",
    FCmpLt => "fcmp_lt",
    FCmpLe => "fcmp_le",
    FCmpGt => "fcmp_gt",
    FCmpGe => "fcmp_ge",
    Sitofp => "sitofp",
    Fptosi => "fptosi",
    Uitofp => "uitofp",
    Fptoui => "fptoui",
    Zext1 => "zext1",
    Trunc1 => "trunc1",
    Alloca => "alloca",
    Load => "load",
    Store => "store",
    Gep => "gep",
    Call => "call",
    Ret => "ret",
    Br => "br",
    CBr => "cbr",
    SwitchI32 => "switch.i32",
    Trap => "trap",
}

/// How the operands of an opcode are laid out, used by the parser and the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// `op a, b`
    Binary,
    /// `op a`
    Unary,
    /// `alloca <bytes>`
    Alloca,
    /// `load <ty>, <ptr>`
    Load,
    /// `store <ty>, <ptr>, <value>`
    Store,
    /// `call @callee(<args>)`
    Call,
    /// `ret [value]`
    Ret,
    /// `br label(args)`
    Br,
    /// `cbr cond, label(args), label(args)`
    CBr,
    /// `switch.i32 value, default(args), 1 -> label(args), ...`
    Switch,
    /// `trap`
    Nullary,
}

impl Opcode {
    pub fn shape(self) -> OperandShape {
        use Opcode::*;
        match self {
            Add | Sub | Mul | SDiv | UDiv | SRem | URem | IAddOvf | ISubOvf | IMulOvf
            | SDivChk0 | UDivChk0 | SRemChk0 | URemChk0 | And | Or | Xor | Shl | LShr | AShr
            | FAdd | FSub | FMul | FDiv | ICmpEq | ICmpNe | SCmpLt | SCmpLe | SCmpGt | SCmpGe
            | UCmpLt | UCmpLe | UCmpGt | UCmpGe | FCmpEq | FCmpNe | FCmpLt | FCmpLe | FCmpGt
            | FCmpGe | Gep => OperandShape::Binary,
            Sitofp | Fptosi | Uitofp | Fptoui | Zext1 | Trunc1 => OperandShape::Unary,
            Alloca => OperandShape::Alloca,
            Load => OperandShape::Load,
            Store => OperandShape::Store,
            Call => OperandShape::Call,
            Ret => OperandShape::Ret,
            Br => OperandShape::Br,
            CBr => OperandShape::CBr,
            SwitchI32 => OperandShape::Switch,
            Trap => OperandShape::Nullary,
        }
    }

    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Ret | Opcode::Br | Opcode::CBr | Opcode::SwitchI32 | Opcode::Trap
        )
    }

    pub fn is_compare(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            ICmpEq
                | ICmpNe
                | SCmpLt
                | SCmpLe
                | SCmpGt
                | SCmpGe
                | UCmpLt
                | UCmpLe
                | UCmpGt
                | UCmpGe
                | FCmpEq
                | FCmpNe
                | FCmpLt
                | FCmpLe
                | FCmpGt
                | FCmpGe
        )
    }

    /// Whether the opcode must (or may, for calls) produce a result.
    pub fn has_result(self) -> bool {
        self != Opcode::Store && !self.is_terminator()
    }

    /// Whether the opcode traps at run time when its operands are out of range: a zero divisor,
    /// or a result that overflows its type.
    pub fn is_checked(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            IAddOvf | ISubOvf | IMulOvf | SDivChk0 | UDivChk0 | SRemChk0 | URemChk0
        )
    }

    /// The result type of the opcode when it doesn't depend on the operands.
    pub fn fixed_result_type(self) -> Option<Type> {
        use Opcode::*;
        match self {
            FAdd | FSub | FMul | FDiv | Sitofp | Uitofp => Some(Type::F64),
            Fptosi | Fptoui | Zext1 => Some(Type::I64),
            Trunc1 => Some(Type::I1),
            Alloca | Gep => Some(Type::Ptr),
            op if op.is_compare() => Some(Type::I1),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A branch destination together with the arguments passed to the block parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchTarget {
    pub label: Name,
    pub args: Vec<Value>,
}

impl BranchTarget {
    pub fn new(label: impl Into<Name>, args: Vec<Value>) -> Self {
        Self {
            label: label.into(),
            args,
        }
    }
}

impl fmt::Display for BranchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        if !self.args.is_empty() {
            f.write_str("(")?;
            write_comma_separated(f, &self.args)?;
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// A single IL instruction.
///
/// `ty` is the type of the result. For `load` and `store` it is the type of the value being
/// transferred, and for instructions without a result it is [`Type::Void`] (except `store`).
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub result: Option<Name>,
    pub ty: Type,
    pub opcode: Opcode,
    pub operands: Vec<Value>,
    pub callee: Option<Name>,
    pub targets: Vec<BranchTarget>,
}

impl Instr {
    pub fn new(opcode: Opcode, ty: Type, operands: Vec<Value>) -> Self {
        Self {
            result: None,
            ty,
            opcode,
            operands,
            callee: None,
            targets: Vec::new(),
        }
    }

    pub fn with_result(mut self, result: impl Into<Name>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_callee(mut self, callee: impl Into<Name>) -> Self {
        self.callee = Some(callee.into());
        self
    }

    pub fn with_targets(mut self, targets: Vec<BranchTarget>) -> Self {
        self.targets = targets;
        self
    }

    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = &self.result {
            if self.opcode == Opcode::Call {
                write!(f, "%{result}:{} = ", self.ty)?;
            } else {
                write!(f, "%{result} = ")?;
            }
        }
        write!(f, "{}", self.opcode)?;
        match self.opcode.shape() {
            OperandShape::Binary | OperandShape::Unary | OperandShape::Alloca => {
                f.write_str(" ")?;
                write_comma_separated(f, &self.operands)?;
            }
            OperandShape::Load | OperandShape::Store => {
                write!(f, " {}, ", self.ty)?;
                write_comma_separated(f, &self.operands)?;
            }
            OperandShape::Call => {
                if let Some(callee) = &self.callee {
                    write!(f, " @{callee}(")?;
                }
                write_comma_separated(f, &self.operands)?;
                f.write_str(")")?;
            }
            OperandShape::Ret => {
                if let Some(value) = self.operands.first() {
                    write!(f, " {value}")?;
                }
            }
            OperandShape::Br => {
                f.write_str(" ")?;
                write_comma_separated(f, &self.targets)?;
            }
            OperandShape::CBr => {
                f.write_str(" ")?;
                write_comma_separated(f, &self.operands)?;
                f.write_str(", ")?;
                write_comma_separated(f, &self.targets)?;
            }
            OperandShape::Switch => {
                f.write_str(" ")?;
                if let (Some(scrutinee), Some(default)) =
                    (self.operands.first(), self.targets.first())
                {
                    write!(f, "{scrutinee}, {default}")?;
                }
                for (value, target) in self.operands.iter().zip(&self.targets).skip(1) {
                    write!(f, ", {value} -> {target}")?;
                }
            }
            OperandShape::Nullary => {}
        }
        Ok(())
    }
}
