use aarch64_ir::{self as mir, instr, Cond, Reg, RegClass, TargetInfo};
use viper_il::{Opcode, Type};

pub fn reg_class(ty: Type) -> RegClass {
    if ty.is_float() {
        RegClass::Fpr
    } else {
        RegClass::Gpr
    }
}

/// `imm` as a value of type `ty`: `i32` constants are truncated and sign-extended.
pub fn normalize_int(imm: i64, ty: Type) -> i64 {
    match ty {
        Type::I32 => imm as i32 as i64,
        _ => imm,
    }
}

/// Returns `true` if `imm` fits the unsigned 12-bit immediate of `add`, `sub` and `cmp`.
pub fn is_arith_imm(imm: i64) -> bool {
    (0..=4095).contains(&imm)
}

/// The condition to test after comparing the operands of a compare opcode.
///
/// Floating point `lt` and `le` use `mi` and `ls`, which are false for unordered operands.
pub fn compare_cond(opcode: Opcode) -> Option<Cond> {
    let cond = match opcode {
        Opcode::ICmpEq | Opcode::FCmpEq => Cond::Eq,
        Opcode::ICmpNe | Opcode::FCmpNe => Cond::Ne,
        Opcode::SCmpLt => Cond::Lt,
        Opcode::SCmpLe => Cond::Le,
        Opcode::SCmpGt | Opcode::FCmpGt => Cond::Gt,
        Opcode::SCmpGe | Opcode::FCmpGe => Cond::Ge,
        Opcode::UCmpLt => Cond::Lo,
        Opcode::UCmpLe => Cond::Ls,
        Opcode::UCmpGt => Cond::Hi,
        Opcode::UCmpGe => Cond::Hs,
        Opcode::FCmpLt => Cond::Mi,
        Opcode::FCmpLe => Cond::Ls,
        _ => return None,
    };
    Some(cond)
}

/// Loads a value of type `ty` from `[base, #offset]`.
pub fn load(ty: Type, rt: Reg, base: Reg, offset: i32) -> mir::Instr {
    match ty {
        Type::F64 => instr::ldr_d(rt, base, offset),
        Type::I32 => instr::ldrsw(rt, base, offset),
        Type::I1 => instr::ldrb(rt, base, offset),
        Type::I64 | Type::Ptr | Type::Void => instr::ldr(rt, base, offset),
    }
}

/// Stores a value of type `ty` to `[base, #offset]`.
pub fn store(ty: Type, rt: Reg, base: Reg, offset: i32) -> mir::Instr {
    match ty {
        Type::F64 => instr::str_d(rt, base, offset),
        Type::I32 => instr::str_w(rt, base, offset),
        Type::I1 => instr::strb(rt, base, offset),
        Type::I64 | Type::Ptr | Type::Void => instr::str(rt, base, offset),
    }
}

/// Copies `rs` into `rd`, which must be of the same class.
pub fn copy(rd: Reg, rs: Reg) -> mir::Instr {
    match rd.class() {
        RegClass::Gpr => instr::mov(rd, rs),
        RegClass::Fpr => instr::fmov(rd, rs),
    }
}

/// Where an argument is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLocation {
    Reg(Reg),
    /// Byte offset into the stack arguments.
    Stack(i32),
}

/// Assigns arguments, in order, to the argument registers of their class. Once a class runs out,
/// its arguments go to consecutive 8-byte stack slots.
pub struct ArgLocations<'t> {
    target: &'t TargetInfo,
    next_reg: [usize; 2],
    stack_slots: u32,
}

impl<'t> ArgLocations<'t> {
    pub fn new(target: &'t TargetInfo) -> Self {
        Self {
            target,
            next_reg: [0; 2],
            stack_slots: 0,
        }
    }

    pub fn next(&mut self, class: RegClass) -> ArgLocation {
        let next = &mut self.next_reg[class as usize];
        match self.target.arg_regs(class).get(*next) {
            Some(&reg) => {
                *next += 1;
                ArgLocation::Reg(reg)
            }
            None => {
                self.stack_slots += 1;
                ArgLocation::Stack(8 * (self.stack_slots as i32 - 1))
            }
        }
    }

    /// The number of general-purpose and floating-point argument registers handed out.
    pub fn reg_counts(&self) -> [u8; 2] {
        self.next_reg.map(|count| count as u8)
    }

    pub fn stack_bytes(&self) -> u32 {
        8 * self.stack_slots
    }
}
