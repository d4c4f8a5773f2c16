
mod info;

pub use info::*;

use crate::{Label, Reg};
use arrayvec::ArrayVec;
use std::fmt;

/// Constructors for every [`Opcode`], in the operand order the opcode expects.
pub mod instr {
    use super::*;

    fn regs<const N: usize>(opcode: Opcode, regs: [Reg; N]) -> Instr {
        Instr::new(opcode, regs.map(Operand::Reg))
    }

    pub fn mov(rd: Reg, rs: Reg) -> Instr {
        regs(Opcode::MovRR, [rd, rs])
    }

    /// Move an immediate that a single `mov` can encode. Use [`materialize_imm`] for arbitrary
    /// constants.
    pub fn mov_imm(rd: Reg, imm: i64) -> Instr {
        Instr::new(Opcode::MovRI, [Operand::Reg(rd), Operand::Imm(imm)])
    }

    pub fn movz(rd: Reg, imm16: u16, shift: u8) -> Instr {
        Instr::new(
            Opcode::MovZ,
            [
                Operand::Reg(rd),
                Operand::Imm(imm16 as i64),
                Operand::Imm(shift as i64),
            ],
        )
    }

    pub fn movk(rd: Reg, imm16: u16, shift: u8) -> Instr {
        Instr::new(
            Opcode::MovK,
            [
                Operand::Reg(rd),
                Operand::Imm(imm16 as i64),
                Operand::Imm(shift as i64),
            ],
        )
    }

    pub fn fmov(dd: Reg, ds: Reg) -> Instr {
        regs(Opcode::FMovRR, [dd, ds])
    }

    /// Copy the raw bits of a general-purpose register into a floating-point register.
    pub fn fmov_from_gpr(dd: Reg, xs: Reg) -> Instr {
        regs(Opcode::FMovGR, [dd, xs])
    }

    pub fn add(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::AddRRR, [rd, rn, rm])
    }

    pub fn sub(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::SubRRR, [rd, rn, rm])
    }

    pub fn mul(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::MulRRR, [rd, rn, rm])
    }

    pub fn sdiv(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::SDivRRR, [rd, rn, rm])
    }

    pub fn udiv(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::UDivRRR, [rd, rn, rm])
    }

    pub fn and(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::AndRRR, [rd, rn, rm])
    }

    pub fn orr(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::OrrRRR, [rd, rn, rm])
    }

    pub fn eor(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::EorRRR, [rd, rn, rm])
    }

    pub fn lsl(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::LslRRR, [rd, rn, rm])
    }

    pub fn lsr(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::LsrRRR, [rd, rn, rm])
    }

    pub fn asr(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::AsrRRR, [rd, rn, rm])
    }

    /// `rd = ra + rn * rm`
    pub fn madd(rd: Reg, rn: Reg, rm: Reg, ra: Reg) -> Instr {
        regs(Opcode::MAddRRRR, [rd, rn, rm, ra])
    }

    /// `rd = ra - rn * rm`
    pub fn msub(rd: Reg, rn: Reg, rm: Reg, ra: Reg) -> Instr {
        regs(Opcode::MSubRRRR, [rd, rn, rm, ra])
    }

    /// The high half of the signed product of `rn` and `rm`.
    pub fn smulh(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::SMulHRRR, [rd, rn, rm])
    }

    pub fn adds(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::AddsRRR, [rd, rn, rm])
    }

    pub fn subs(rd: Reg, rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::SubsRRR, [rd, rn, rm])
    }

    /// Sign-extend the low 32 bits of `rn` into `rd`.
    pub fn sxtw(rd: Reg, rn: Reg) -> Instr {
        regs(Opcode::SxtW, [rd, rn])
    }

    /// Zero-extend the low 32 bits of `rn` into `rd`.
    pub fn uxtw(rd: Reg, rn: Reg) -> Instr {
        regs(Opcode::UxtW, [rd, rn])
    }

    fn reg_imm(opcode: Opcode, rd: Reg, rn: Reg, imm: i64) -> Instr {
        Instr::new(opcode, [Operand::Reg(rd), Operand::Reg(rn), Operand::Imm(imm)])
    }

    /// Add a 12-bit unsigned immediate.
    pub fn add_imm(rd: Reg, rn: Reg, imm: i64) -> Instr {
        reg_imm(Opcode::AddRI, rd, rn, imm)
    }

    /// Subtract a 12-bit unsigned immediate.
    pub fn sub_imm(rd: Reg, rn: Reg, imm: i64) -> Instr {
        reg_imm(Opcode::SubRI, rd, rn, imm)
    }

    pub fn lsl_imm(rd: Reg, rn: Reg, shift: i64) -> Instr {
        reg_imm(Opcode::LslRI, rd, rn, shift)
    }

    pub fn lsr_imm(rd: Reg, rn: Reg, shift: i64) -> Instr {
        reg_imm(Opcode::LsrRI, rd, rn, shift)
    }

    pub fn asr_imm(rd: Reg, rn: Reg, shift: i64) -> Instr {
        reg_imm(Opcode::AsrRI, rd, rn, shift)
    }

    pub fn cmp(rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::CmpRR, [rn, rm])
    }

    pub fn cmp_imm(rn: Reg, imm: i64) -> Instr {
        Instr::new(Opcode::CmpRI, [Operand::Reg(rn), Operand::Imm(imm)])
    }

    pub fn tst(rn: Reg, rm: Reg) -> Instr {
        regs(Opcode::TstRR, [rn, rm])
    }

    /// Set `rd` to 1 if `cond` holds for the current flags, otherwise to 0.
    pub fn cset(rd: Reg, cond: Cond) -> Instr {
        Instr::new(Opcode::Cset, [Operand::Reg(rd), Operand::Cond(cond)])
    }

    pub fn fadd(dd: Reg, dn: Reg, dm: Reg) -> Instr {
        regs(Opcode::FAddRRR, [dd, dn, dm])
    }

    pub fn fsub(dd: Reg, dn: Reg, dm: Reg) -> Instr {
        regs(Opcode::FSubRRR, [dd, dn, dm])
    }

    pub fn fmul(dd: Reg, dn: Reg, dm: Reg) -> Instr {
        regs(Opcode::FMulRRR, [dd, dn, dm])
    }

    pub fn fdiv(dd: Reg, dn: Reg, dm: Reg) -> Instr {
        regs(Opcode::FDivRRR, [dd, dn, dm])
    }

    pub fn fcmp(dn: Reg, dm: Reg) -> Instr {
        regs(Opcode::FCmpRR, [dn, dm])
    }

    /// Convert the signed integer in `xn` to a double.
    pub fn scvtf(dd: Reg, xn: Reg) -> Instr {
        regs(Opcode::SCvtF, [dd, xn])
    }

    /// Convert the double in `dn` to a signed integer, rounding towards zero.
    pub fn fcvtzs(xd: Reg, dn: Reg) -> Instr {
        regs(Opcode::FCvtZS, [xd, dn])
    }

    pub fn ucvtf(dd: Reg, xn: Reg) -> Instr {
        regs(Opcode::UCvtF, [dd, xn])
    }

    pub fn fcvtzu(xd: Reg, dn: Reg) -> Instr {
        regs(Opcode::FCvtZU, [xd, dn])
    }

    fn mem(opcode: Opcode, rt: Reg, base: Reg, offset: i32) -> Instr {
        Instr::new(opcode, [Operand::Reg(rt), Operand::Mem { base, offset }])
    }

    pub fn ldr(rt: Reg, base: Reg, offset: i32) -> Instr {
        mem(Opcode::Ldr, rt, base, offset)
    }

    pub fn ldrsw(rt: Reg, base: Reg, offset: i32) -> Instr {
        mem(Opcode::LdrSw, rt, base, offset)
    }

    pub fn ldrb(rt: Reg, base: Reg, offset: i32) -> Instr {
        mem(Opcode::LdrB, rt, base, offset)
    }

    pub fn ldr_d(dt: Reg, base: Reg, offset: i32) -> Instr {
        mem(Opcode::LdrD, dt, base, offset)
    }

    pub fn str(rt: Reg, base: Reg, offset: i32) -> Instr {
        mem(Opcode::Str, rt, base, offset)
    }

    pub fn str_w(rt: Reg, base: Reg, offset: i32) -> Instr {
        mem(Opcode::StrW, rt, base, offset)
    }

    pub fn strb(rt: Reg, base: Reg, offset: i32) -> Instr {
        mem(Opcode::StrB, rt, base, offset)
    }

    pub fn str_d(dt: Reg, base: Reg, offset: i32) -> Instr {
        mem(Opcode::StrD, dt, base, offset)
    }

    pub fn ldp(rt1: Reg, rt2: Reg, base: Reg, offset: i32) -> Instr {
        Instr::new(
            Opcode::Ldp,
            [
                Operand::Reg(rt1),
                Operand::Reg(rt2),
                Operand::Mem { base, offset },
            ],
        )
    }

    pub fn stp(rt1: Reg, rt2: Reg, base: Reg, offset: i32) -> Instr {
        Instr::new(
            Opcode::Stp,
            [
                Operand::Reg(rt1),
                Operand::Reg(rt2),
                Operand::Mem { base, offset },
            ],
        )
    }

    pub fn b(target: Label) -> Instr {
        Instr::new(Opcode::Br, [Operand::Label(target)])
    }

    pub fn b_cond(cond: Cond, target: Label) -> Instr {
        Instr::new(Opcode::BCond, [Operand::Cond(cond), Operand::Label(target)])
    }

    pub fn cbz(rt: Reg, target: Label) -> Instr {
        Instr::new(Opcode::Cbz, [Operand::Reg(rt), Operand::Label(target)])
    }

    pub fn cbnz(rt: Reg, target: Label) -> Instr {
        Instr::new(Opcode::Cbnz, [Operand::Reg(rt), Operand::Label(target)])
    }

    /// Call `target`, passing arguments in the first `gpr_args` general-purpose and the first
    /// `fpr_args` floating-point argument registers.
    pub fn bl(target: Label, gpr_args: u8, fpr_args: u8) -> Instr {
        Instr::new(
            Opcode::Bl,
            [
                Operand::Label(target),
                Operand::Imm(gpr_args as i64),
                Operand::Imm(fpr_args as i64),
            ],
        )
    }

    /// Return to the caller. `value` is the register holding the return value, if any.
    pub fn ret(value: Option<Reg>) -> Instr {
        Instr::new(Opcode::Ret, value.map(Operand::Reg))
    }

    pub fn fall_through(target: Label) -> Instr {
        Instr::new(Opcode::FallThrough, [Operand::Label(target)])
    }

    /// Load an arbitrary 64-bit constant into `rd`.
    ///
    /// Constants in `-65536..=65535` take a single `mov`. Anything else starts with a `movz` of the
    /// lowest non-zero 16-bit chunk and adds a `movk` for every other non-zero chunk.
    pub fn materialize_imm(rd: Reg, imm: i64) -> Vec<Instr> {
        if (-65536..=65535).contains(&imm) {
            return vec![mov_imm(rd, imm)];
        }
        let bits = imm as u64;
        let mut chunks = (0..4u8)
            .map(|i| ((bits >> (16 * i)) as u16, 16 * i))
            .filter(|(chunk, _)| *chunk != 0);
        let mut instrs = Vec::with_capacity(4);
        // `imm` is outside the `mov` range, so at least one chunk is non-zero.
        if let Some((chunk, shift)) = chunks.next() {
            instrs.push(movz(rd, chunk, shift));
        }
        instrs.extend(chunks.map(|(chunk, shift)| movk(rd, chunk, shift)));
        instrs
    }
}

/// A condition code, as tested by `b.cond` and `cset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Eq,
    Ne,
    /// Signed less than.
    Lt,
    Le,
    Gt,
    Ge,
    /// Unsigned lower.
    Lo,
    /// Unsigned lower or same.
    Ls,
    /// Unsigned higher.
    Hi,
    /// Unsigned higher or same.
    Hs,
    /// Negative. After `fcmp`: less than, false when unordered.
    Mi,
    Pl,
    Vs,
    Vc,
}

impl Cond {
    /// The condition that holds exactly when `self` doesn't.
    pub fn invert(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Ge => Self::Lt,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Lo => Self::Hs,
            Self::Hs => Self::Lo,
            Self::Ls => Self::Hi,
            Self::Hi => Self::Ls,
            Self::Mi => Self::Pl,
            Self::Pl => Self::Mi,
            Self::Vs => Self::Vc,
            Self::Vc => Self::Vs,
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lo => "lo",
            Self::Ls => "ls",
            Self::Hi => "hi",
            Self::Hs => "hs",
            Self::Mi => "mi",
            Self::Pl => "pl",
            Self::Vs => "vs",
            Self::Vc => "vc",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(Reg),
    Imm(i64),
    Label(Label),
    /// `[base, #offset]`
    Mem {
        base: Reg,
        offset: i32,
    },
    Cond(Cond),
}

impl Operand {
    pub fn as_reg(&self) -> Option<Reg> {
        match self {
            Operand::Reg(reg) => Some(*reg),
            _ => None,
        }
    }

    pub fn as_imm(&self) -> Option<i64> {
        match self {
            Operand::Imm(imm) => Some(*imm),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&Label> {
        match self {
            Operand::Label(label) => Some(label),
            _ => None,
        }
    }

    pub fn as_cond(&self) -> Option<Cond> {
        match self {
            Operand::Cond(cond) => Some(*cond),
            _ => None,
        }
    }

    /// The register read or written by this operand: the register itself, or the base of a
    /// memory operand.
    fn reg(&self) -> Option<Reg> {
        match self {
            Operand::Reg(reg) | Operand::Mem { base: reg, .. } => Some(*reg),
            _ => None,
        }
    }
}

/// A single machine instruction: an opcode with at most four operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instr {
    pub opcode: Opcode,
    pub operands: ArrayVec<Operand, 4>,
}

impl Instr {
    /// Panics if more than four operands are given.
    pub fn new(opcode: Opcode, operands: impl IntoIterator<Item = Operand>) -> Self {
        Self {
            opcode,
            operands: operands.into_iter().collect(),
        }
    }

    pub fn info(&self) -> OpcodeInfo {
        self.opcode.info()
    }

    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }

    pub fn reads_flags(&self) -> bool {
        self.info().reads_flags
    }

    pub fn writes_flags(&self) -> bool {
        self.info().writes_flags
    }

    pub fn reg(&self, index: usize) -> Option<Reg> {
        self.operands.get(index).and_then(Operand::as_reg)
    }

    pub fn imm(&self, index: usize) -> Option<i64> {
        self.operands.get(index).and_then(Operand::as_imm)
    }

    /// The base register and offset of the memory operand, if there is one.
    pub fn mem(&self) -> Option<(Reg, i32)> {
        self.operands.iter().find_map(|operand| match operand {
            Operand::Mem { base, offset } => Some((*base, *offset)),
            _ => None,
        })
    }

    /// Registers written by the instruction, explicit ones first.
    ///
    /// A call clobbers every caller-saved register and the link register.
    pub fn defs(&self) -> Vec<Reg> {
        let info = self.info();
        let mut defs: Vec<Reg> = info
            .defs
            .iter()
            .filter_map(|&i| self.operands.get(i).and_then(Operand::as_reg))
            .collect();
        if self.opcode == Opcode::Bl {
            defs.extend((0..=17).map(Reg::X));
            defs.push(Reg::LR);
            defs.extend((0..=7).chain(16..=31).map(Reg::D));
        }
        defs
    }

    /// Registers read by the instruction, explicit ones first.
    ///
    /// A call reads the argument registers that carry its arguments.
    pub fn uses(&self) -> Vec<Reg> {
        let info = self.info();
        let mut uses: Vec<Reg> = info
            .uses
            .iter()
            .filter_map(|&i| self.operands.get(i).and_then(Operand::reg))
            .collect();
        if self.opcode == Opcode::Bl {
            let gprs = self.imm(1).unwrap_or(0) as u8;
            let fprs = self.imm(2).unwrap_or(0) as u8;
            uses.extend((0..gprs).map(Reg::X));
            uses.extend((0..fprs).map(Reg::D));
        }
        uses
    }

    /// Registers that appear in the operands, including bases of memory operands.
    pub fn regs(&self) -> impl Iterator<Item = Reg> + '_ {
        self.operands.iter().filter_map(Operand::reg)
    }

    pub fn regs_mut(&mut self) -> impl Iterator<Item = &mut Reg> + '_ {
        self.operands.iter_mut().filter_map(|operand| match operand {
            Operand::Reg(reg) | Operand::Mem { base: reg, .. } => Some(reg),
            _ => None,
        })
    }

    /// The blocks this instruction may transfer control to. Calls are not branches.
    pub fn branch_target(&self) -> Option<&Label> {
        if !self.opcode.is_branch() {
            return None;
        }
        self.operands.iter().find_map(Operand::as_label)
    }

    pub fn branch_target_mut(&mut self) -> Option<&mut Label> {
        if !self.opcode.is_branch() {
            return None;
        }
        self.operands.iter_mut().find_map(|operand| match operand {
            Operand::Label(label) => Some(label),
            _ => None,
        })
    }

    /// Writes the instruction in assembly syntax, rendering labels with `label`.
    ///
    /// [`Opcode::FallThrough`] writes nothing.
    pub fn write_asm<W: fmt::Write>(
        &self,
        w: &mut W,
        label: &dyn Fn(&Label) -> String,
    ) -> fmt::Result {
        let operand = |w: &mut W, index: usize| -> fmt::Result {
            match self.operands.get(index) {
                Some(Operand::Reg(reg)) => write!(w, "{reg}"),
                Some(Operand::Imm(imm)) => write!(w, "#{imm}"),
                Some(Operand::Label(l)) => w.write_str(&label(l)),
                Some(Operand::Mem { base, offset: 0 }) => write!(w, "[{base}]"),
                Some(Operand::Mem { base, offset }) => write!(w, "[{base}, #{offset}]"),
                Some(Operand::Cond(cond)) => write!(w, "{cond}"),
                None => Err(fmt::Error),
            }
        };
        let mnemonic = self.opcode.mnemonic();
        match self.opcode {
            Opcode::FallThrough => Ok(()),
            Opcode::Ret => w.write_str("ret"),
            Opcode::Bl | Opcode::Br => {
                write!(w, "{mnemonic} ")?;
                operand(w, 0)
            }
            Opcode::BCond => {
                write!(w, "b.")?;
                operand(w, 0)?;
                w.write_str(" ")?;
                operand(w, 1)
            }
            Opcode::MovZ | Opcode::MovK => {
                write!(w, "{mnemonic} ")?;
                operand(w, 0)?;
                w.write_str(", ")?;
                operand(w, 1)?;
                match self.imm(2) {
                    Some(0) | None => Ok(()),
                    Some(shift) => write!(w, ", lsl #{shift}"),
                }
            }
            Opcode::SxtW => {
                let (rd, rn) = (self.reg(0).ok_or(fmt::Error)?, self.reg(1).ok_or(fmt::Error)?);
                write!(w, "{mnemonic} {rd}, {rn:#}")
            }
            Opcode::UxtW => {
                let (rd, rn) = (self.reg(0).ok_or(fmt::Error)?, self.reg(1).ok_or(fmt::Error)?);
                write!(w, "{mnemonic} {rd:#}, {rn:#}")
            }
            // Narrow accesses name the 32-bit view of the data register.
            Opcode::LdrB | Opcode::StrW | Opcode::StrB => {
                let rt = self.reg(0).ok_or(fmt::Error)?;
                write!(w, "{mnemonic} {rt:#}, ")?;
                operand(w, 1)
            }
            _ => {
                w.write_str(mnemonic)?;
                for index in 0..self.operands.len() {
                    w.write_str(if index == 0 { " " } else { ", " })?;
                    operand(w, index)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            Opcode::FallThrough => write!(f, "fallthrough {}", self.operands[0]),
            Opcode::Ret => match self.reg(0) {
                Some(value) => write!(f, "ret {value}"),
                None => f.write_str("ret"),
            },
            _ => self.write_asm(f, &|label| label.to_string()),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{reg}"),
            Operand::Imm(imm) => write!(f, "#{imm}"),
            Operand::Label(label) => write!(f, "{label}"),
            Operand::Mem { base, offset: 0 } => write!(f, "[{base}]"),
            Operand::Mem { base, offset } => write!(f, "[{base}, #{offset}]"),
            Operand::Cond(cond) => write!(f, "{cond}"),
        }
    }
}
