use super::{
    function_generator::{FunctionGenerator, Result},
    util::{self, ArgLocation, ArgLocations},
    LoweringErrorKind,
};
use aarch64_ir::{instr, Cond, Instr, Reg};
use viper_il::{self as il, instruction::OperandShape, Opcode, Type, Value};

type RegRegReg = fn(Reg, Reg, Reg) -> Instr;
type RegRegImm = fn(Reg, Reg, i64) -> Instr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signedness {
    Signed,
    Unsigned,
}

impl Signedness {
    fn of(opcode: Opcode) -> Self {
        match opcode {
            Opcode::UDiv | Opcode::URem | Opcode::UDivChk0 | Opcode::URemChk0 => Self::Unsigned,
            _ => Self::Signed,
        }
    }

    fn div(self) -> RegRegReg {
        match self {
            Self::Signed => instr::sdiv,
            Self::Unsigned => instr::udiv,
        }
    }
}

impl FunctionGenerator<'_, '_> {
    /// Lowers a non-terminator.
    pub(super) fn add_instr(&mut self, instr: &il::Instr) -> Result<()> {
        let invalid = || LoweringErrorKind::InvalidOperands(instr.opcode);
        match (instr.opcode.shape(), instr.operands.as_slice()) {
            (OperandShape::Binary, [lhs, rhs]) => {
                let rd = self.result_reg(instr)?;
                self.add_binary(instr.opcode, instr.ty, rd, lhs, rhs)
            }
            (OperandShape::Unary, [operand]) => {
                let rd = self.result_reg(instr)?;
                self.add_unary(instr.opcode, rd, operand)
            }
            (OperandShape::Alloca, [Value::ConstInt(bytes)]) => {
                let bytes = u32::try_from(*bytes).map_err(|_| invalid())?;
                let rd = self.result_reg(instr)?;
                self.add_alloca(rd, bytes);
                Ok(())
            }
            (OperandShape::Load, [ptr]) if !instr.ty.is_void() => {
                let base = self.value_reg(ptr, Type::Ptr)?;
                let rd = self.result_reg(instr)?;
                self.push(util::load(instr.ty, rd, base, 0));
                Ok(())
            }
            (OperandShape::Store, [ptr, value]) if !instr.ty.is_void() => {
                let base = self.value_reg(ptr, Type::Ptr)?;
                let rt = self.value_reg(value, instr.ty)?;
                self.push(util::store(instr.ty, rt, base, 0));
                Ok(())
            }
            (OperandShape::Call, args) => self.add_call(instr, args),
            _ => Err(invalid()),
        }
    }

    /// The register of the value `instr` defines, or a fresh one if the result is unused.
    fn result_reg(&mut self, instr: &il::Instr) -> Result<Reg> {
        match &instr.result {
            Some(name) => Ok(self.lookup(name)?.0),
            None => Ok(self
                .vregs
                .next_of_class(util::reg_class(instr.ty))),
        }
    }

    /// `ty` is the type of the result, which for integer arithmetic is also the operand type.
    fn add_binary(
        &mut self,
        opcode: Opcode,
        ty: Type,
        rd: Reg,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<()> {
        let float_arith = matches!(
            opcode,
            Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv
        );
        if ty.is_float() && !float_arith {
            return Err(LoweringErrorKind::InvalidOperands(opcode));
        }

        match opcode {
            Opcode::Add | Opcode::Gep => self.add_add_sub(ty, rd, lhs, rhs, false)?,
            Opcode::Sub => self.add_add_sub(ty, rd, lhs, rhs, true)?,
            Opcode::Mul => self.add_int_rrr(instr::mul, ty, rd, lhs, rhs)?,
            Opcode::SDiv | Opcode::UDiv => {
                let signedness = Signedness::of(opcode);
                let (rn, rm) = self.division_operands(signedness, ty, lhs, rhs)?;
                self.push(signedness.div()(rd, rn, rm));
            }
            Opcode::SRem | Opcode::URem => {
                self.add_rem(Signedness::of(opcode), ty, rd, lhs, rhs, false)?
            }
            // Bitwise operations keep `i32` values sign-extended.
            Opcode::And => return self.add_int_rrr(instr::and, ty, rd, lhs, rhs),
            Opcode::Or => return self.add_int_rrr(instr::orr, ty, rd, lhs, rhs),
            Opcode::Xor => return self.add_int_rrr(instr::eor, ty, rd, lhs, rhs),
            Opcode::Shl | Opcode::LShr | Opcode::AShr => {
                self.add_shift(opcode, ty, rd, lhs, rhs)?
            }
            Opcode::FAdd => return self.add_float_rrr(instr::fadd, rd, lhs, rhs),
            Opcode::FSub => return self.add_float_rrr(instr::fsub, rd, lhs, rhs),
            Opcode::FMul => return self.add_float_rrr(instr::fmul, rd, lhs, rhs),
            Opcode::FDiv => return self.add_float_rrr(instr::fdiv, rd, lhs, rhs),
            opcode if opcode.is_compare() => return self.add_compare(opcode, rd, lhs, rhs),
            opcode if opcode.is_checked() => return self.add_checked(opcode, ty, rd, lhs, rhs),
            opcode => return Err(LoweringErrorKind::InvalidOperands(opcode)),
        }
        self.normalize(ty, rd);
        Ok(())
    }

    fn add_int_rrr(
        &mut self,
        op: RegRegReg,
        ty: Type,
        rd: Reg,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<()> {
        let rn = self.value_reg(lhs, ty)?;
        let rm = self.value_reg(rhs, ty)?;
        self.push(op(rd, rn, rm));
        Ok(())
    }

    /// The register of `value`, zero-extended into a fresh register if it is an `i32`.
    fn unsigned_operand(&mut self, value: &Value, ty: Type) -> Result<Reg> {
        let reg = self.value_reg(value, ty)?;
        if ty != Type::I32 {
            return Ok(reg);
        }
        let extended = self.vregs.next_gpr();
        self.push(instr::uxtw(extended, reg));
        Ok(extended)
    }

    fn add_float_rrr(&mut self, op: RegRegReg, rd: Reg, lhs: &Value, rhs: &Value) -> Result<()> {
        let dn = self.value_reg(lhs, Type::F64)?;
        let dm = self.value_reg(rhs, Type::F64)?;
        self.push(op(rd, dn, dm));
        Ok(())
    }

    /// Uses the immediate forms when the constant (or its negation) fits 12 bits.
    fn add_add_sub(
        &mut self,
        ty: Type,
        rd: Reg,
        lhs: &Value,
        rhs: &Value,
        subtract: bool,
    ) -> Result<()> {
        if !subtract && lhs.as_const_int().is_some() && rhs.as_const_int().is_none() {
            return self.add_add_sub(ty, rd, rhs, lhs, false);
        }

        let addend = rhs
            .as_const_int()
            .map(|imm| util::normalize_int(imm, ty))
            .and_then(|imm| if subtract { imm.checked_neg() } else { Some(imm) });
        if let Some(addend) = addend {
            let negated = addend.checked_neg();
            if util::is_arith_imm(addend) {
                let rn = self.value_reg(lhs, ty)?;
                self.push(instr::add_imm(rd, rn, addend));
                return Ok(());
            }
            if let Some(negated) = negated.filter(|imm| util::is_arith_imm(*imm)) {
                let rn = self.value_reg(lhs, ty)?;
                self.push(instr::sub_imm(rd, rn, negated));
                return Ok(());
            }
        }

        let op = if subtract { instr::sub } else { instr::add };
        self.add_int_rrr(op, ty, rd, lhs, rhs)
    }

    /// `lhs - (lhs / rhs) * rhs`. With `check_zero` a zero divisor traps.
    fn add_rem(
        &mut self,
        signedness: Signedness,
        ty: Type,
        rd: Reg,
        lhs: &Value,
        rhs: &Value,
        check_zero: bool,
    ) -> Result<()> {
        let (rn, rm) = self.division_operands(signedness, ty, lhs, rhs)?;
        if check_zero {
            self.add_zero_check(rm);
        }
        let quotient = self.vregs.next_gpr();
        self.push(signedness.div()(quotient, rn, rm));
        self.push(instr::msub(rd, quotient, rm, rn));
        Ok(())
    }

    fn division_operands(
        &mut self,
        signedness: Signedness,
        ty: Type,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<(Reg, Reg)> {
        match signedness {
            Signedness::Signed => Ok((self.value_reg(lhs, ty)?, self.value_reg(rhs, ty)?)),
            Signedness::Unsigned => Ok((
                self.unsigned_operand(lhs, ty)?,
                self.unsigned_operand(rhs, ty)?,
            )),
        }
    }

    /// Shift amounts are taken modulo the width of `ty`.
    fn add_shift(
        &mut self,
        opcode: Opcode,
        ty: Type,
        rd: Reg,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<()> {
        let (op, op_imm): (RegRegReg, RegRegImm) = match opcode {
            Opcode::Shl => (instr::lsl, instr::lsl_imm),
            Opcode::LShr => (instr::lsr, instr::lsr_imm),
            _ => (instr::asr, instr::asr_imm),
        };
        let rn = match opcode {
            Opcode::LShr => self.unsigned_operand(lhs, ty)?,
            _ => self.value_reg(lhs, ty)?,
        };
        let width_mask = if ty == Type::I32 { 31 } else { 63 };
        match rhs.as_const_int() {
            Some(shift) => self.push(op_imm(rd, rn, shift & width_mask)),
            None => {
                let mut rm = self.value_reg(rhs, ty)?;
                // The hardware only masks the amount to 6 bits.
                if ty == Type::I32 {
                    let mask = self.materialize_int(width_mask);
                    let masked = self.vregs.next_gpr();
                    self.push(instr::and(masked, rm, mask));
                    rm = masked;
                }
                self.push(op(rd, rn, rm));
            }
        }
        Ok(())
    }

    fn add_compare(&mut self, opcode: Opcode, rd: Reg, lhs: &Value, rhs: &Value) -> Result<()> {
        let cond =
            util::compare_cond(opcode).ok_or(LoweringErrorKind::InvalidOperands(opcode))?;
        let is_float = matches!(
            opcode,
            Opcode::FCmpEq
                | Opcode::FCmpNe
                | Opcode::FCmpLt
                | Opcode::FCmpLe
                | Opcode::FCmpGt
                | Opcode::FCmpGe
        );

        if is_float {
            let dn = self.value_reg(lhs, Type::F64)?;
            let dm = self.value_reg(rhs, Type::F64)?;
            self.push(instr::fcmp(dn, dm));
        } else {
            // Sign-extended `i32` values order the same way as 64-bit ones, signed or not.
            let ty = self.operand_type(lhs, rhs);
            let rn = self.value_reg(lhs, ty)?;
            match rhs
                .as_const_int()
                .map(|imm| util::normalize_int(imm, ty))
                .filter(|imm| util::is_arith_imm(*imm))
            {
                Some(imm) => self.push(instr::cmp_imm(rn, imm)),
                None => {
                    let rm = self.value_reg(rhs, ty)?;
                    self.push(instr::cmp(rn, rm));
                }
            }
        }
        self.push(instr::cset(rd, cond));
        Ok(())
    }

    /// The type of the first temporary among the operands.
    fn operand_type(&self, lhs: &Value, rhs: &Value) -> Type {
        [lhs, rhs]
            .into_iter()
            .find_map(|value| match value {
                Value::Temp(name) => self.lookup(name).ok().map(|(_, ty)| ty),
                _ => None,
            })
            .unwrap_or(Type::I64)
    }

    /// Arithmetic that traps on a zero divisor or on overflow.
    fn add_checked(
        &mut self,
        opcode: Opcode,
        ty: Type,
        rd: Reg,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<()> {
        match opcode {
            Opcode::SDivChk0 | Opcode::UDivChk0 => {
                let signedness = Signedness::of(opcode);
                let (rn, rm) = self.division_operands(signedness, ty, lhs, rhs)?;
                self.add_zero_check(rm);
                self.push(signedness.div()(rd, rn, rm));
                self.normalize(ty, rd);
            }
            Opcode::SRemChk0 | Opcode::URemChk0 => {
                self.add_rem(Signedness::of(opcode), ty, rd, lhs, rhs, true)?;
                self.normalize(ty, rd);
            }
            Opcode::IAddOvf | Opcode::ISubOvf | Opcode::IMulOvf => {
                let rn = self.value_reg(lhs, ty)?;
                let rm = self.value_reg(rhs, ty)?;
                self.add_overflow_check(opcode, ty, rd, rn, rm);
            }
            opcode => return Err(LoweringErrorKind::InvalidOperands(opcode)),
        }
        Ok(())
    }

    /// Traps if `rm` is zero.
    fn add_zero_check(&mut self, rm: Reg) {
        self.push(instr::cmp_imm(rm, 0));
        self.trap_if(Cond::Eq);
    }

    fn add_overflow_check(&mut self, opcode: Opcode, ty: Type, rd: Reg, rn: Reg, rm: Reg) {
        if ty == Type::I32 {
            // The operands are sign-extended, so the 64-bit result is exact. It fits when sign
            // extending its low half gives it back.
            let op = match opcode {
                Opcode::IAddOvf => instr::add,
                Opcode::ISubOvf => instr::sub,
                _ => instr::mul,
            };
            self.push(op(rd, rn, rm));
            let narrowed = self.vregs.next_gpr();
            self.push(instr::sxtw(narrowed, rd));
            self.push(instr::cmp(narrowed, rd));
            self.trap_if(Cond::Ne);
            return;
        }

        match opcode {
            Opcode::IAddOvf => self.push(instr::adds(rd, rn, rm)),
            Opcode::ISubOvf => self.push(instr::subs(rd, rn, rm)),
            _ => {
                // The product fits when its high half is the sign of its low half.
                let high = self.vregs.next_gpr();
                let sign = self.vregs.next_gpr();
                self.push(instr::mul(rd, rn, rm));
                self.push(instr::smulh(high, rn, rm));
                self.push(instr::asr_imm(sign, rd, 63));
                self.push(instr::cmp(high, sign));
                self.trap_if(Cond::Ne);
                return;
            }
        }
        self.trap_if(Cond::Vs);
    }

    fn add_unary(&mut self, opcode: Opcode, rd: Reg, operand: &Value) -> Result<()> {
        match opcode {
            Opcode::Sitofp => {
                let xn = self.value_reg(operand, Type::I64)?;
                self.push(instr::scvtf(rd, xn));
            }
            Opcode::Uitofp => {
                let ty = self.operand_type(operand, operand);
                let xn = self.unsigned_operand(operand, ty)?;
                self.push(instr::ucvtf(rd, xn));
            }
            Opcode::Fptosi => {
                let dn = self.value_reg(operand, Type::F64)?;
                self.push(instr::fcvtzs(rd, dn));
            }
            Opcode::Fptoui => {
                let dn = self.value_reg(operand, Type::F64)?;
                self.push(instr::fcvtzu(rd, dn));
            }
            // `i1` values are always 0 or 1.
            Opcode::Zext1 => {
                let rn = self.value_reg(operand, Type::I1)?;
                self.push(instr::mov(rd, rn));
            }
            Opcode::Trunc1 => {
                let rn = self.value_reg(operand, Type::I64)?;
                let one = self.materialize_int(1);
                self.push(instr::and(rd, rn, one));
            }
            opcode => return Err(LoweringErrorKind::InvalidOperands(opcode)),
        }
        Ok(())
    }

    /// Reserves a frame slot and computes its address from the frame pointer.
    fn add_alloca(&mut self, rd: Reg, bytes: u32) {
        let distance = -(self.frame.alloc_local(bytes) as i64);
        if util::is_arith_imm(distance) {
            self.push(instr::sub_imm(rd, Reg::FP, distance));
        } else {
            let offset = self.materialize_int(distance);
            self.push(instr::sub(rd, Reg::FP, offset));
        }
    }

    /// Moves the arguments into the argument registers (or the outgoing stack area) right before
    /// the `bl`, and the result out of the return register right after it.
    fn add_call(&mut self, instr: &il::Instr, args: &[Value]) -> Result<()> {
        let callee = instr
            .callee
            .as_ref()
            .ok_or(LoweringErrorKind::InvalidOperands(Opcode::Call))?;
        let Some(signature) = self.root_generator.il.signature(callee.as_str()) else {
            return Err(LoweringErrorKind::UnknownCallee(callee.clone()));
        };
        if signature.params.len() != args.len() {
            return Err(LoweringErrorKind::CallArgCount {
                callee: callee.clone(),
                expected: signature.params.len(),
                found: args.len(),
            });
        }

        let mut locations = ArgLocations::new(self.root_generator.target);
        let mut copies = Vec::with_capacity(args.len());
        for (arg, &ty) in args.iter().zip(&signature.params) {
            let reg = self.value_reg(arg, ty)?;
            copies.push(match locations.next(util::reg_class(ty)) {
                ArgLocation::Reg(arg_reg) => util::copy(arg_reg, reg),
                ArgLocation::Stack(offset) => util::store(ty, reg, Reg::SP, offset),
            });
        }
        for copy in copies {
            self.push(copy);
        }
        self.frame.reserve_outgoing(locations.stack_bytes());

        let [gprs, fprs] = locations.reg_counts();
        self.push(instr::bl(callee.as_str().into(), gprs, fprs));

        if let Some(result) = &instr.result {
            let (rd, ty) = self.lookup(result)?;
            let ret_reg = self.root_generator.target.return_reg(util::reg_class(ty));
            self.push(util::copy(rd, ret_reg));
            self.normalize(ty, rd);
        }
        Ok(())
    }
}
