use super::{
    util::{self, ArgLocation, ArgLocations},
    Generator, LoweringError, LoweringErrorKind,
};
use aarch64_ir::{self as mir, instr, Cond, FrameInfo, Reg, VRegGenerator};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use viper_il::{self as il, BranchTarget, Name, Opcode, Type, Value};

pub(super) type Result<T> = std::result::Result<T, LoweringErrorKind>;

/// The runtime function a `trap` calls. It doesn't return.
const TRAP_HANDLER: &str = "rt_trap";

/// Offset from the frame pointer of the first argument passed on the stack, right above the frame
/// record.
const INCOMING_ARGS_OFFSET: i32 = 16;

pub struct FunctionGenerator<'g, 'i> {
    pub(super) root_generator: &'g Generator<'i>,
    pub(super) il: &'i il::Function,
    /// The virtual register and type of every IL value.
    pub(super) values: HashMap<Name, (Reg, Type)>,
    /// Frame offsets of the parameter slots of every block with parameters.
    param_slots: HashMap<Name, Vec<i32>>,
    pub(super) vregs: VRegGenerator,
    pub(super) frame: FrameInfo,
    /// The instructions of the block being lowered.
    instrs: Vec<mir::Instr>,
    /// The label of the block being lowered.
    label: mir::Label,
    /// The IL block the current one is part of.
    il_block: Name,
    /// Blocks that are done, in order.
    blocks: Vec<mir::BasicBlock>,
    /// Counts the blocks that don't come from an IL block.
    splits: usize,
    /// The block failed run time checks jump to, created on first use.
    trap_label: Option<mir::Label>,
}

impl<'g, 'i> FunctionGenerator<'g, 'i> {
    pub fn new(root_generator: &'g Generator<'i>, il: &'i il::Function) -> Self {
        Self {
            root_generator,
            il,
            values: HashMap::new(),
            param_slots: HashMap::new(),
            vregs: VRegGenerator::new(),
            frame: FrameInfo::new(),
            instrs: Vec::new(),
            label: il.name.as_str().into(),
            il_block: il.name.clone(),
            blocks: Vec::new(),
            splits: 0,
            trap_label: None,
        }
    }

    pub fn generate(mut self) -> std::result::Result<mir::Function, LoweringError> {
        let il = self.il;
        self.check_labels()?;
        self.assign_registers();
        self.assign_param_slots();

        for (index, block) in il.blocks.iter().enumerate() {
            self.lower_block(index, block)?;
        }
        if let Some(label) = self.trap_label.take() {
            let mut trap = mir::BasicBlock::new(label);
            trap.instrs = trap_sequence();
            self.blocks.push(trap);
        }

        // The first block lowered is the IL entry block.
        let mut blocks = std::mem::take(&mut self.blocks).into_iter();
        let Some(first) = blocks.next() else {
            return Err(LoweringError::EmptyFunction {
                function: il.name.clone(),
            });
        };
        let mut function = mir::Function::new(il.name.as_str().into(), first);
        function.blocks.extend(blocks);
        function.frame = self.frame;
        function.vregs = self.vregs;

        debug!(
            function = %il.name,
            blocks = function.blocks.len(),
            vregs = function.vregs.count(),
            "lowered function"
        );
        Ok(function)
    }

    fn error(&self, block: &il::BasicBlock, kind: LoweringErrorKind) -> LoweringError {
        LoweringError::InBlock {
            function: self.il.name.clone(),
            block: block.label.clone(),
            kind,
        }
    }

    fn check_labels(&self) -> std::result::Result<(), LoweringError> {
        let mut labels = HashSet::new();
        for block in &self.il.blocks {
            if !labels.insert(&block.label) {
                return Err(self.error(block, LoweringErrorKind::DuplicateBlock));
            }
        }
        Ok(())
    }

    /// Gives every parameter, block parameter and result a virtual register, in definition order.
    fn assign_registers(&mut self) {
        let il = self.il;
        let params = il
            .params
            .iter()
            .chain(il.blocks.iter().flat_map(|block| block.params.iter()))
            .map(|param| (&param.name, param.ty));
        let results = il.blocks.iter().flat_map(|block| {
            block
                .instrs
                .iter()
                .filter_map(|instr| Some((instr.result.as_ref()?, self.result_type(instr))))
        });
        let definitions: Vec<_> = params.chain(results).collect();

        let mut values = HashMap::new();
        for (name, ty) in definitions {
            let reg = self.vregs.next_of_class(util::reg_class(ty));
            values.insert(name.clone(), (reg, ty));
        }
        self.values = values;
    }

    /// The type of the value `instr` defines. Calls take it from the callee when it is known.
    fn result_type(&self, instr: &il::Instr) -> Type {
        let declared = match instr.opcode {
            Opcode::Call => instr
                .callee
                .as_ref()
                .and_then(|callee| self.root_generator.il.signature(callee.as_str()))
                .map(|sig| sig.ret_ty)
                .filter(|ty| !ty.is_void())
                .unwrap_or(instr.ty),
            _ => instr.ty,
        };
        match declared {
            Type::Void => Type::I64,
            ty => ty,
        }
    }

    /// Block parameters are passed in memory: every edge stores its arguments into the slots of
    /// the target, which loads them on entry.
    fn assign_param_slots(&mut self) {
        let il = self.il;
        for block in il.blocks.iter().skip(1) {
            if block.params.is_empty() {
                continue;
            }
            let slots = block
                .params
                .iter()
                .map(|_| self.frame.alloc_local(8))
                .collect();
            self.param_slots.insert(block.label.clone(), slots);
        }
    }

    fn lower_block(
        &mut self,
        index: usize,
        block: &il::BasicBlock,
    ) -> std::result::Result<(), LoweringError> {
        self.instrs.clear();
        self.label = block.label.as_str().into();
        self.il_block = block.label.clone();
        self.add_block(index, block)
            .map_err(|kind| self.error(block, kind))?;
        self.finish_block();
        Ok(())
    }

    fn finish_block(&mut self) {
        let mut finished = mir::BasicBlock::new(self.label.clone());
        finished.instrs = std::mem::take(&mut self.instrs);
        self.blocks.push(finished);
    }

    /// A label for a block that doesn't come from the IL. IL labels never start with a digit, so
    /// these can't clash with them.
    fn split_label(&mut self, name: &str) -> mir::Label {
        self.splits += 1;
        format!("{}.{name}", self.splits).as_str().into()
    }

    /// Ends the current block with `b.cond target` and continues in a new block on the other
    /// edge.
    pub(super) fn branch_off(&mut self, cond: Cond, target: mir::Label) {
        let il_block = self.il_block.clone();
        let next = self.split_label(il_block.as_str());
        self.push(instr::b_cond(cond, target));
        self.push(instr::b(next.clone()));
        self.finish_block();
        self.label = next;
    }

    /// Branches to the trap block when `cond` holds for the current flags.
    pub(super) fn trap_if(&mut self, cond: Cond) {
        let trap = match self.trap_label.clone() {
            Some(label) => label,
            None => {
                let label = self.split_label("trap");
                self.trap_label = Some(label.clone());
                label
            }
        };
        self.branch_off(cond, trap);
    }

    fn add_block(&mut self, index: usize, block: &il::BasicBlock) -> Result<()> {
        let Some((terminator, body)) = block
            .instrs
            .split_last()
            .filter(|(last, _)| last.is_terminator())
        else {
            return Err(LoweringErrorKind::MissingTerminator);
        };
        if let Some(instr) = body.iter().find(|instr| instr.is_terminator()) {
            return Err(LoweringErrorKind::TerminatorNotAtEnd(instr.opcode));
        }

        if index == 0 {
            if !block.params.is_empty() {
                return Err(LoweringErrorKind::EntryParams);
            }
            self.add_entry_sequence()?;
        } else {
            self.add_param_loads(block)?;
        }

        for instr in body {
            self.add_instr(instr)?;
        }
        self.add_terminator(terminator)
    }

    /// Copies the arguments out of the argument registers, or loads them from the caller's
    /// frame.
    fn add_entry_sequence(&mut self) -> Result<()> {
        let il = self.il;
        let mut locations = ArgLocations::new(self.root_generator.target);
        for param in &il.params {
            let (reg, ty) = self.lookup(&param.name)?;
            match locations.next(util::reg_class(ty)) {
                ArgLocation::Reg(arg) => {
                    self.push(util::copy(reg, arg));
                    self.normalize(ty, reg);
                }
                ArgLocation::Stack(offset) => {
                    self.push(util::load(ty, reg, Reg::FP, INCOMING_ARGS_OFFSET + offset));
                }
            }
        }
        Ok(())
    }

    fn add_param_loads(&mut self, block: &il::BasicBlock) -> Result<()> {
        let slots = self.param_slots.get(&block.label).cloned().unwrap_or_default();
        for (param, offset) in block.params.iter().zip(slots) {
            let (reg, ty) = self.lookup(&param.name)?;
            self.push(util::load(ty, reg, Reg::FP, offset));
        }
        Ok(())
    }

    /// Sign-extends an `i32` that was just written to `reg`. Every `i32` in a register is kept
    /// sign-extended to 64 bits.
    pub(super) fn normalize(&mut self, ty: Type, reg: Reg) {
        if ty == Type::I32 {
            self.push(instr::sxtw(reg, reg));
        }
    }

    fn add_terminator(&mut self, instr: &il::Instr) -> Result<()> {
        match (instr.opcode, instr.targets.as_slice()) {
            (Opcode::Ret, _) => self.add_ret(instr),
            (Opcode::Br, [target]) => {
                self.add_edge_args(target)?;
                self.push(instr::b(target.label.as_str().into()));
                Ok(())
            }
            (Opcode::CBr, [if_true, if_false]) => {
                let [cond] = instr.operands.as_slice() else {
                    return Err(LoweringErrorKind::InvalidOperands(Opcode::CBr));
                };
                let same_target = if_true.label == if_false.label;
                if same_target && if_true.args != if_false.args {
                    return Err(LoweringErrorKind::ConflictingBranchArgs(
                        if_true.label.clone(),
                    ));
                }

                let cond = self.value_reg(cond, Type::I1)?;
                self.add_edge_args(if_true)?;
                if !same_target {
                    self.add_edge_args(if_false)?;
                }
                self.push(instr::cmp_imm(cond, 0));
                self.push(instr::b_cond(Cond::Ne, if_true.label.as_str().into()));
                self.push(instr::b(if_false.label.as_str().into()));
                Ok(())
            }
            (Opcode::SwitchI32, [default, cases @ ..]) => self.add_switch(instr, default, cases),
            (Opcode::Trap, _) => {
                for instr in trap_sequence() {
                    self.push(instr);
                }
                Ok(())
            }
            (opcode, _) => Err(LoweringErrorKind::InvalidOperands(opcode)),
        }
    }

    /// Compares the scrutinee with one case at a time, in order, and takes the first match. Every
    /// comparison after the first starts a new block.
    fn add_switch(
        &mut self,
        instr: &il::Instr,
        default: &BranchTarget,
        cases: &[BranchTarget],
    ) -> Result<()> {
        let invalid = || LoweringErrorKind::InvalidOperands(Opcode::SwitchI32);
        let [scrutinee, values @ ..] = instr.operands.as_slice() else {
            return Err(invalid());
        };
        if values.len() != cases.len() {
            return Err(invalid());
        }

        let scrutinee = self.value_reg(scrutinee, Type::I32)?;
        for (value, target) in values.iter().zip(cases) {
            let value = value
                .as_const_int()
                .map(|value| util::normalize_int(value, Type::I32))
                .ok_or_else(invalid)?;
            self.add_edge_args(target)?;
            self.add_compare_imm(scrutinee, value);
            self.branch_off(Cond::Eq, target.label.as_str().into());
        }
        self.add_edge_args(default)?;
        self.push(instr::b(default.label.as_str().into()));
        Ok(())
    }

    /// Stores the arguments of an edge into the parameter slots of its target.
    fn add_edge_args(&mut self, target: &BranchTarget) -> Result<()> {
        let il = self.il;
        let Some(block) = il.block(target.label.as_str()) else {
            return Err(LoweringErrorKind::UnknownBlock(target.label.clone()));
        };
        if block.params.len() != target.args.len() {
            return Err(LoweringErrorKind::BranchArgCount {
                target: target.label.clone(),
                expected: block.params.len(),
                found: target.args.len(),
            });
        }

        let slots = self.param_slots.get(&target.label).cloned().unwrap_or_default();
        for ((arg, param), offset) in target.args.iter().zip(&block.params).zip(slots) {
            let reg = self.value_reg(arg, param.ty)?;
            self.push(util::store(param.ty, reg, Reg::FP, offset));
        }
        Ok(())
    }

    fn add_ret(&mut self, instr: &il::Instr) -> Result<()> {
        match instr.operands.as_slice() {
            [] => self.push(instr::ret(None)),
            [value] => {
                let ty = match self.il.ret_ty {
                    Type::Void => self.type_of(value),
                    ty => ty,
                };
                let reg = self.value_reg(value, ty)?;
                let ret_reg = self.root_generator.target.return_reg(util::reg_class(ty));
                self.push(util::copy(ret_reg, reg));
                self.push(instr::ret(Some(ret_reg)));
            }
            _ => return Err(LoweringErrorKind::InvalidOperands(Opcode::Ret)),
        }
        Ok(())
    }

    pub(super) fn push(&mut self, instr: mir::Instr) {
        self.instrs.push(instr);
    }

    pub(super) fn lookup(&self, name: &Name) -> Result<(Reg, Type)> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| LoweringErrorKind::UndefinedValue(name.clone()))
    }

    fn type_of(&self, value: &Value) -> Type {
        match value {
            Value::Temp(name) => self.values.get(name).map_or(Type::I64, |(_, ty)| *ty),
            Value::ConstFloat(_) => Type::F64,
            Value::ConstBool(_) => Type::I1,
            Value::Null | Value::Global(_) => Type::Ptr,
            Value::ConstInt(_) => Type::I64,
        }
    }

    /// The register holding `value`, used as a value of type `ty`. Constants are materialized
    /// into a fresh register.
    pub(super) fn value_reg(&mut self, value: &Value, ty: Type) -> Result<Reg> {
        match value {
            Value::Temp(name) => {
                let (reg, actual) = self.lookup(name)?;
                if util::reg_class(actual) != util::reg_class(ty) {
                    return Err(LoweringErrorKind::TypeMismatch {
                        name: name.clone(),
                        actual,
                        expected: ty,
                    });
                }
                Ok(reg)
            }
            Value::Global(name) => Err(LoweringErrorKind::GlobalValue(name.clone())),
            Value::ConstFloat(value) if ty.is_float() => Ok(self.materialize_float(*value)),
            _ => match value.as_const_int() {
                Some(imm) if ty.is_float() => Ok(self.materialize_float(imm as f64)),
                Some(imm) => Ok(self.materialize_int(util::normalize_int(imm, ty))),
                None => Err(LoweringErrorKind::InvalidConstant(value.to_string(), ty)),
            },
        }
    }

    pub(super) fn materialize_int(&mut self, imm: i64) -> Reg {
        let reg = self.vregs.next_gpr();
        for instr in instr::materialize_imm(reg, imm) {
            self.push(instr);
        }
        reg
    }

    /// `cmp rn, #imm`, going through a register when the immediate can't be encoded.
    pub(super) fn add_compare_imm(&mut self, rn: Reg, imm: i64) {
        if util::is_arith_imm(imm) {
            self.push(instr::cmp_imm(rn, imm));
        } else {
            let rm = self.materialize_int(imm);
            self.push(instr::cmp(rn, rm));
        }
    }

    /// Builds the bit pattern of `value` in a general-purpose register and moves it over.
    fn materialize_float(&mut self, value: f64) -> Reg {
        let bits = self.materialize_int(value.to_bits() as i64);
        let reg = self.vregs.next_fpr();
        self.push(instr::fmov_from_gpr(reg, bits));
        reg
    }
}

fn trap_sequence() -> Vec<mir::Instr> {
    vec![instr::bl(TRAP_HANDLER.into(), 0, 0), instr::ret(None)]
}
