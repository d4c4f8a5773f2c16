use super::{BasicBlock, Function, Param};
use crate::{BranchTarget, Instr, Name, Opcode, Type, Value};

/// Builds a [`Function`] block by block.
///
/// Instructions are appended to the block that was started last. The builder doesn't validate
/// the function: a block may be left without a terminator, which lowering will report.
///
/// # Examples
///
/// ```
/// # use viper_il::*;
/// let mut builder = FunctionBuilder::new("add_two", Type::I64);
/// let a = builder.add_param("a", Type::I64);
/// let b = builder.add_param("b", Type::I64);
/// builder.start_block("entry");
/// let r = builder.binary(Opcode::Add, "r", a, b);
/// builder.ret(Some(r));
/// let function = builder.build();
///
/// assert_eq!(function.blocks.len(), 1);
/// assert!(function.blocks[0].terminator().is_some());
/// ```
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<Name>, ret_ty: Type) -> Self {
        Self {
            function: Function {
                name: name.into(),
                params: Vec::new(),
                ret_ty,
                blocks: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &Name {
        &self.function.name
    }

    pub fn ret_ty(&self) -> Type {
        self.function.ret_ty
    }

    pub fn add_param(&mut self, name: impl Into<Name>, ty: Type) -> Value {
        let name = name.into();
        self.function.params.push(Param::new(name.clone(), ty));
        Value::Temp(name)
    }

    pub fn start_block(&mut self, label: impl Into<Name>) {
        self.start_block_with_params(label, Vec::new());
    }

    pub fn start_block_with_params(&mut self, label: impl Into<Name>, params: Vec<Param>) {
        self.function.blocks.push(BasicBlock::new(label, params));
    }

    pub fn has_block(&self) -> bool {
        !self.function.blocks.is_empty()
    }

    /// Appends an instruction to the current block.
    ///
    /// Panics if no block was started.
    pub fn push(&mut self, instr: Instr) {
        self.function
            .blocks
            .last_mut()
            .expect("a block should be started before adding instructions")
            .instrs
            .push(instr);
    }

    /// Adds `result = opcode lhs, rhs`, inferring the result type from the opcode and the first
    /// operand. Integer results default to `i64`.
    pub fn binary(
        &mut self,
        opcode: Opcode,
        result: impl Into<Name>,
        lhs: Value,
        rhs: Value,
    ) -> Value {
        let ty = opcode
            .fixed_result_type()
            .or_else(|| lhs.as_temp().and_then(|t| self.type_of(t)))
            .unwrap_or(Type::I64);
        self.with_result(Instr::new(opcode, ty, vec![lhs, rhs]), result)
    }

    pub fn call(
        &mut self,
        result: Option<Name>,
        ret_ty: Type,
        callee: impl Into<Name>,
        args: Vec<Value>,
    ) -> Option<Value> {
        let instr = Instr::new(Opcode::Call, ret_ty, args).with_callee(callee);
        match result {
            Some(result) => Some(self.with_result(instr, result)),
            None => {
                self.push(instr);
                None
            }
        }
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.push(Instr::new(Opcode::Ret, Type::Void, value.into_iter().collect()));
    }

    pub fn br(&mut self, target: BranchTarget) {
        self.push(Instr::new(Opcode::Br, Type::Void, Vec::new()).with_targets(vec![target]));
    }

    pub fn cbr(&mut self, cond: Value, if_true: BranchTarget, if_false: BranchTarget) {
        self.push(
            Instr::new(Opcode::CBr, Type::Void, vec![cond]).with_targets(vec![if_true, if_false]),
        );
    }

    /// Pushes `instr` with `result` as its result and returns a reference to the result.
    pub fn with_result(&mut self, instr: Instr, result: impl Into<Name>) -> Value {
        let result = result.into();
        self.push(instr.with_result(result.clone()));
        Value::Temp(result)
    }

    /// Looks up the type of a temporary defined so far (parameters, block parameters and
    /// results).
    pub fn type_of(&self, name: &Name) -> Option<Type> {
        let params = self
            .function
            .params
            .iter()
            .chain(self.function.blocks.iter().flat_map(|b| b.params.iter()))
            .find(|p| &p.name == name)
            .map(|p| p.ty);
        params.or_else(|| {
            self.function
                .blocks
                .iter()
                .flat_map(|b| b.instrs.iter())
                .find(|i| i.result.as_ref() == Some(name))
                .map(|i| i.ty)
        })
    }

    pub fn build(self) -> Function {
        self.function
    }
}
