mod function_generator;
mod instr_generator;
mod util;

use aarch64_ir as mir;
use function_generator::FunctionGenerator;
use viper_il::{Name, Opcode, Type};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoweringError {
    #[error("`@{function}` has no blocks")]
    EmptyFunction { function: Name },
    #[error("{kind} (in block `{block}` of `@{function}`)")]
    InBlock {
        function: Name,
        block: Name,
        kind: LoweringErrorKind,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoweringErrorKind {
    #[error("block is defined more than once")]
    DuplicateBlock,
    #[error("block doesn't end in a terminator")]
    MissingTerminator,
    #[error("`{0}` must be the last instruction of its block")]
    TerminatorNotAtEnd(Opcode),
    #[error("the entry block can't have parameters")]
    EntryParams,
    #[error("branch to unknown block `{0}`")]
    UnknownBlock(Name),
    #[error("`{target}` takes {expected} arguments, but {found} were passed")]
    BranchArgCount {
        target: Name,
        expected: usize,
        found: usize,
    },
    #[error("both edges of `cbr` go to `{0}` with different arguments")]
    ConflictingBranchArgs(Name),
    #[error("call to unknown function `@{0}`")]
    UnknownCallee(Name),
    #[error("`@{callee}` takes {expected} arguments, but {found} were passed")]
    CallArgCount {
        callee: Name,
        expected: usize,
        found: usize,
    },
    #[error("use of undefined value `%{0}`")]
    UndefinedValue(Name),
    #[error("`%{name}` has type {actual}, but is used as {expected}")]
    TypeMismatch {
        name: Name,
        actual: Type,
        expected: Type,
    },
    #[error("the address of `@{0}` can't be used as a value")]
    GlobalValue(Name),
    #[error("`{0}` can't be used as a {1} value")]
    InvalidConstant(String, Type),
    #[error("invalid operands for `{0}`")]
    InvalidOperands(Opcode),
}

/// Lowers the functions of an IL module to MIR, in the order they are defined.
///
/// The result still uses virtual registers for every IL value. Argument and return registers
/// appear only around calls, at function entry and at returns.
pub struct Generator<'i> {
    il: &'i viper_il::Module,
    target: &'i mir::TargetInfo,
}

impl<'i> Generator<'i> {
    pub fn new(il: &'i viper_il::Module, target: &'i mir::TargetInfo) -> Self {
        Self { il, target }
    }

    pub fn generate(self) -> Result<Vec<mir::Function>, LoweringError> {
        self.il
            .functions
            .iter()
            .map(|function| FunctionGenerator::new(&self, function).generate())
            .collect()
    }
}
