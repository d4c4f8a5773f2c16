use super::{Diagnostics, Module, Pass};
use crate::{codegen::aarch64::build_from_il, diagnostic::Code};
use aarch64_ir::{
    passes,
    validator::{self, ValidationError},
    AsmOutputter, Function,
};
use tracing::debug;

/// IL to MIR with virtual registers.
pub struct LoweringPass;

impl Pass for LoweringPass {
    fn name(&self) -> &'static str {
        "lowering"
    }

    fn error_code(&self) -> Code {
        Code::MalformedIl
    }

    fn run(&mut self, module: &mut Module<'_>, diagnostics: &mut dyn Diagnostics) -> bool {
        match build_from_il(module.il, module.target) {
            Ok(mir) => {
                module.mir = mir;
                true
            }
            Err(error) => {
                diagnostics.error(error.to_string());
                false
            }
        }
    }
}

pub struct RegAllocPass;

impl Pass for RegAllocPass {
    fn name(&self) -> &'static str {
        "register allocation"
    }

    fn error_code(&self) -> Code {
        Code::RegAllocFailure
    }

    fn run(&mut self, module: &mut Module<'_>, diagnostics: &mut dyn Diagnostics) -> bool {
        for function in &mut module.mir {
            if let Err(error) = passes::register_allocation::run(function, module.target) {
                diagnostics.error(error.to_string());
                return false;
            }
        }
        true
    }
}

pub struct SchedulerPass;

impl Pass for SchedulerPass {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    fn run(&mut self, module: &mut Module<'_>, _diagnostics: &mut dyn Diagnostics) -> bool {
        module.mir.iter_mut().for_each(passes::scheduler::run);
        true
    }
}

pub struct BlockLayoutPass;

impl Pass for BlockLayoutPass {
    fn name(&self) -> &'static str {
        "block layout"
    }

    /// A function whose layout moved the entry block or lost a block keeps its old order.
    fn run(&mut self, module: &mut Module<'_>, _diagnostics: &mut dyn Diagnostics) -> bool {
        for function in &mut module.mir {
            let before = function.clone();
            passes::block_layout::run(function);
            if let Err(error) = validator::validate_reordering(&before, function) {
                debug!(function = %function.name, %error, "discarding block layout");
                *function = before;
            }
        }
        true
    }
}

pub struct PeepholePass;

impl Pass for PeepholePass {
    fn name(&self) -> &'static str {
        "peephole"
    }

    fn run(&mut self, module: &mut Module<'_>, _diagnostics: &mut dyn Diagnostics) -> bool {
        module.mir.iter_mut().for_each(passes::peephole::run);
        true
    }
}

/// Writes the assembly of all functions to [`Module::assembly`].
pub struct EmitPass;

impl Pass for EmitPass {
    fn name(&self) -> &'static str {
        "emit"
    }

    fn error_code(&self) -> Code {
        Code::EmissionGap
    }

    fn run(&mut self, module: &mut Module<'_>, diagnostics: &mut dyn Diagnostics) -> bool {
        let mut assembly = String::new();
        let result =
            AsmOutputter::new(&mut assembly, module.target.clone()).write_module(&module.mir);
        match result {
            Ok(()) => {
                module.assembly = assembly;
                true
            }
            Err(error) => {
                diagnostics.error(error.to_string());
                false
            }
        }
    }
}

/// How far along the pipeline the MIR being verified is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirStage {
    /// Virtual registers are still allowed.
    Lowered,
    Allocated,
}

/// Checks the structural invariants of the MIR, failing on the first violation.
pub struct VerifyPass {
    after: &'static str,
    stage: MirStage,
}

impl VerifyPass {
    /// `after` names the pass whose output is verified.
    pub fn new(after: &'static str, stage: MirStage) -> Self {
        Self { after, stage }
    }
}

impl Pass for VerifyPass {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn error_code(&self) -> Code {
        Code::InvalidMir
    }

    fn run(&mut self, module: &mut Module<'_>, diagnostics: &mut dyn Diagnostics) -> bool {
        let validate: fn(&Function) -> Result<(), ValidationError> = match self.stage {
            MirStage::Lowered => validator::validate_function,
            MirStage::Allocated => validator::validate_allocated,
        };
        let mut valid = true;
        for function in &module.mir {
            if let Err(error) = validate(function) {
                diagnostics.error(format!(
                    "invalid MIR in `{}` after {}: {error}",
                    function.name, self.after
                ));
                valid = false;
            }
        }
        valid
    }
}
