//! The backend pipeline: an ordered list of [`Pass`]es run over a shared [`Module`].
//!
//! Every pass reports failure by returning `false` after describing the problem through the
//! [`Diagnostics`] sink. The [`PassManager`] stops at the first failing pass, the state of the
//! module after that is only useful for debugging.

#[cfg(test)]
mod test;

mod passes;

pub use passes::*;

use crate::diagnostic::Code;
use aarch64_ir::TargetInfo;
use tracing::debug;

/// The state the passes work on.
#[derive(Debug)]
pub struct Module<'a> {
    pub il: &'a viper_il::Module,
    pub target: &'a TargetInfo,
    /// Filled by [`LoweringPass`], in the order the IL defines the functions.
    pub mir: Vec<aarch64_ir::Function>,
    /// Filled by [`EmitPass`].
    pub assembly: String,
}

impl<'a> Module<'a> {
    pub fn new(il: &'a viper_il::Module, target: &'a TargetInfo) -> Self {
        Self {
            il,
            target,
            mir: Vec::new(),
            assembly: String::new(),
        }
    }
}

/// Write-only sink for the errors of failing passes.
pub trait Diagnostics {
    fn error(&mut self, message: String);
}

impl Diagnostics for Vec<String> {
    fn error(&mut self, message: String) {
        self.push(message);
    }
}

pub trait Pass {
    fn name(&self) -> &'static str;

    /// The code of the diagnostics this pass reports.
    fn error_code(&self) -> Code {
        Code::Unspecified
    }

    /// Returns `false` if the pass failed. The reason has been reported to `diagnostics` by then.
    fn run(&mut self, module: &mut Module<'_>, diagnostics: &mut dyn Diagnostics) -> bool;
}

#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    failed: Option<usize>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pipeline from IL to assembly, with every pass enabled.
    pub fn standard() -> Self {
        let mut manager = Self::new();
        manager.add_pass(LoweringPass);
        manager.add_pass(RegAllocPass);
        manager.add_pass(SchedulerPass);
        manager.add_pass(BlockLayoutPass);
        manager.add_pass(PeepholePass);
        manager.add_pass(EmitPass);
        manager
    }

    pub fn add_pass<P: Pass + 'static>(&mut self, pass: P) {
        self.add_boxed(Box::new(pass));
    }

    pub fn add_boxed(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Runs the passes in the order they were added, stopping at the first one that fails.
    pub fn run(&mut self, module: &mut Module<'_>, diagnostics: &mut dyn Diagnostics) -> bool {
        self.failed = None;
        for (index, pass) in self.passes.iter_mut().enumerate() {
            debug!(pass = pass.name(), functions = module.mir.len(), "running pass");
            if !pass.run(module, diagnostics) {
                debug!(pass = pass.name(), "pass failed");
                self.failed = Some(index);
                return false;
            }
        }
        true
    }

    /// The pass that made the last [`run`](PassManager::run) fail.
    pub fn failed_pass(&self) -> Option<&dyn Pass> {
        self.failed.map(|index| self.passes[index].as_ref())
    }
}
