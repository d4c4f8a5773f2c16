#[cfg(test)]
mod test;

mod generator;

pub use generator::{LoweringError, LoweringErrorKind};

use generator::Generator;

/// Lowers every function of `il` to MIR for `target`. The functions keep their virtual registers.
pub fn build_from_il(
    il: &viper_il::Module,
    target: &aarch64_ir::TargetInfo,
) -> Result<Vec<aarch64_ir::Function>, LoweringError> {
    Generator::new(il, target).generate()
}
