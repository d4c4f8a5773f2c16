
use crate::diagnostic::{Diagnostic, DiagnosticBuilder};
use std::collections::HashSet;
use viper_il::{Function, Module};

/// Warns about every block no path from the entry block reaches.
///
/// The blocks are left in place. They are still lowered and emitted, so a broken unreachable
/// block is an error like any other.
pub fn find_unreachable_blocks(module: &Module) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for function in &module.functions {
        let reached = reachable_blocks(function);
        for block in &function.blocks {
            if !reached.contains(block.label.as_str()) {
                diagnostics.push(DiagnosticBuilder::unspanned().build_unreachable_block(
                    function.name.as_str(),
                    block.label.as_str(),
                ));
            }
        }
    }
    diagnostics
}

fn reachable_blocks(function: &Function) -> HashSet<&str> {
    let mut reached = HashSet::new();
    let Some(entry) = function.entry() else {
        return reached;
    };

    let mut worklist = vec![entry];
    reached.insert(entry.label.as_str());
    while let Some(block) = worklist.pop() {
        let targets = block.instrs.iter().flat_map(|instr| &instr.targets);
        for target in targets {
            let Some(next) = function.block(target.label.as_str()) else {
                continue;
            };
            if reached.insert(next.label.as_str()) {
                worklist.push(next);
            }
        }
    }
    reached
}
