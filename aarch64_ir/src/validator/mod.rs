
use crate::{BasicBlock, Function, Label, Opcode, Reg};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// If two blocks of a function have the same name.
    #[error("block `{0}` is defined more than once")]
    DuplicateBlock(Label),
    /// If a block doesn't end in a terminator (this includes empty blocks).
    #[error("block `{0}` does not end in a terminator")]
    MissingTerminator(Label),
    /// If a terminator is followed by an instruction that isn't one.
    #[error("block `{0}` has a terminator before its end")]
    TerminatorNotAtEnd(Label),
    /// If a branch targets a block that isn't in the function.
    #[error("block `{block}` branches to unknown block `{target}`")]
    MissingBlock { block: Label, target: Label },
    /// If a fall-through doesn't target the block right after it.
    #[error("block `{block}` falls through to `{target}`, which is not the next block")]
    BadFallThrough { block: Label, target: Label },
    /// If a virtual register is left after register allocation.
    #[error("block `{block}` still uses virtual register {reg}")]
    VirtualRegister { block: Label, reg: Reg },
    /// If a reordering of blocks moved the entry block.
    #[error("entry block changed from `{before}` to `{after}`")]
    EntryMoved { before: Label, after: Label },
    /// If a reordering of blocks added or dropped blocks.
    #[error("the set of blocks changed")]
    BlocksChanged,
}

/// Validates the structure of the given [`Function`]. Returns `Ok(())` if the function is valid,
/// or `Err(_)` with the first detected invalidity.
///
/// Virtual registers are allowed, use [`validate_allocated`] once registers are assigned.
pub fn validate_function(function: &Function) -> Result<(), ValidationError> {
    let mut names = HashSet::new();
    for block in &function.blocks {
        if !names.insert(block.name.clone()) {
            return Err(ValidationError::DuplicateBlock(block.name.clone()));
        }
    }

    for (index, block) in function.blocks.iter().enumerate() {
        validate_terminators(block)?;
        let next = function.blocks.get(index + 1).map(|block| &block.name);
        for instr in &block.instrs {
            let Some(target) = instr.branch_target() else {
                continue;
            };
            if !names.contains(target) {
                return Err(ValidationError::MissingBlock {
                    block: block.name.clone(),
                    target: target.clone(),
                });
            }
            if instr.opcode == Opcode::FallThrough && next != Some(target) {
                return Err(ValidationError::BadFallThrough {
                    block: block.name.clone(),
                    target: target.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_terminators(block: &BasicBlock) -> Result<(), ValidationError> {
    if block.terminator().is_none() {
        return Err(ValidationError::MissingTerminator(block.name.clone()));
    }
    if block.body().iter().any(|instr| instr.is_terminator()) {
        return Err(ValidationError::TerminatorNotAtEnd(block.name.clone()));
    }
    Ok(())
}

/// Like [`validate_function`], but also requires every register to be physical.
pub fn validate_allocated(function: &Function) -> Result<(), ValidationError> {
    validate_function(function)?;
    for block in &function.blocks {
        if let Some(reg) = block
            .instrs
            .iter()
            .flat_map(|instr| instr.regs())
            .find(|reg| reg.is_virtual())
        {
            return Err(ValidationError::VirtualRegister {
                block: block.name.clone(),
                reg,
            });
        }
    }
    Ok(())
}

/// Checks that `after` only orders the blocks of `before` differently: the entry block stays
/// first and no block is added or dropped.
pub fn validate_reordering(before: &Function, after: &Function) -> Result<(), ValidationError> {
    if before.entry().name != after.entry().name {
        return Err(ValidationError::EntryMoved {
            before: before.entry().name.clone(),
            after: after.entry().name.clone(),
        });
    }
    let names = |function: &Function| -> HashSet<Label> {
        function
            .blocks
            .iter()
            .map(|block| block.name.clone())
            .collect()
    };
    if before.blocks.len() != after.blocks.len() || names(before) != names(after) {
        return Err(ValidationError::BlocksChanged);
    }
    Ok(())
}
