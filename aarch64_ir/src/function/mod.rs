
mod frame;

pub use frame::*;

use crate::{Instr, Label, Reg, RegClass, VRegGenerator};
use std::fmt;
use vec1::Vec1;

/// A named sequence of instructions ending in one or more terminators.
///
/// Terminators only appear in a contiguous group at the end of the block, e.g. a `b.cond`
/// followed by a `b` for its false edge.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub name: Label,
    pub instrs: Vec<Instr>,
}

impl BasicBlock {
    pub fn new(name: Label) -> Self {
        Self {
            name,
            instrs: Vec::new(),
        }
    }

    pub fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    /// The last instruction, if it is a terminator.
    pub fn terminator(&self) -> Option<&Instr> {
        self.instrs.last().filter(|instr| instr.is_terminator())
    }

    /// Index of the first instruction of the trailing terminator group.
    pub fn terminator_start(&self) -> usize {
        self.instrs
            .iter()
            .rposition(|instr| !instr.is_terminator())
            .map_or(0, |i| i + 1)
    }

    /// The instructions before the trailing terminator group.
    pub fn body(&self) -> &[Instr] {
        &self.instrs[..self.terminator_start()]
    }

    /// Labels of the blocks control may continue with.
    pub fn successors(&self) -> impl Iterator<Item = &Label> {
        self.instrs[self.terminator_start()..]
            .iter()
            .filter_map(Instr::branch_target)
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for instr in &self.instrs {
            writeln!(f, "  {instr}")?;
        }
        Ok(())
    }
}

/// A machine function. The first block is the entry block.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Label,
    pub blocks: Vec1<BasicBlock>,
    pub frame: FrameInfo,
    pub vregs: VRegGenerator,
}

impl Function {
    pub fn new(name: Label, entry: BasicBlock) -> Self {
        Self {
            name,
            blocks: Vec1::new(entry),
            frame: FrameInfo::new(),
            vregs: VRegGenerator::new(),
        }
    }

    pub fn entry(&self) -> &BasicBlock {
        self.blocks.first()
    }

    pub fn block(&self, name: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|block| block.name == *name)
    }

    pub fn block_index(&self, name: &str) -> Option<usize> {
        self.blocks.iter().position(|block| block.name == *name)
    }

    pub fn has_block(&self, name: &str) -> bool {
        self.block_index(name).is_some()
    }

    /// Indices of the successors of the block at `index`.
    pub fn successor_indices(&self, index: usize) -> Vec<usize> {
        let mut successors: Vec<usize> = self.blocks[index]
            .successors()
            .filter_map(|label| self.block_index(label.as_str()))
            .collect();
        successors.dedup();
        successors
    }

    pub fn instrs(&self) -> impl Iterator<Item = &Instr> {
        self.blocks.iter().flat_map(|block| block.instrs.iter())
    }

    pub fn new_vreg(&mut self, class: RegClass) -> Reg {
        self.vregs.next_of_class(class)
    }

    /// Returns `true` if any operand still names a virtual register.
    pub fn has_virtual_regs(&self) -> bool {
        self.instrs()
            .flat_map(Instr::regs)
            .any(|reg| reg.is_virtual())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}", self.name)?;
        if self.frame != FrameInfo::default() {
            write!(
                f,
                " [locals: {}, spill slots: {}, callee-saved:",
                self.frame.local_bytes, self.frame.spill_slots
            )?;
            for reg in &self.frame.callee_saved {
                write!(f, " {reg}")?;
            }
            f.write_str("]")?;
        }
        writeln!(f)?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        Ok(())
    }
}
