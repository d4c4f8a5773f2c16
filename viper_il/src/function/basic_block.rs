use super::Param;
use crate::{write_comma_separated, Instr, Name};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: Name,
    pub params: Vec<Param>,
    pub instrs: Vec<Instr>,
}

impl BasicBlock {
    pub fn new(label: impl Into<Name>, params: Vec<Param>) -> Self {
        Self {
            label: label.into(),
            params,
            instrs: Vec::new(),
        }
    }

    /// The last instruction of the block, if it is a terminator.
    pub fn terminator(&self) -> Option<&Instr> {
        self.instrs.last().filter(|i| i.is_terminator())
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        if !self.params.is_empty() {
            f.write_str("(")?;
            write_comma_separated(f, &self.params)?;
            f.write_str(")")?;
        }
        f.write_str(":\n")?;
        for instr in &self.instrs {
            writeln!(f, "  {instr}")?;
        }
        Ok(())
    }
}
