mod basic_block;
mod builder;

pub use basic_block::*;
pub use builder::*;

use crate::{write_comma_separated, Name, Type};
use std::fmt;

/// A typed, named parameter of a function or block.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Name,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<Name>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}:{}", self.name, self.ty)
    }
}

/// A function definition. The first block is the entry block.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Name,
    pub params: Vec<Param>,
    pub ret_ty: Type,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn entry(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    pub fn block(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label.as_str() == label)
    }

    pub fn param_types(&self) -> impl Iterator<Item = Type> + '_ {
        self.params.iter().map(|p| p.ty)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func @{}(", self.name)?;
        write_comma_separated(f, &self.params)?;
        writeln!(f, ") -> {} {{", self.ret_ty)?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        f.write_str("}\n")
    }
}

/// A declaration of a function defined outside the module.
#[derive(Debug, Clone, PartialEq)]
pub struct Extern {
    pub name: Name,
    pub params: Vec<Type>,
    pub ret_ty: Type,
}

impl fmt::Display for Extern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "extern @{}(", self.name)?;
        write_comma_separated(f, &self.params)?;
        writeln!(f, ") -> {}", self.ret_ty)
    }
}
