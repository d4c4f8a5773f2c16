use crate::{Extern, Function, Type};
use std::fmt;

/// An IL module: extern declarations followed by function definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub externs: Vec<Extern>,
    pub functions: Vec<Function>,
}

/// The signature of something that can be called from IL.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret_ty: Type,
    pub is_extern: bool,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn add_extern(&mut self, decl: Extern) {
        self.externs.push(decl);
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name.as_str() == name)
    }

    pub fn extern_decl(&self, name: &str) -> Option<&Extern> {
        self.externs.iter().find(|e| e.name.as_str() == name)
    }

    /// Resolves a callee to its signature. Definitions take precedence over externs.
    pub fn signature(&self, name: &str) -> Option<Signature> {
        if let Some(function) = self.function(name) {
            return Some(Signature {
                params: function.param_types().collect(),
                ret_ty: function.ret_ty,
                is_extern: false,
            });
        }
        self.extern_decl(name).map(|decl| Signature {
            params: decl.params.clone(),
            ret_ty: decl.ret_ty,
            is_extern: true,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.externs.is_empty()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for decl in &self.externs {
            write!(f, "{decl}")?;
        }
        for (i, function) in self.functions.iter().enumerate() {
            if i > 0 || !self.externs.is_empty() {
                writeln!(f)?;
            }
            write!(f, "{function}")?;
        }
        Ok(())
    }
}
