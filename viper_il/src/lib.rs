mod function;
mod module;

pub mod instruction;
pub mod parser;
pub mod ty;
pub mod value;

pub use function::*;
pub use instruction::{BranchTarget, Instr, Opcode};
pub use module::*;
pub use parser::{parse_module, ParseError};
pub use ty::Type;
pub use value::Value;

use std::fmt;

/// The name of a function, block, temporary or extern, stored without its sigil.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(String);

impl Name {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.debug_tuple("Name").field(&self.0).finish()
        } else {
            self.0.fmt(f)
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<T: Into<String>> From<T> for Name {
    fn from(value: T) -> Self {
        Self(value.into())
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Joins the `Display` output of `items` with `", "`.
pub(crate) fn write_comma_separated<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: impl IntoIterator<Item = T>,
) -> fmt::Result {
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
