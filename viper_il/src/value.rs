use crate::Name;
use std::fmt;

/// An operand of an IL instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A reference to an SSA temporary, `%name`.
    Temp(Name),
    ConstInt(i64),
    ConstFloat(f64),
    ConstBool(bool),
    Null,
    /// A reference to a global symbol, `@name`.
    Global(Name),
}

impl Value {
    pub fn temp(name: impl Into<Name>) -> Self {
        Value::Temp(name.into())
    }

    pub fn as_temp(&self) -> Option<&Name> {
        match self {
            Value::Temp(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the value as an integer if it is an integer-like constant.
    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Value::ConstInt(value) => Some(*value),
            Value::ConstBool(value) => Some(*value as i64),
            Value::Null => Some(0),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Temp(name) => write!(f, "%{name}"),
            Value::ConstInt(value) => write!(f, "{value}"),
            // `{:?}` always keeps a fractional part, so the text reparses as a float.
            Value::ConstFloat(value) => write!(f, "{value:?}"),
            Value::ConstBool(value) => write!(f, "{value}"),
            Value::Null => f.write_str("null"),
            Value::Global(name) => write!(f, "@{name}"),
        }
    }
}
