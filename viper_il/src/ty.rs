use std::{fmt, str::FromStr};

/// The scalar types of the IL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    I1,
    I32,
    I64,
    F64,
    Ptr,
}

impl Type {
    pub fn is_void(self) -> bool {
        self == Type::Void
    }

    pub fn is_float(self) -> bool {
        self == Type::F64
    }

    /// Size of a value of this type in memory, in bytes.
    pub fn byte_size(self) -> u32 {
        match self {
            Type::Void => 0,
            Type::I1 => 1,
            Type::I32 => 4,
            Type::I64 | Type::F64 | Type::Ptr => 8,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Void => "void",
            Type::I1 => "i1",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F64 => "f64",
            Type::Ptr => "ptr",
        };
        f.write_str(name)
    }
}

impl FromStr for Type {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "void" => Ok(Type::Void),
            "i1" => Ok(Type::I1),
            "i32" => Ok(Type::I32),
            "i64" => Ok(Type::I64),
            "f64" => Ok(Type::F64),
            "ptr" => Ok(Type::Ptr),
            _ => Err(()),
        }
    }
}
