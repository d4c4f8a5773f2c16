mod function;
mod instruction;
mod label;
mod outputter;
mod reg;
mod target;

pub mod dfa;
pub mod passes;
pub mod validator;

pub use function::{BasicBlock, FrameInfo, Function};
pub use instruction::{instr, Cond, Instr, MemEffect, Opcode, OpcodeInfo, Operand};
pub use label::Label;
pub use outputter::*;
pub use reg::{Reg, RegClass, VRegGenerator};
pub use target::{Abi, TargetInfo};
