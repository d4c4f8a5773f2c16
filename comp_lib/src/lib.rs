pub mod codegen;
pub mod compile;
pub mod control_flow;
pub mod diagnostic;
pub mod pipeline;
