pub mod block_layout;
pub mod peephole;
pub mod register_allocation;
pub mod scheduler;
