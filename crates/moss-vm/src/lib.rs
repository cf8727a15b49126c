//! Moss VM: executes compiled Moss bytecode.

pub mod frame;
pub mod vm;

pub use frame::Frame;
pub use vm::{Vm, GLOBALS_SIZE, MAX_FRAMES, STACK_SIZE};
