//! Call frames.

use std::rc::Rc;

use moss_object::CompiledFunction;

/// An activation record: the function being executed and its
/// instruction pointer. `ip` starts at −1; the run loop pre-increments
/// it before every fetch.
#[derive(Debug, Clone)]
pub struct Frame {
    pub func: Rc<CompiledFunction>,
    pub ip: i64,
}

impl Frame {
    pub fn new(func: Rc<CompiledFunction>) -> Self {
        Self { func, ip: -1 }
    }

    pub fn instructions(&self) -> &[u8] {
        &self.func.instructions
    }
}
