use std::fmt::Display;

/// One interpreter call frame, kept for the diagnostic dump the capability
/// stub prints when it is invoked.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    callee: String,
    context: String,
}

impl Frame {
    pub fn new(callee: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            callee: callee.into(),
            context: context.into(),
        }
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at {} ({})", self.callee, self.context)
    }
}

/// The narrow interface a registered block is applied against. Frames are
/// passed deepest first.
pub trait Capability {
    fn do_something(&mut self, frames: &[Frame]);
}

/// Debugging stub: only records that the invocation happened, as console text.
pub struct TraceStub;

impl Capability for TraceStub {
    fn do_something(&mut self, frames: &[Frame]) {
        println!("doSomething() was called with the following stacktrace:");
        for frame in frames {
            println!("\t{frame}");
        }
        println!();
    }
}
