use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::{
    bytecode::ByteCode,
    capability::{Capability, Frame},
    host::HostConfig,
    parse::ParseProto,
    value::Value,
};

/// A deferred unit of behavior captured by the registration entry point,
/// applied later against a capability object.
pub type Registration = Rc<ParseProto>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("global `{0}` is not defined")]
    UnboundGlobal(String),
    #[error("a {0} value is not callable")]
    NotCallable(&'static str),
    #[error("the registration entry point expects a block, got {0}")]
    NotABlock(&'static str),
    #[error("no capability is bound in this context")]
    CapabilityUnbound,
    #[error("global name must be a string constant")]
    BadGlobalName,
}

pub struct ExeState {
    globals: HashMap<String, Value>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    registrations: Vec<Registration>,
    capability: Option<Box<dyn Capability>>,
    capability_method: String,
    func_index: usize,
    nargs: usize,
}

impl ExeState {
    /// Environment a script chunk runs in: `print` plus the registration
    /// entry point. The capability method is deliberately absent here.
    pub fn for_script(config: &HostConfig) -> Self {
        let mut globals = HashMap::new();
        globals.insert("print".into(), Value::Function(lib_print));
        globals.insert(config.entry_point.clone(), Value::Function(lib_register));
        Self::with_globals(globals, config, None)
    }

    /// Environment a registered block is dispatched in: `print` plus the
    /// capability method. The entry point is deliberately absent, so a
    /// frozen registration list cannot grow during dispatch.
    pub fn for_dispatch(config: &HostConfig, capability: Box<dyn Capability>) -> Self {
        let mut globals = HashMap::new();
        globals.insert("print".into(), Value::Function(lib_print));
        globals.insert(
            config.capability_method.clone(),
            Value::Function(lib_do_something),
        );
        Self::with_globals(globals, config, Some(capability))
    }

    fn with_globals(
        globals: HashMap<String, Value>,
        config: &HostConfig,
        capability: Option<Box<dyn Capability>>,
    ) -> Self {
        Self {
            globals,
            stack: Vec::new(),
            frames: Vec::new(),
            registrations: Vec::new(),
            capability,
            capability_method: config.capability_method.clone(),
            func_index: 0,
            nargs: 0,
        }
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn into_registrations(self) -> Vec<Registration> {
        self.registrations
    }

    pub fn execute(&mut self, proto: &ParseProto) -> Result<(), RuntimeError> {
        for code in &proto.byte_codes {
            match *code {
                ByteCode::GetGlobal(dst, name) => {
                    let name = &proto.constants[name as usize];
                    let key = <&str>::try_from(name)?;
                    let v = self
                        .globals
                        .get(key)
                        .cloned()
                        .ok_or_else(|| RuntimeError::UnboundGlobal(key.to_owned()))?;
                    self.set_stack(dst, v);
                }
                ByteCode::LoadConst(dst, c) => {
                    let v = proto.constants[c as usize].clone();
                    self.set_stack(dst, v);
                }
                ByteCode::LoadNil(dst) => self.set_stack(dst, Value::Nil),
                ByteCode::LoadBool(dst, c) => self.set_stack(dst, c.into()),
                ByteCode::LoadInt(dst, c) => self.set_stack(dst, (c as i64).into()),
                ByteCode::Move(dst, src) => self.set_stack(dst, self.stack[src as usize].clone()),
                ByteCode::Closure(dst, p) => {
                    let v = Value::Closure(proto.protos[p as usize].clone());
                    self.set_stack(dst, v);
                }
                ByteCode::Call(func, nargs) => {
                    self.func_index = func as usize;
                    self.nargs = nargs as usize;
                    match self.stack[self.func_index].clone() {
                        Value::Function(f) => {
                            f(self)?;
                        }
                        v => return Err(RuntimeError::NotCallable(v.type_name())),
                    }
                }
            }
        }
        Ok(())
    }

    /// Argument `i` of the currently executing builtin, or nil if the call
    /// site supplied fewer arguments.
    fn arg(&self, i: usize) -> &Value {
        if i < self.nargs {
            self.stack.get(self.func_index + 1 + i).unwrap_or(&Value::Nil)
        } else {
            &Value::Nil
        }
    }

    fn set_stack(&mut self, dst: u8, v: Value) {
        let dst = dst as usize;
        if self.stack.len() <= dst {
            self.stack.resize(dst + 1, Value::Nil);
        }
        self.stack[dst] = v;
    }
}

fn lib_print(state: &mut ExeState) -> Result<i32, RuntimeError> {
    println!("{}", state.arg(0));
    Ok(0)
}

// The registration entry point: append the block argument to the
// accumulating registration list.
fn lib_register(state: &mut ExeState) -> Result<i32, RuntimeError> {
    match state.arg(0) {
        Value::Closure(proto) => {
            let proto = proto.clone();
            state.registrations.push(proto);
            Ok(0)
        }
        v => Err(RuntimeError::NotABlock(v.type_name())),
    }
}

// The capability method: snapshot the active frames, deepest first, and
// hand them to the bound capability object.
fn lib_do_something(state: &mut ExeState) -> Result<i32, RuntimeError> {
    let mut frames = state.frames.clone();
    frames.push(Frame::new(state.capability_method.clone(), "capability stub"));
    frames.reverse();

    let Some(capability) = state.capability.as_mut() else {
        return Err(RuntimeError::CapabilityUnbound);
    };
    capability.do_something(&frames);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    fn run_script(source: &str) -> Result<Vec<Registration>, RuntimeError> {
        let proto = parse::load(source, "test chunk").unwrap();
        let mut state = ExeState::for_script(&HostConfig::default());
        state.execute(&proto)?;
        Ok(state.into_registrations())
    }

    #[test]
    fn empty_script_registers_nothing() {
        assert!(run_script("").unwrap().is_empty());
    }

    #[test]
    fn registrations_keep_insertion_order() {
        let regs = run_script(
            r#"
            test { print "first" }
            print "between"
            test { print "second" }
            "#,
        )
        .unwrap();

        assert_eq!(regs.len(), 2);
        assert!(regs[0].constants.contains(&Value::String("first".into())));
        assert!(regs[1].constants.contains(&Value::String("second".into())));
    }

    #[test]
    fn registered_blocks_are_not_run_during_script_execution() {
        // a block calling an unbound global only fails when dispatched
        let regs = run_script("test { noSuchGlobal() }").unwrap();
        assert_eq!(regs.len(), 1);
    }

    #[test]
    fn entry_point_rejects_non_block_argument() {
        assert!(matches!(
            run_script("test(1)"),
            Err(RuntimeError::NotABlock("integer"))
        ));
    }

    #[test]
    fn capability_method_is_unbound_in_script_phase() {
        assert!(matches!(
            run_script("doSomething()"),
            Err(RuntimeError::UnboundGlobal(name)) if name == "doSomething"
        ));
    }

    #[test]
    fn entry_point_is_unbound_in_dispatch_phase() {
        struct Ignore;
        impl Capability for Ignore {
            fn do_something(&mut self, _frames: &[Frame]) {}
        }

        let proto = parse::load("test { }", "test chunk").unwrap();
        let mut state = ExeState::for_dispatch(&HostConfig::default(), Box::new(Ignore));
        assert!(matches!(
            state.execute(&proto),
            Err(RuntimeError::UnboundGlobal(name)) if name == "test"
        ));
    }

    #[test]
    fn dispatch_passes_frames_deepest_first() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Recorder(Rc<RefCell<Vec<String>>>);
        impl Capability for Recorder {
            fn do_something(&mut self, frames: &[Frame]) {
                self.0
                    .borrow_mut()
                    .extend(frames.iter().map(ToString::to_string));
            }
        }

        let config = HostConfig::default();
        let regs = {
            let proto = parse::load("test { doSomething() }", "test chunk").unwrap();
            let mut state = ExeState::for_script(&config);
            state.execute(&proto).unwrap();
            state.into_registrations()
        };

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut state = ExeState::for_dispatch(&config, Box::new(Recorder(seen.clone())));
        state.push_frame(Frame::new("test n°1", "test chunk"));
        state.execute(&regs[0]).unwrap();

        let seen = seen.borrow();
        assert_eq!(
            *seen,
            vec![
                "at doSomething (capability stub)".to_owned(),
                "at test n°1 (test chunk)".to_owned(),
            ]
        );
    }
}
