//! Helpers shared by the unit tests.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::error::{Error, RuntimeError};
use crate::vm::{Vm, VmSettings};

/// A VM whose `print` output is discarded.
pub(crate) fn vm() -> Vm {
    let mut vm = Vm::new(VmSettings::default()).unwrap();
    vm.set_output(Box::new(io::sink()));
    vm
}

/// Run `source` and render its result.
pub(crate) fn eval(source: &str) -> String {
    let mut vm = vm();
    match vm.run(source) {
        Ok(value) => vm.display(value),
        Err(err) => panic!("{source:?} failed: {err}"),
    }
}

/// Run `source`, which must fail at run time.
pub(crate) fn eval_err(source: &str) -> RuntimeError {
    let mut vm = vm();
    match vm.run(source) {
        Err(Error::Runtime { error, .. }) => error,
        Err(other) => panic!("{source:?} failed before running: {other}"),
        Ok(value) => panic!("{source:?} returned {}", vm.display(value)),
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `source` and return everything it printed.
pub(crate) fn run_capturing(source: &str) -> String {
    let buffer = SharedBuffer::default();
    let mut vm = vm();
    vm.set_output(Box::new(buffer.clone()));
    if let Err(err) = vm.run(source) {
        panic!("{source:?} failed: {err}");
    }
    let bytes = buffer.0.borrow().clone();
    String::from_utf8(bytes).unwrap()
}
