//! End-to-end tests of the embedding surface: running text and files,
//! marshalling values, and exposing host routines.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use tern::{Error, HeapSettings, RuntimeError, Value, Vm, VmSettings};

fn vm() -> Vm {
    let mut vm = Vm::new(VmSettings::default()).unwrap();
    vm.set_output(Box::new(io::sink()));
    vm
}

#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

fn sum(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let mut total = 0;
    for &arg in args {
        match vm.to_integer(arg) {
            Some(n) => total += n,
            None => {
                let message = format!("sum: not an integer: {}", vm.display(arg));
                vm.fail(message);
            }
        }
    }
    vm.new_integer(total)
}

fn greet(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let name = vm.to_str(args[0]).unwrap_or("nobody").to_string();
    vm.new_string(format!("hello, {name}"))
}

#[test]
fn arithmetic_round_trip() {
    let mut vm = vm();
    let result = vm.run("return 1 + 2 * 3;").unwrap();
    assert_eq!(vm.to_integer(result), Some(7));
}

#[test]
fn assignment_then_print() {
    let out = Captured::default();
    let mut vm = vm();
    vm.set_output(Box::new(out.clone()));
    vm.run("x = 5; x = x + 1; print(x);").unwrap();
    assert_eq!(out.text(), "6\n");
}

#[test]
fn runs_share_the_main_namespace() {
    let mut vm = vm();
    vm.run("counter = 10;").unwrap();
    vm.run("counter += 5;").unwrap();
    let counter = vm.get_global("counter").unwrap();
    assert_eq!(vm.to_integer(counter), Some(15));
}

#[test]
fn host_natives_are_callable() {
    let mut vm = vm();
    let native = vm.new_native("sum", None, sum).unwrap();
    vm.set_global("sum", native).unwrap();
    let greeter = vm.new_native("greet", Some(1), greet).unwrap();
    vm.set_global("greet", greeter).unwrap();

    let result = vm.run("return sum(1, 2, 3, 4);").unwrap();
    assert_eq!(vm.to_integer(result), Some(10));

    let result = vm.run(r#"return greet("tern");"#).unwrap();
    assert_eq!(vm.to_str(result), Some("hello, tern"));

    let err = vm.run("greet();").unwrap_err();
    assert!(matches!(
        err.runtime(),
        Some(RuntimeError::ArgumentCount {
            expected: 1,
            got: 0
        })
    ));
}

#[test]
fn natives_fail_through_the_sink() {
    let mut vm = vm();
    let native = vm.new_native("sum", None, sum).unwrap();
    vm.set_global("sum", native).unwrap();
    let err = vm.run(r#"x = sum(1, "two"); x = 3;"#).unwrap_err();
    match err {
        Error::Runtime {
            error: RuntimeError::Failed(message),
            ..
        } => assert_eq!(message, "sum: not an integer: two"),
        other => panic!("unexpected {other:?}"),
    }
    // the failing run stopped before the second assignment
    assert!(vm.get_global("x").is_none());
    assert!(!vm.has_failed());
}

#[test]
fn values_marshal_from_the_host() {
    let mut vm = vm();
    let items = vec![
        vm.new_integer(2).unwrap(),
        vm.new_float(0.5).unwrap(),
        vm.new_string("s").unwrap(),
    ];
    let array = vm.new_array(items).unwrap();
    vm.set_global("xs", array).unwrap();
    let result = vm.run("xs.push(true); return xs;").unwrap();
    assert_eq!(vm.display(result), r#"[2, 0.5, "s", true]"#);
    assert_eq!(vm.to_array(result).map(<[Value]>::len), Some(4));
}

#[test]
fn call_leaves_the_stack_balanced() {
    let mut vm = vm();
    vm.run("add = function(a, b) { return a + b; };").unwrap();
    let before = vm.stack_depth();
    let result = vm.run("return add(20, 22);").unwrap();
    assert_eq!(vm.to_integer(result), Some(42));
    assert_eq!(vm.stack_depth(), before);

    let err = vm.run("add(1);").unwrap_err();
    assert!(matches!(
        err.runtime(),
        Some(RuntimeError::ArgumentCount {
            expected: 2,
            got: 1
        })
    ));
    assert_eq!(vm.stack_depth(), before);
}

#[test]
fn type_mismatch_does_not_coerce() {
    let mut vm = vm();
    let err = vm.run(r#"return 1 + "a";"#).unwrap_err();
    assert!(matches!(
        err.runtime(),
        Some(RuntimeError::TypeMismatch {
            operation: "ADD",
            ..
        })
    ));
}

#[test]
fn errors_carry_a_location() {
    let mut vm = vm();
    let err = vm.run("a = 1;\nb = a / 0;").unwrap_err();
    match err {
        Error::Runtime {
            error: RuntimeError::DivisionByZero,
            location: Some(location),
        } => assert_eq!(location, "<input>:2:5"),
        other => panic!("unexpected {other:?}"),
    }
    let message = vm.run("a = ;").unwrap_err().to_string();
    assert!(
        message.starts_with("parse error: expected expression, found"),
        "{message}"
    );
}

#[test]
fn compile_errors_are_reported() {
    let mut vm = vm();
    assert!(matches!(vm.run("continue;"), Err(Error::Compile(_))));
}

#[test]
fn settings_are_checked() {
    let settings = VmSettings {
        heap: HeapSettings { arena_size: 12 },
        ..VmSettings::default()
    };
    assert!(matches!(Vm::new(settings), Err(Error::Settings(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let mut vm = vm();
    assert!(matches!(
        vm.run_file("/no/such/script.tn"),
        Err(Error::Io { .. })
    ));
}

#[test]
fn deep_recursion_overflows() {
    let settings = VmSettings {
        max_frames: 64,
        ..VmSettings::default()
    };
    let mut vm = Vm::new(settings).unwrap();
    let err = vm
        .run("function down(n) { return down(n + 1); } down(0);")
        .unwrap_err();
    assert!(matches!(
        err.runtime(),
        Some(RuntimeError::StackOverflow { .. })
    ));
    // the VM is usable again
    let result = vm.run("return 1;").unwrap();
    assert_eq!(vm.to_integer(result), Some(1));
}
