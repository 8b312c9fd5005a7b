//! Whole programs, including the scripts under `demos/`.

use std::cell::RefCell;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

use tern::{RuntimeError, Vm, VmSettings};

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

fn demo(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../demos")
        .join(path)
}

/// Run a demo script, returning its rendered result and printed output.
fn run_demo(path: &str) -> (String, String) {
    let out = Captured::default();
    let mut vm = Vm::new(VmSettings::default()).unwrap();
    vm.set_output(Box::new(out.clone()));
    let result = match vm.run_file(demo(path)) {
        Ok(value) => vm.display(value),
        Err(err) => panic!("{path}: {err}"),
    };
    let printed = String::from_utf8(out.0.borrow().clone()).unwrap();
    (result, printed)
}

fn eval(source: &str) -> String {
    let mut vm = Vm::new(VmSettings::default()).unwrap();
    vm.set_output(Box::new(io::sink()));
    match vm.run(source) {
        Ok(value) => vm.display(value),
        Err(err) => panic!("{source:?}: {err}"),
    }
}

#[test]
fn fib_demo() {
    let (result, printed) = run_demo("fib.tn");
    assert_eq!(result, "832040");
    let lines: Vec<&str> = printed.lines().collect();
    assert_eq!(lines.len(), 11);
    assert_eq!(lines[0], "0 0 0");
    assert_eq!(lines[10], "10 55 55");
}

#[test]
fn collections_demo() {
    let (result, printed) = run_demo("collections.tn");
    assert_eq!(result, "[4, 2, 1]");
    assert_eq!(printed, "{\"tern\": 2, \"gull\": 1, \"auk\": 1}\n");
}

#[test]
fn modules_demo() {
    let (result, printed) = run_demo("modules/main.tn");
    assert_eq!(result, "19");
    assert_eq!(printed, "total area: 19\n");
}

#[test]
fn nested_loops_with_break_and_continue() {
    let source = "
        found = [];
        i = 0;
        while (i < 5) {
            i++;
            if (i % 2 == 0) continue;
            j = 0;
            while (true) {
                if (j == i) break;
                j++;
            }
            found.push(j);
        }
        return found;
    ";
    assert_eq!(eval(source), "[1, 3, 5]");
}

#[test]
fn strings_and_methods() {
    assert_eq!(eval(r#"s = "ab" + "cd"; return [s, s.len(), s[2]];"#), r#"["abcd", 4, "c"]"#);
    assert_eq!(eval(r#"return "a" < "b";"#), "true");
}

#[test]
fn functions_are_values() {
    let source = "
        function apply(f, x) { return f(x); }
        inc = function(n) { return n + 1; };
        return apply(inc, apply(inc, 40));
    ";
    assert_eq!(eval(source), "42");
}

#[test]
fn nested_containers_update_in_place() {
    let source = r#"
        d = {list: [1, 2], inner: {n: 1}};
        d.list[0] = 10;
        d.inner.n += 4;
        d["extra"] = d.list.len();
        return d;
    "#;
    assert_eq!(eval(source), r#"{"list": [10, 2], "inner": {"n": 5}, "extra": 2}"#);
}

#[test]
fn increments_on_every_target_form() {
    let source = "
        x = 1; a = [1]; d = {n: 1};
        r = [x++, ++x, a[0]++, ++a[0], d.n++, ++d.n];
        return [r, x, a[0], d.n];
    ";
    assert_eq!(eval(source), "[[1, 3, 1, 3, 1, 3], 3, 3, 3]");
}

#[test]
fn floats_mix_only_through_conversion() {
    assert_eq!(eval("return 1.5 * 2.0;"), "3.0");
    assert_eq!(eval("return float(1) / 4.0;"), "0.25");
    let mut vm = Vm::new(VmSettings::default()).unwrap();
    let err = vm.run("return 1 + 1.0;").unwrap_err();
    assert!(matches!(
        err.runtime(),
        Some(RuntimeError::TypeMismatch { .. })
    ));
}
