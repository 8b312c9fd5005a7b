//! Imports across files written to a scratch directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tern::{Error, RuntimeError, Vm, VmSettings};

struct Scratch(PathBuf);

impl Scratch {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("tern-it-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.0.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

fn vm() -> Vm {
    let mut vm = Vm::new(VmSettings::default()).unwrap();
    vm.set_output(Box::new(io::sink()));
    vm
}

#[test]
fn relative_paths_follow_the_importing_file() {
    let dir = Scratch::new("relative");
    dir.write("lib/util.tn", r#"import "consts.tn"; function area(r) { return r * r * pi; }"#);
    dir.write("lib/consts.tn", "pi = 3;");
    let main = dir.write("main.tn", r#"import "lib/util.tn" as util; return util.area(2);"#);

    let mut vm = vm();
    let result = vm.run_file(&main).unwrap();
    assert_eq!(vm.to_integer(result), Some(12));
}

#[test]
fn merged_names_overwrite_existing_globals() {
    let dir = Scratch::new("merge");
    dir.write("m.tn", "x = 2; y = 3;");
    let main = dir.write("main.tn", r#"x = 1; import "m.tn"; return x * 10 + y;"#);

    let mut vm = vm();
    let result = vm.run_file(&main).unwrap();
    assert_eq!(vm.to_integer(result), Some(23));
}

#[test]
fn imported_functions_see_their_own_globals() {
    let dir = Scratch::new("globals");
    dir.write("m.tn", "secret = 7; function reveal() { return secret; }");
    let main = dir.write(
        "main.tn",
        r#"secret = 1; import "m.tn" as m; return m.reveal();"#,
    );

    let mut vm = vm();
    let result = vm.run_file(&main).unwrap();
    assert_eq!(vm.to_integer(result), Some(7));
}

#[test]
fn text_runs_import_from_the_working_directory_or_absolute_paths() {
    let dir = Scratch::new("absolute");
    let module = dir.write("abs.tn", "value = 5;");
    let mut vm = vm();
    let source = format!("import {:?} as a; return a.value;", module.display().to_string());
    let result = vm.run(&source).unwrap();
    assert_eq!(vm.to_integer(result), Some(5));
    assert!(dir.path().exists());
}

#[test]
fn module_failures_reach_the_importer() {
    let dir = Scratch::new("failure");
    dir.write("broken.tn", r#"assert(false, "broken module");"#);
    let main = dir.write("main.tn", r#"import "broken.tn"; after = 1;"#);

    let mut vm = vm();
    match vm.run_file(&main) {
        Err(Error::Runtime {
            error: RuntimeError::Failed(message),
            location: Some(location),
        }) => {
            assert_eq!(message, "assertion failed: broken module");
            assert!(location.contains("broken.tn:1:"), "{location}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn import_path_must_be_a_string() {
    let mut vm = vm();
    let err = vm.run("import 42;").unwrap_err();
    assert!(matches!(
        err.runtime(),
        Some(RuntimeError::TypeMismatch { .. })
    ));
}

#[test]
fn failed_modules_are_not_cached() {
    let dir = Scratch::new("retry");
    dir.write("lib.tn", "a = 1; b = a + nope; ready = true;");
    let main = dir.write("main.tn", r#"import "lib.tn"; return a;"#);

    let mut vm = vm();
    for _ in 0..2 {
        let err = vm.run_file(&main).unwrap_err();
        assert!(matches!(
            err.runtime(),
            Some(RuntimeError::UndefinedVariable { name }) if name == "nope"
        ));
    }

    // once fixed, the module runs to completion
    dir.write("lib.tn", "a = 1; ready = true;");
    let result = vm.run_file(&main).unwrap();
    assert_eq!(vm.to_integer(result), Some(1));
}
