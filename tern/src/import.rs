//! Loading other segments at run time.
//!
//! Text imports compile the file into a new segment and run it to
//! completion on a nested interpreter loop; the segment's globals become
//! the namespace. Native imports load a shared library and call its
//! `setup` entry point, which returns the namespace itself.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;

use crate::compiler::compile;
use crate::error::RuntimeError;
use crate::object::Body;
use crate::value::Value;
use crate::vm::Vm;

/// Entry point every native extension exports under the name `setup`.
///
/// It returns the module namespace, or reports through [`Vm::fail`] and
/// returns [`Value::NULL_REF`].
pub type SetupFn = unsafe extern "C" fn(*mut Vm) -> Value;

const NATIVE_EXTENSIONS: [&str; 3] = ["so", "dylib", "dll"];

fn is_native(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| NATIVE_EXTENSIONS.contains(&ext))
}

impl Vm {
    /// Resolve and load `path` on behalf of segment `importer`, returning
    /// the imported namespace.
    pub(crate) fn import(
        &mut self,
        path: &str,
        importer: usize,
    ) -> Result<Value, RuntimeError> {
        let resolved = self.resolve(path, importer)?;
        if is_native(&resolved) {
            self.import_native(path, &resolved)
        } else {
            self.import_text(path, resolved)
        }
    }

    fn resolve(&self, path: &str, importer: usize) -> Result<PathBuf, RuntimeError> {
        let requested = Path::new(path);
        let joined = match self.segments.get(importer).and_then(|s| s.directory()) {
            Some(dir) if requested.is_relative() => dir.join(requested),
            _ => requested.to_path_buf(),
        };
        joined.canonicalize().map_err(|err| RuntimeError::Import {
            path: path.to_string(),
            reason: err.to_string(),
        })
    }

    fn import_text(
        &mut self,
        path: &str,
        resolved: PathBuf,
    ) -> Result<Value, RuntimeError> {
        if let Some(&segment) = self.segment_paths.get(&resolved) {
            debug!("import {}: cached segment {segment}", resolved.display());
            return Ok(self.segments[segment].globals);
        }
        let import_error = |reason: String| RuntimeError::Import {
            path: path.to_string(),
            reason,
        };
        let source = std::fs::read_to_string(&resolved)
            .map_err(|err| import_error(err.to_string()))?;
        let program =
            parser::parse(&source).map_err(|err| import_error(err.to_string()))?;
        let image = compile(&program).map_err(|err| import_error(err.to_string()))?;

        debug!("import {}", resolved.display());
        let segment =
            self.register_segment(image, Some(resolved), Rc::from(source), None)?;
        self.enter_segment(segment);
        if let Err(err) = self.execute() {
            self.forget_path(segment);
            return Err(err);
        }
        Ok(self.segments[segment].globals)
    }

    fn import_native(
        &mut self,
        path: &str,
        resolved: &Path,
    ) -> Result<Value, RuntimeError> {
        let import_error = |reason: String| RuntimeError::Import {
            path: path.to_string(),
            reason,
        };
        debug!("import native {}", resolved.display());
        // SAFETY: loading runs the library's initializers; native imports
        // are trusted the same way the host binary is.
        let library = unsafe { libloading::Library::new(resolved) }
            .map_err(|err| import_error(err.to_string()))?;
        // SAFETY: `setup` is declared with the `SetupFn` signature by
        // contract with extension authors.
        let setup: SetupFn = unsafe { library.get::<SetupFn>(b"setup\0") }
            .map(|symbol| *symbol)
            .map_err(|err| import_error(err.to_string()))?;
        // the library stays loaded for the life of the VM, so `setup` and
        // any natives it registers remain valid
        self.libraries.push(library);
        self.call_setup(path, setup)
    }

    /// Run a native module's entry point and check what it reported.
    pub(crate) fn call_setup(
        &mut self,
        path: &str,
        setup: SetupFn,
    ) -> Result<Value, RuntimeError> {
        let import_error = |reason: String| RuntimeError::Import {
            path: path.to_string(),
            reason,
        };
        // SAFETY: `setup` follows the `SetupFn` contract and the VM pointer
        // is exclusive for the call.
        let namespace = unsafe { setup(self as *mut Vm) };
        if let Some(failure) = self.failure.take() {
            return Err(import_error(failure.to_string()));
        }
        if namespace.is_null_ref() {
            return Err(import_error("setup returned no namespace".to_string()));
        }
        Ok(namespace)
    }

    /// Copy every entry of an imported namespace into the importer's
    /// current scope.
    pub(crate) fn merge_namespace(
        &mut self,
        segment: usize,
        namespace: Value,
    ) -> Result<(), RuntimeError> {
        let entries: Vec<(String, Value)> = match self.heap.body(namespace) {
            Body::Dictionary(dict) => {
                dict.iter().map(|(k, v)| (k.to_string(), v)).collect()
            }
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    operation: "IMPORT",
                    expected: "dictionary".to_string(),
                    found: self.type_name(namespace).to_string(),
                });
            }
        };
        for (name, value) in entries {
            self.assign(segment, &name, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::*;
    use crate::testing::vm;
    use crate::Error;

    /// A fresh directory under the system temp dir, removed on drop.
    struct TempDir(PathBuf);

    impl TempDir {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir()
                .join(format!("tern-import-{name}-{}", std::process::id()));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn write(&self, name: &str, contents: &str) -> PathBuf {
            let path = self.0.join(name);
            fs::write(&path, contents).unwrap();
            path
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    unsafe extern "C" fn setup_seven(vm: *mut Vm) -> Value {
        // SAFETY: `call_setup` passes its own exclusive pointer.
        let vm = unsafe { &mut *vm };
        let namespace = vm.new_dictionary().unwrap();
        let seven = vm.new_integer(7).unwrap();
        vm.dictionary_insert(namespace, "seven", seven).unwrap();
        namespace
    }

    unsafe extern "C" fn setup_failing(vm: *mut Vm) -> Value {
        // SAFETY: as above.
        let vm = unsafe { &mut *vm };
        vm.fail("missing dependency");
        Value::NULL_REF
    }

    unsafe extern "C" fn setup_silent(_vm: *mut Vm) -> Value {
        Value::NULL_REF
    }

    #[test]
    fn native_extensions_are_recognized() {
        assert!(is_native(Path::new("lib/m.so")));
        assert!(is_native(Path::new("m.dll")));
        assert!(!is_native(Path::new("m.tn")));
        assert!(!is_native(Path::new("so")));
    }

    #[test]
    fn unnamed_import_merges_globals() {
        let dir = TempDir::new("merge");
        dir.write("lib.tn", "answer = 41; function bump(x) { return x + 1; }");
        let main = dir.write("main.tn", r#"import "lib.tn"; return bump(answer);"#);
        let mut vm = vm();
        let result = vm.run_file(&main).unwrap();
        assert_eq!(vm.to_integer(result), Some(42));
    }

    #[test]
    fn named_import_binds_one_name() {
        let dir = TempDir::new("named");
        dir.write("lib.tn", "function twice(x) { return x * 2; }");
        let main = dir.write("main.tn", r#"import "lib.tn" as m; return m.twice(4);"#);
        let mut vm = vm();
        let result = vm.run_file(&main).unwrap();
        assert_eq!(vm.to_integer(result), Some(8));

        let bare = dir.write("bare.tn", r#"import "lib.tn" as m; return twice(4);"#);
        match vm.run_file(&bare) {
            Err(Error::Runtime {
                error: RuntimeError::UndefinedVariable { name },
                ..
            }) => assert_eq!(name, "twice"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn second_import_reuses_the_segment() {
        let dir = TempDir::new("cache");
        dir.write("counter.tn", "hits = [1];");
        let main = dir.write(
            "main.tn",
            r#"import "counter.tn" as a; import "counter.tn" as b;
               a.hits.push(2); return len(b.hits);"#,
        );
        let mut vm = vm();
        let result = vm.run_file(&main).unwrap();
        assert_eq!(vm.to_integer(result), Some(2));
        // main plus one counter segment
        assert_eq!(vm.segment_count(), 2);
    }

    #[test]
    fn missing_file_is_an_import_error() {
        let mut vm = vm();
        let err = vm.run(r#"import "/definitely/not/here.tn";"#).unwrap_err();
        assert!(matches!(
            err,
            Error::Runtime {
                error: RuntimeError::Import { .. },
                ..
            }
        ));
    }

    #[test]
    fn syntax_errors_in_the_module_are_import_errors() {
        let dir = TempDir::new("syntax");
        dir.write("bad.tn", "x = ;");
        let main = dir.write("main.tn", r#"import "bad.tn";"#);
        let mut vm = vm();
        match vm.run_file(&main) {
            Err(Error::Runtime {
                error: RuntimeError::Import { path, .. },
                ..
            }) => assert_eq!(path, "bad.tn"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn runtime_faults_in_the_module_carry_its_location() {
        let dir = TempDir::new("fault");
        dir.write("lib.tn", "x = 1;\ny = x + z;");
        let main = dir.write("main.tn", r#"import "lib.tn";"#);
        let mut vm = vm();
        match vm.run_file(&main) {
            Err(Error::Runtime {
                error: RuntimeError::UndefinedVariable { name },
                location: Some(location),
            }) => {
                assert_eq!(name, "z");
                assert!(location.ends_with("lib.tn:2:9"), "{location}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_library_is_an_import_error() {
        let dir = TempDir::new("native");
        let lib = dir.write("fake.so", "not a library");
        let mut vm = vm();
        let err = vm
            .run(&format!("import {:?};", lib.display().to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Runtime {
                error: RuntimeError::Import { .. },
                ..
            }
        ));
    }

    #[test]
    fn setup_namespace_merges_and_binds() {
        let mut vm = vm();
        vm.run("before = 0;").unwrap();
        let segment = vm.segment_count() - 1;

        let namespace = vm.call_setup("ext.so", setup_seven).unwrap();
        vm.merge_namespace(segment, namespace).unwrap();
        vm.assign(segment, "ext", namespace);

        let result = vm.run("return [before, seven, ext.seven];").unwrap();
        assert_eq!(vm.display(result), "[0, 7, 7]");
    }

    #[test]
    fn setup_failure_becomes_an_import_error() {
        let mut vm = vm();
        match vm.call_setup("ext.so", setup_failing) {
            Err(RuntimeError::Import { path, reason }) => {
                assert_eq!(path, "ext.so");
                assert_eq!(reason, "missing dependency");
            }
            other => panic!("unexpected {other:?}"),
        }
        // the failure was consumed by the import
        assert!(!vm.has_failed());
    }

    #[test]
    fn setup_without_namespace_is_an_import_error() {
        let mut vm = vm();
        match vm.call_setup("ext.so", setup_silent) {
            Err(RuntimeError::Import { reason, .. }) => {
                assert_eq!(reason, "setup returned no namespace");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn merging_requires_a_dictionary() {
        let mut vm = vm();
        let not_a_namespace = vm.new_integer(1).unwrap();
        assert!(matches!(
            vm.merge_namespace(0, not_a_namespace),
            Err(RuntimeError::TypeMismatch { operation: "IMPORT", .. })
        ));
    }
}
