//! tern: a small dynamically typed scripting language.
//!
//! Source text is parsed by the `parser` crate, compiled here into a
//! segment image (see the `bytecode` crate), and executed by [`Vm`], a
//! stack machine over a heap of type-dispatched records with a copying
//! garbage collector. Segments can import other source files or native
//! extensions at run time.
//!
//! ```no_run
//! let mut vm = tern::Vm::new(tern::VmSettings::default())?;
//! let value = vm.run("return 6 * 7;")?;
//! assert_eq!(vm.to_integer(value), Some(42));
//! # Ok::<(), tern::Error>(())
//! ```

pub mod compiler;
pub mod dictionary;
pub mod error;
pub mod header;
pub mod heap;
pub mod import;
pub mod object;
pub mod segment;
pub mod types;
pub mod value;
pub mod vm;

mod builtins;
mod interpreter;

#[cfg(test)]
mod testing;

pub use compiler::{CompileError, compile};
pub use dictionary::Dictionary;
pub use error::{Error, RuntimeError};
pub use heap::{GcStats, HeapSettings};
pub use import::SetupFn;
pub use object::{NativeFn, NativeFunction};
pub use types::SpecialObjects;
pub use value::Value;
pub use vm::{Vm, VmSettings};
