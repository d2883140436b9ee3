//! Zeta language core
//!
//! The full compilation-and-execution pipeline for the Zeta scripting
//! language:
//!
//! ```text
//! source text → tokens → AST → (symbol table + compiler)
//!             → bytecode {instructions, constants}
//!             → obfuscation codec → envelope → VM → final value
//! ```
//!
//! The CLI crate (`zeta`) layers file I/O, the REPL, and release packaging
//! on top of this library.

pub mod ast;
pub mod builtins;
pub mod code;
pub mod codec;
pub mod compiler;
pub mod envelope;
pub mod errors;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod pipeline;
pub mod symbol;
pub mod token;
pub mod vm;

/// Version reported by `zeta --version` and the REPL banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extension of textual Zeta source files.
pub const SOURCE_EXTENSION: &str = ".zeta";

/// Extension of compiled bytecode artifacts.
pub const ARTIFACT_EXTENSION: &str = ".ze";

/// Extension appended to release binaries targeting Windows.
pub const WINDOWS_EXE_EXTENSION: &str = ".exe";
