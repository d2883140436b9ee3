//! Error kinds for the compilation-and-execution pipeline.
//!
//! The distinct kinds exist so the CLI and the REPL can render each class
//! of failure with appropriate context: parser errors come as a list,
//! compiler and machine errors as single messages, envelope errors are
//! fatal at artifact load.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZetaError {
    /// Lex/parse errors, collected by the parser and reported together.
    #[error("parser errors")]
    Parse(Vec<String>),

    /// The first undefined name or unknown operator the compiler hit.
    #[error("compiler error: {0}")]
    Compile(String),

    /// A VM abort: stack overflow, wrong argument count, bad operand
    /// types, and friends.
    #[error("machine error: {0}")]
    Machine(String),

    /// Signature mismatch, decryption failure, or format mismatch while
    /// loading a compiled artifact.
    #[error("envelope error: {0}")]
    Envelope(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ZetaError {
    /// Multi-line rendering for terminals.
    pub fn report(&self) -> String {
        match self {
            ZetaError::Parse(errors) => {
                let mut out = String::from("parser errors:\n");
                for error in errors {
                    out.push_str(&format!("\t{}\n", error));
                }
                out
            }
            ZetaError::Compile(message) => {
                format!("compilation failed:\n\t{}\n", message)
            }
            ZetaError::Machine(message) => {
                format!("executing bytecode failed:\n\t{}\n", message)
            }
            ZetaError::Envelope(message) => {
                format!("invalid bytecode artifact: {}\n", message)
            }
            ZetaError::Io(error) => format!("{}\n", error),
        }
    }
}
