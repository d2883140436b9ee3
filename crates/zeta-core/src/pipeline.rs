//! Pipeline wiring: source text in, artifact bytes or final value out.
//!
//! These are the entry points the CLI and REPL drive; each stage maps a
//! failure into the matching `ZetaError` kind so callers can render it
//! with the right context.

use tracing::debug;

use crate::codec;
use crate::compiler::{Bytecode, Compiler};
use crate::envelope;
use crate::errors::ZetaError;
use crate::object::Object;
use crate::parser::Parser;
use crate::vm::Vm;

/// Parse and compile source text into plain (not yet obfuscated) bytecode.
pub fn compile_source(source: &str) -> Result<Bytecode, ZetaError> {
    let mut parser = Parser::from_source(source);
    let program = parser.parse_program();
    if !parser.errors().is_empty() {
        return Err(ZetaError::Parse(parser.errors().to_vec()));
    }

    let mut compiler = Compiler::new();
    compiler.compile(&program).map_err(ZetaError::Compile)?;
    let bytecode = compiler.bytecode();
    debug!(
        instructions = bytecode.instructions.len(),
        constants = bytecode.constants.len(),
        "compiled program"
    );
    Ok(bytecode)
}

/// Compile source text all the way down to a sealed `.ze` artifact.
pub fn build_artifact(source: &str) -> Result<Vec<u8>, ZetaError> {
    let bytecode = compile_source(source)?;
    let obfuscated = codec::encrypt_bytecode(bytecode);
    envelope::encode(&obfuscated).map_err(ZetaError::Envelope)
}

/// Open a sealed artifact and execute it, returning the program's last
/// value.
pub fn run_artifact(artifact: &[u8]) -> Result<Object, ZetaError> {
    let bytecode = envelope::decode(artifact).map_err(ZetaError::Envelope)?;
    run_obfuscated(bytecode)
}

/// Obfuscate and execute plain bytecode.
pub fn run_bytecode(bytecode: Bytecode) -> Result<Object, ZetaError> {
    run_obfuscated(codec::encrypt_bytecode(bytecode))
}

/// Compile and execute source text in one step.
pub fn run_source(source: &str) -> Result<Object, ZetaError> {
    run_bytecode(compile_source(source)?)
}

fn run_obfuscated(bytecode: Bytecode) -> Result<Object, ZetaError> {
    let mut vm = Vm::new(bytecode);
    vm.run().map_err(ZetaError::Machine)?;
    Ok(vm.last_popped())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_source() {
        assert_eq!(run_source("1 + 2;").unwrap(), Object::Integer(3));
    }

    #[test]
    fn test_parse_errors_stop_the_pipeline() {
        match run_source("let = 5;") {
            Err(ZetaError::Parse(errors)) => assert!(!errors.is_empty()),
            other => panic!("expected parse error, got {:?}", other.map(|o| o.inspect())),
        }
    }

    #[test]
    fn test_compile_errors_stop_the_pipeline() {
        match run_source("nope;") {
            Err(ZetaError::Compile(message)) => {
                assert_eq!(message, "undefined variable: nope")
            }
            other => panic!("expected compile error, got {:?}", other.map(|o| o.inspect())),
        }
    }

    #[test]
    fn test_artifact_round_trip_matches_direct_run() {
        let source = "let double = fn(x) { x * 2 }; double(21);";
        let direct = run_source(source).unwrap();
        let artifact = build_artifact(source).unwrap();
        let via_artifact = run_artifact(&artifact).unwrap();
        assert_eq!(direct, via_artifact);
        assert_eq!(direct, Object::Integer(42));
    }
}
