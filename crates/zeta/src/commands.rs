//! File compile and run commands.
//!
//! Pipeline failures (parse, compile, machine, envelope) are rendered to
//! the terminal and do not change the exit code; only argument and I/O
//! errors bubble up as failures.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;
use zeta_core::pipeline;

/// Compile `FILE.zeta` into `FILE.ze` next to it.
pub fn compile_file(path: &Path) -> Result<()> {
    let start = Instant::now();
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let artifact = match pipeline::build_artifact(&source) {
        Ok(artifact) => artifact,
        Err(error) => {
            eprint!("{}", error.report());
            return Ok(());
        }
    };

    let destination = path.with_extension(
        zeta_core::ARTIFACT_EXTENSION.trim_start_matches('.'),
    );
    std::fs::write(&destination, &artifact)
        .with_context(|| format!("failed to write {}", destination.display()))?;

    debug!(artifact = %destination.display(), bytes = artifact.len(), "artifact written");
    println!("Compiled in: {:?}", start.elapsed());
    Ok(())
}

/// Run a `.ze` artifact on the VM.
pub fn run_file(path: &Path) -> Result<()> {
    let artifact =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;

    if let Err(error) = pipeline::run_artifact(&artifact) {
        eprint!("{}", error.report());
    }
    Ok(())
}
