//! Release packaging: embed a sealed artifact into a host runner binary.
//!
//! Layout of a release binary, back to front:
//!
//! ```text
//! [runner executable bytes][artifact payload][payload len u64 LE][MAGIC]
//! ```
//!
//! The runner is this very binary: at startup it scans its own tail for
//! the magic footer and, when present, verifies/decrypts the payload and
//! feeds it straight into the VM. Cross-target packaging uses prebuilt
//! runner stubs from `ZETA_RUNNERS_DIR`, named `zeta-runner-<os>-<arch>`
//! (plus `.exe` for windows); the native target defaults to the current
//! executable.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use zeta_core::pipeline;

const MAGIC: &[u8; 8] = b"ZETAPKG1";
const FOOTER_LEN: usize = 16;

/// Payload embedded in the currently running executable, if any.
pub fn embedded_payload() -> Result<Option<Vec<u8>>> {
    let exe = std::env::current_exe().context("cannot locate current executable")?;
    let bytes = std::fs::read(&exe)
        .with_context(|| format!("cannot read current executable {}", exe.display()))?;
    Ok(extract(&bytes).map(<[u8]>::to_vec))
}

fn extract(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() < FOOTER_LEN {
        return None;
    }
    let (rest, magic) = bytes.split_at(bytes.len() - MAGIC.len());
    if magic != MAGIC {
        return None;
    }
    let (rest, len_bytes) = rest.split_at(rest.len() - 8);
    let payload_len = u64::from_le_bytes(len_bytes.try_into().ok()?) as usize;
    if payload_len > rest.len() {
        return None;
    }
    Some(&rest[rest.len() - payload_len..])
}

/// Compile `src` and package it with a runner for the requested target.
pub fn build(src: &Path, os: Option<&str>, arch: Option<&str>) -> Result<()> {
    let name = src.to_string_lossy();
    if !name.ends_with(zeta_core::SOURCE_EXTENSION) {
        bail!("incorrect file extension, this program only works for zeta source code files");
    }

    let target_os = normalize_os(os)?;
    let target_arch = normalize_arch(arch)?;

    let source = std::fs::read_to_string(src)
        .with_context(|| format!("failed to read {}", src.display()))?;
    let artifact = match pipeline::build_artifact(&source) {
        Ok(artifact) => artifact,
        Err(error) => {
            eprint!("{}", error.report());
            return Ok(());
        }
    };

    let runner = runner_bytes(&target_os, &target_arch)?;
    debug!(
        runner = runner.len(),
        payload = artifact.len(),
        "assembling release binary"
    );

    let mut output = runner;
    output.extend_from_slice(&artifact);
    output.extend_from_slice(&(artifact.len() as u64).to_le_bytes());
    output.extend_from_slice(MAGIC);

    let mut destination = PathBuf::from(name.trim_end_matches(zeta_core::SOURCE_EXTENSION));
    if target_os == "windows" {
        destination = PathBuf::from(format!(
            "{}{}",
            destination.display(),
            zeta_core::WINDOWS_EXE_EXTENSION
        ));
    }

    std::fs::write(&destination, &output)
        .with_context(|| format!("failed to write {}", destination.display()))?;
    mark_executable(&destination)?;

    info!(binary = %destination.display(), "release build complete");
    println!("Release binary written to {}", destination.display());
    Ok(())
}

/// The host binary the payload is appended to: the current executable for
/// the native target, a prebuilt stub otherwise.
fn runner_bytes(target_os: &str, target_arch: &str) -> Result<Vec<u8>> {
    if target_os == host_os() && target_arch == host_arch() {
        let exe = std::env::current_exe().context("cannot locate current executable")?;
        let bytes = std::fs::read(&exe)
            .with_context(|| format!("cannot read current executable {}", exe.display()))?;
        // Never nest payloads: strip an existing footer if this binary
        // already carries one.
        let stripped_len = match extract(&bytes) {
            Some(payload) => bytes.len() - payload.len() - FOOTER_LEN,
            None => bytes.len(),
        };
        return Ok(bytes[..stripped_len].to_vec());
    }

    let runners_dir = std::env::var("ZETA_RUNNERS_DIR").map_err(|_| {
        anyhow::anyhow!(
            "cross-target release needs runner stubs: set ZETA_RUNNERS_DIR to a directory \
             containing zeta-runner-<os>-<arch> binaries"
        )
    })?;
    let mut stub = PathBuf::from(runners_dir).join(format!(
        "zeta-runner-{}-{}",
        target_os, target_arch
    ));
    if target_os == "windows" {
        stub = PathBuf::from(format!(
            "{}{}",
            stub.display(),
            zeta_core::WINDOWS_EXE_EXTENSION
        ));
    }
    std::fs::read(&stub).with_context(|| format!("cannot read runner stub {}", stub.display()))
}

fn normalize_os(os: Option<&str>) -> Result<String> {
    let os = match os {
        None => return Ok(host_os().to_string()),
        Some(os) => os.to_ascii_lowercase(),
    };
    match os.as_str() {
        "darwin" | "linux" | "windows" => Ok(os),
        other => bail!("unsupported target os: {} (darwin | linux | windows)", other),
    }
}

fn normalize_arch(arch: Option<&str>) -> Result<String> {
    let arch = match arch {
        None => return Ok(host_arch().to_string()),
        Some(arch) => arch.to_ascii_lowercase(),
    };
    match arch.as_str() {
        "amd64" | "arm64" | "arm" => Ok(arch),
        // 386 and x86 mean the same thing here.
        "386" | "x86" => Ok("386".to_string()),
        other => bail!(
            "unsupported target arch: {} (amd64 | arm64 | arm | 386)",
            other
        ),
    }
}

fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
