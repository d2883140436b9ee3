//! Artifact envelope: how compiled bytecode travels as a standalone file.
//!
//! Layered encoding, applied to an already codec-obfuscated `Bytecode`:
//!
//! 1. serialize with a self-describing encoding that preserves the
//!    polymorphic constant variants (serde_json);
//! 2. XOR-mask the serialized bytes, keyed by their length;
//! 3. encrypt with a SHA-256 counter-keystream cipher under a build-time
//!    key;
//! 4. append a 32-byte keyed SHA-256 signature over the ciphertext.
//!
//! Loading reverses the layers and fails fatally on a signature mismatch,
//! garbage from decryption, or a format mismatch.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::codec;
use crate::compiler::Bytecode;

/// Build-time envelope key. Overridable at compile time so release builds
/// can carry their own secret.
const BUILD_KEY: &[u8] = match option_env!("ZETA_BUILD_KEY") {
    Some(key) => key.as_bytes(),
    None => b"zeta-default-build-key-v2",
};

const SIGNATURE_LEN: usize = 32;

/// Seal obfuscated bytecode into a distributable artifact.
pub fn encode(bytecode: &Bytecode) -> Result<Vec<u8>, String> {
    let serialized =
        serde_json::to_vec(bytecode).map_err(|e| format!("serialization failed: {}", e))?;

    let mut masked = serialized;
    let length = masked.len();
    codec::mask(&mut masked, length);

    let mut ciphertext = masked;
    apply_keystream(&mut ciphertext);

    let signature = sign(&ciphertext);
    debug!(
        payload = ciphertext.len(),
        "sealed bytecode artifact"
    );

    let mut artifact = ciphertext;
    artifact.extend_from_slice(&signature);
    Ok(artifact)
}

/// Open an artifact produced by `encode`, yielding obfuscated bytecode
/// ready for the VM.
pub fn decode(artifact: &[u8]) -> Result<Bytecode, String> {
    if artifact.len() < SIGNATURE_LEN {
        return Err("artifact too short".to_string());
    }
    let (ciphertext, signature) = artifact.split_at(artifact.len() - SIGNATURE_LEN);

    let expected = sign(ciphertext);
    if signature != expected {
        return Err("signature mismatch".to_string());
    }

    let mut masked = ciphertext.to_vec();
    apply_keystream(&mut masked);

    let length = masked.len();
    codec::mask(&mut masked, length);

    serde_json::from_slice(&masked).map_err(|e| format!("format mismatch: {}", e))
}

/// Symmetric counter-mode keystream: block `i` of the stream is
/// `SHA-256(key || i)`, XORed over the payload. Applying it twice is the
/// identity, so the same routine encrypts and decrypts.
fn apply_keystream(payload: &mut [u8]) {
    for (block_index, block) in payload.chunks_mut(32).enumerate() {
        let mut hasher = Sha256::new();
        hasher.update(BUILD_KEY);
        hasher.update((block_index as u64).to_be_bytes());
        let keystream = hasher.finalize();
        for (byte, key_byte) in block.iter_mut().zip(keystream.iter()) {
            *byte ^= key_byte;
        }
    }
}

/// Keyed signature over the ciphertext.
fn sign(ciphertext: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(BUILD_KEY);
    hasher.update(b"zeta-artifact-signature");
    hasher.update(ciphertext);
    hasher.finalize().into()
}
