//! Obfuscation codec: per-byte masking and per-value encryption.
//!
//! Both transforms are keyed by the length of the top-level instruction
//! buffer, which acts as a per-program salt. `mask` is an involution
//! (`mask(mask(b, L), L) = b`), so every encrypt pairs with a decrypt by
//! applying the same transform again.
//!
//! Value layouts: integers as u64 little-endian, floats as f64 bits
//! little-endian, booleans as the ASCII text `true`/`false`, strings as
//! their raw bytes. The scheme is a deterrent, not a cryptographic
//! guarantee.

use std::rc::Rc;

use crate::compiler::Bytecode;
use crate::object::{CompiledFunction, EncType, Object};

/// Fold the salt length down to a single XOR key byte (splitmix64-style
/// mixing, so nearby lengths do not share keys).
fn key_byte(length: usize) -> u8 {
    let mut x = (length as u64) ^ 0x9e37_79b9_7f4a_7c15;
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    (x ^ (x >> 31)) as u8
}

/// Mask a single byte.
pub fn mask_byte(byte: u8, length: usize) -> u8 {
    byte ^ key_byte(length)
}

/// Mask a byte buffer in place.
pub fn mask(bytes: &mut [u8], length: usize) {
    let key = key_byte(length);
    for byte in bytes.iter_mut() {
        *byte ^= key;
    }
}

/// Masked copy of a byte buffer.
pub fn masked(bytes: &[u8], length: usize) -> Vec<u8> {
    let key = key_byte(length);
    bytes.iter().map(|b| b ^ key).collect()
}

/// Encrypt one value, or `None` when the value kind has no encrypted form
/// (callers then keep the plain value).
pub fn encrypt_object(object: &Object, length: usize) -> Option<Object> {
    let (enc_type, bytes) = match object {
        Object::Integer(value) => (EncType::Integer, (*value as u64).to_le_bytes().to_vec()),
        Object::Float(value) => (EncType::Float, value.to_bits().to_le_bytes().to_vec()),
        Object::Boolean(value) => (EncType::Boolean, value.to_string().into_bytes()),
        Object::Str(value) => (EncType::Str, value.as_bytes().to_vec()),
        _ => return None,
    };
    Some(Object::Encrypted {
        enc_type,
        bytes: masked(&bytes, length),
    })
}

/// Decrypt one value, or `None` when the value is not encrypted (callers
/// then keep the value as-is).
pub fn decrypt_object(object: &Object, length: usize) -> Option<Object> {
    let Object::Encrypted { enc_type, bytes } = object else {
        return None;
    };
    let plain = masked(bytes, length);
    Some(match enc_type {
        EncType::Integer => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&plain[..8]);
            Object::Integer(u64::from_le_bytes(raw) as i64)
        }
        EncType::Float => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&plain[..8]);
            Object::Float(f64::from_bits(u64::from_le_bytes(raw)))
        }
        EncType::Boolean => Object::Boolean(String::from_utf8_lossy(&plain).to_lowercase() == "true"),
        EncType::Str => Object::Str(String::from_utf8_lossy(&plain).into_owned()),
    })
}

/// Finalize compiled bytecode for execution and distribution: mask the
/// top-level instruction buffer with its own length, then encrypt every
/// constant with that length — compiled-function constants get their
/// instruction vectors masked, scalar constants become `Encrypted` values.
pub fn encrypt_bytecode(mut bytecode: Bytecode) -> Bytecode {
    let inslen = bytecode.instructions.len();
    mask(&mut bytecode.instructions, inslen);

    for constant in bytecode.constants.iter_mut() {
        if let Object::CompiledFunction(func) = constant {
            let replacement = CompiledFunction {
                instructions: masked(&func.instructions, inslen),
                num_locals: func.num_locals,
                num_params: func.num_params,
            };
            *constant = Object::CompiledFunction(Rc::new(replacement));
        } else if let Some(encrypted) = encrypt_object(constant, inslen) {
            *constant = encrypted;
        }
    }
    bytecode
}
