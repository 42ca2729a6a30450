//! Little-endian field readers for raw account data.

use thiserror::Error;

/// Solana public key length in bytes.
pub const PUBKEY_LEN: usize = 32;

/// Errors raised while turning raw account bytes into position figures.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("account {pubkey}: unsupported data encoding '{encoding}'")]
    Encoding { pubkey: String, encoding: String },

    #[error("account {pubkey}: invalid base64 data: {reason}")]
    Base64 { pubkey: String, reason: String },

    #[error("malformed program account entry: {0}")]
    Malformed(String),

    #[error("account data too short: need {needed} bytes at offset {offset}, have {len}")]
    TooShort {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("account {pubkey}: unexpected discriminator")]
    Discriminator { pubkey: String },

    #[error("account {pubkey}: {reason}")]
    Invalid { pubkey: String, reason: String },

    #[error("{protocol} account decoding is not supported: {reason}")]
    Unsupported {
        protocol: &'static str,
        reason: &'static str,
    },
}

fn slice(data: &[u8], offset: usize, needed: usize) -> Result<&[u8], DecodeError> {
    data.get(offset..offset + needed).ok_or(DecodeError::TooShort {
        offset,
        needed,
        len: data.len(),
    })
}

pub(crate) fn u8_at(data: &[u8], offset: usize) -> Result<u8, DecodeError> {
    Ok(slice(data, offset, 1)?[0])
}

pub(crate) fn u128_at(data: &[u8], offset: usize) -> Result<u128, DecodeError> {
    let mut buf = [0u8; 16];
    buf.copy_from_slice(slice(data, offset, 16)?);
    Ok(u128::from_le_bytes(buf))
}

pub(crate) fn pubkey_at(data: &[u8], offset: usize) -> Result<[u8; PUBKEY_LEN], DecodeError> {
    let mut buf = [0u8; PUBKEY_LEN];
    buf.copy_from_slice(slice(data, offset, PUBKEY_LEN)?);
    Ok(buf)
}

/// Base58 rendering of a 32-byte key, or `None` for the all-zero (unset) key.
pub(crate) fn non_default_pubkey(key: &[u8; PUBKEY_LEN]) -> Option<String> {
    if key.iter().all(|b| *b == 0) {
        None
    } else {
        Some(bs58::encode(key).into_string())
    }
}

/// Convert a WAD-scaled (1e18) decimal to `f64`.
pub(crate) fn wad_to_f64(raw: u128) -> f64 {
    raw as f64 / 1e18
}

/// Convert a U68F60 fixed-point value (`*_sf` fields) to `f64`.
pub(crate) fn sf_to_f64(raw: u128) -> f64 {
    raw as f64 / (1u128 << 60) as f64
}
