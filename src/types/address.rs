//! 20-byte account addresses and their `ST…` text form.
//!
//! The text form is `ST` followed by 39 Crockford base-32 ("c32") digits
//! that encode the 20 address bytes and a 4-byte SHA3 checksum, giving a
//! fixed 41-character identifier.

use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use simnet_derive::{BinaryCodec, Error};
use std::fmt;
use std::str::FromStr;

/// Address length in bytes.
pub const ADDRESS_SIZE: usize = 20;

const CHECKSUM_SIZE: usize = 4;
const PAYLOAD_SIZE: usize = ADDRESS_SIZE + CHECKSUM_SIZE;
const PREFIX: &str = "ST";
/// Number of c32 digits needed for the 192-bit payload.
const DIGITS: usize = (PAYLOAD_SIZE * 8).div_ceil(5);
const C32_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Fixed-size 20-byte address identifying an account.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BinaryCodec)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

/// Errors produced when parsing the text form of an address.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address must start with ST")]
    MissingPrefix,
    #[error("address must have {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid c32 character {0:?}")]
    InvalidCharacter(char),
    #[error("address checksum mismatch")]
    ChecksumMismatch,
}

impl Address {
    /// Derives the address of a seeded identity.
    ///
    /// The same `(chain_id, name)` pair always yields the same address, which
    /// keeps test fixtures reproducible across runs.
    pub fn derive(chain_id: u64, name: &str) -> Self {
        let mut h = Hash::sha3();
        h.update(b"SIMNET_ACCOUNT");
        chain_id.encode(&mut h);
        name.encode(&mut h);
        let hash = h.finalize();

        let mut out = [0u8; ADDRESS_SIZE];
        out.copy_from_slice(&hash.0[HASH_LEN_OFFSET..]);
        Address(out)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    fn checksum(bytes: &[u8; ADDRESS_SIZE]) -> [u8; CHECKSUM_SIZE] {
        let hash = Hash::sha3().chain(b"C32").chain(bytes).finalize();
        let mut out = [0u8; CHECKSUM_SIZE];
        out.copy_from_slice(&hash.0[..CHECKSUM_SIZE]);
        out
    }
}

/// Offset of the address bytes inside a 32-byte hash.
const HASH_LEN_OFFSET: usize = 12;

fn c32_encode(data: &[u8; PAYLOAD_SIZE]) -> String {
    let mut digits = Vec::with_capacity(DIGITS);
    let mut carry: u16 = 0;
    let mut carry_bits = 0;

    for &byte in data.iter().rev() {
        carry |= (byte as u16) << carry_bits;
        carry_bits += 8;
        while carry_bits >= 5 {
            digits.push(C32_ALPHABET[(carry & 0x1f) as usize]);
            carry >>= 5;
            carry_bits -= 5;
        }
    }
    if carry_bits > 0 {
        digits.push(C32_ALPHABET[(carry & 0x1f) as usize]);
    }

    digits.reverse();
    digits.into_iter().map(char::from).collect()
}

fn c32_digit(c: char) -> Result<u16, AddressError> {
    // Crockford aliases: O reads as 0, I and L read as 1.
    let normalized = match c.to_ascii_uppercase() {
        'O' => '0',
        'I' | 'L' => '1',
        other => other,
    };
    C32_ALPHABET
        .iter()
        .position(|&d| d as char == normalized)
        .map(|p| p as u16)
        .ok_or(AddressError::InvalidCharacter(c))
}

fn c32_decode(digits: &str) -> Result<[u8; PAYLOAD_SIZE], AddressError> {
    let mut out = [0u8; PAYLOAD_SIZE];
    let mut idx = PAYLOAD_SIZE;
    let mut carry: u16 = 0;
    let mut carry_bits = 0;

    for c in digits.chars().rev() {
        carry |= c32_digit(c)? << carry_bits;
        carry_bits += 5;
        if carry_bits >= 8 {
            if idx == 0 {
                return Err(AddressError::ChecksumMismatch);
            }
            idx -= 1;
            out[idx] = (carry & 0xff) as u8;
            carry >>= 8;
            carry_bits -= 8;
        }
    }

    // The leading digit carries three padding bits that must be zero.
    if idx != 0 || carry != 0 {
        return Err(AddressError::ChecksumMismatch);
    }
    Ok(out)
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload[..ADDRESS_SIZE].copy_from_slice(&self.0);
        payload[ADDRESS_SIZE..].copy_from_slice(&Self::checksum(&self.0));
        write!(f, "{PREFIX}{}", c32_encode(&payload))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(PREFIX).ok_or(AddressError::MissingPrefix)?;
        if digits.len() != DIGITS {
            return Err(AddressError::InvalidLength {
                expected: PREFIX.len() + DIGITS,
                actual: s.len(),
            });
        }

        let payload = c32_decode(digits)?;
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&payload[..ADDRESS_SIZE]);
        if payload[ADDRESS_SIZE..] != Self::checksum(&bytes) {
            return Err(AddressError::ChecksumMismatch);
        }
        Ok(Address(bytes))
    }
}
