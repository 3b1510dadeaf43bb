//! Hex cpuset mask decoding.

use super::error::{AffinityError, Result};
use serde::{Deserialize, Serialize};

/// Number of CPUs a mask can address. Bit `i` of the mask is CPU `i`.
pub const MAX_CPUS: u32 = u64::BITS;

const HEX_PREFIX: &str = "0x";

/// Ordered sequence of unique logical CPU indices, each below [`MAX_CPUS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CpuIndexSet(Vec<u32>);

impl CpuIndexSet {
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &u32> {
        self.0.iter()
    }

    /// Reverse the enumeration order in place.
    pub fn reverse(&mut self) {
        self.0.reverse();
    }
}

impl AsRef<[u32]> for CpuIndexSet {
    fn as_ref(&self) -> &[u32] {
        &self.0
    }
}

/// Decode a `0x`-prefixed hex mask into ascending CPU indices.
pub fn decode_mask(mask: &str) -> Result<CpuIndexSet> {
    let digits = mask
        .strip_prefix(HEX_PREFIX)
        .ok_or_else(|| AffinityError::MissingPrefix {
            mask: mask.to_string(),
        })?;

    let value = parse_hex(mask, digits)?;

    let cpus: Vec<u32> = (0..MAX_CPUS)
        .filter(|bit| value & (1u64 << bit) != 0)
        .collect();

    if cpus.is_empty() {
        return Err(AffinityError::EmptyMask {
            mask: mask.to_string(),
        });
    }

    Ok(CpuIndexSet(cpus))
}

fn parse_hex(mask: &str, digits: &str) -> Result<u64> {
    let invalid = |reason: String| AffinityError::InvalidHex {
        mask: mask.to_string(),
        reason,
    };

    if digits.is_empty() {
        return Err(invalid("no hex digits after prefix".to_string()));
    }

    // from_str_radix tolerates a leading '+', the wire format does not
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(invalid(format!("unexpected character {bad:?}")));
    }

    u64::from_str_radix(digits, 16)
        .map_err(|_| invalid(format!("value does not fit in {MAX_CPUS} bits")))
}
