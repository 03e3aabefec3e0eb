use bitvec::prelude::*;

use crate::{
    error::{Error, Result},
    Challenge,
};

/// Widest prefix a lookup can match: the whole stored digest.
pub const MAX_PREFIX_BITS: u8 = 64;

/// Calculate the width of the challenge prefix a plot of size `k` must match.
///
/// A plot holds `2^k` uniformly distributed digests, so a `k`-bit prefix
/// matches about one entry per plot. Every extra bit halves that.
pub fn lookup_prefix_bits(k: u8, extra_bits: u8) -> Result<u8> {
    let bits = k as u16 + extra_bits as u16;
    if bits == 0 || bits > MAX_PREFIX_BITS as u16 {
        return Err(Error::InvalidParameters(format!(
            "prefix width {bits} (k={k} + {extra_bits}) must be within 1..={MAX_PREFIX_BITS}"
        )));
    }
    Ok(bits as u8)
}

/// Leading bits of a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    value: u64,
    bits: u8,
}

impl Prefix {
    pub fn new(value: u64, bits: u8) -> Result<Self> {
        if bits == 0 || bits > MAX_PREFIX_BITS {
            return Err(Error::InvalidParameters(format!(
                "prefix width {bits} must be within 1..={MAX_PREFIX_BITS}"
            )));
        }
        if bits < MAX_PREFIX_BITS && value >> bits != 0 {
            return Err(Error::InvalidParameters(format!(
                "prefix value {value:#x} does not fit in {bits} bits"
            )));
        }
        Ok(Self { value, bits })
    }

    /// Take the leading `bits` bits of the challenge.
    pub fn from_challenge(challenge: &Challenge, bits: u8) -> Result<Self> {
        if bits == 0 || bits > MAX_PREFIX_BITS {
            return Err(Error::InvalidParameters(format!(
                "prefix width {bits} must be within 1..={MAX_PREFIX_BITS}"
            )));
        }
        let value = challenge.0.view_bits::<Msb0>()[..bits as usize].load_be::<u64>();
        Ok(Self { value, bits })
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    fn shift(&self) -> u32 {
        (MAX_PREFIX_BITS - self.bits) as u32
    }

    /// Smallest digest starting with this prefix.
    pub fn lower(&self) -> u64 {
        self.value << self.shift()
    }

    /// Largest digest starting with this prefix.
    pub fn upper(&self) -> u64 {
        self.lower() | u64::MAX.checked_shr(self.bits as u32).unwrap_or(0)
    }

    pub fn matches(&self, y: u64) -> bool {
        y >> self.shift() == self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_bits_follow_k() {
        assert_eq!(10, lookup_prefix_bits(10, 0).unwrap());
        assert_eq!(26, lookup_prefix_bits(10, 16).unwrap());
        assert_eq!(64, lookup_prefix_bits(40, 24).unwrap());
        assert!(lookup_prefix_bits(40, 25).is_err());
        assert!(lookup_prefix_bits(0, 0).is_err());
    }

    #[test]
    fn prefix_from_challenge() {
        let mut challenge = Challenge([0u8; 32]);
        challenge.0[0] = 0b1011_0110;
        challenge.0[1] = 0b1100_0000;

        let prefix = Prefix::from_challenge(&challenge, 4).unwrap();
        assert_eq!(0b1011, prefix.value());

        let prefix = Prefix::from_challenge(&challenge, 10).unwrap();
        assert_eq!(0b1011_0110_11, prefix.value());
        assert_eq!(0b1011_0110_11 << 54, prefix.lower());
        assert_eq!(prefix.lower() | (u64::MAX >> 10), prefix.upper());

        let full = Prefix::from_challenge(&challenge, 64).unwrap();
        assert_eq!(
            u64::from_be_bytes(challenge.0[..8].try_into().unwrap()),
            full.value()
        );
        assert_eq!(full.lower(), full.upper());
    }

    #[test]
    fn matching_digests() {
        let prefix = Prefix::new(0b101, 3).unwrap();
        assert!(prefix.matches(0b101 << 61));
        assert!(prefix.matches(prefix.upper()));
        assert!(!prefix.matches(0b100 << 61 | (u64::MAX >> 3)));
        assert!(!prefix.matches(0b110 << 61));
    }

    #[test]
    fn rejects_bad_prefixes() {
        assert!(Prefix::new(0, 0).is_err());
        assert!(Prefix::new(0, 65).is_err());
        assert!(Prefix::new(0b1000, 3).is_err());
        assert!(Prefix::new(u64::MAX, 64).is_ok());
        assert!(Prefix::from_challenge(&Challenge([0; 32]), 65).is_err());
    }
}
