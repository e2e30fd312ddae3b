//!
//! This module defines the Target, CompactTarget and PowHash types used for
//! representing difficulty targets and proof-of-work digests.
//!
//! A Target is a 256-bit value that represents the difficulty threshold for mining
//! a block. The lower the target, the higher the difficulty. CompactTarget is the
//! encoded representation of this target that fits into a 32-bit value, used in
//! block headers as `nBits`. A PowHash is the 32-byte digest of a header, read as
//! a big-endian number so it can be compared against a Target.
//!
use std::fmt;

use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};

/// Represents a target value expressed as an unsigned 256-bit integer.
///
/// This struct provides a type-safe wrapper around `U256` (unsigned 256-bit integer)
/// so targets cannot be mixed up with hashes or amounts.
///
/// # Example
///
/// ```
/// use altcoin_consensus::pow::{CompactTarget, Target};
///
/// let target = Target::from_compact(CompactTarget::new(0x1d00ffff)).unwrap();
/// assert_eq!(target.to_compact(), CompactTarget::new(0x1d00ffff));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Target(U256);

impl Target {
    /// Creates a new Target instance with the specified U256 value.
    pub const fn new(target: U256) -> Self {
        Target(target)
    }

    /// Creates a new `Target` from a hexadecimal string representation.
    ///
    /// # Arguments
    ///
    /// * `hex` - A hexadecimal string representation of the 256-bit target value
    ///
    /// # Returns
    ///
    /// A new `Target` instance, or `None` if the string is not valid hex or
    /// does not fit into 256 bits.
    pub fn from_hex(hex: &str) -> Option<Self> {
        U256::from_str_radix(hex, 16).ok().map(Target)
    }

    /// Creates a Target from bytes (big-endian).
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(U256::from_big_endian(bytes))
    }

    /// Creates a new instance of `Target` with a zero-valued underlying integer.
    pub const fn zero() -> Self {
        Target(U256::zero())
    }

    /// Returns the underlying 256-bit integer.
    pub const fn as_u256(&self) -> U256 {
        self.0
    }

    /// Returns `true` if the target is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Computes `self * numerator / denominator` without intermediate overflow.
    ///
    /// The product is formed in 512 bits, so the only lossy step is the final
    /// truncating division. A quotient that no longer fits in 256 bits
    /// saturates at `U256::MAX`; callers clamp the result to a chain's maximum
    /// target afterwards, so saturation never changes an outcome.
    ///
    /// # Returns
    ///
    /// * `Some(Target)` - The scaled target
    /// * `None` - If `denominator` is zero
    pub fn mul_div(self, numerator: u64, denominator: u64) -> Option<Self> {
        if denominator == 0 {
            return None;
        }
        let product = self.0.full_mul(U256::from(numerator));
        #[allow(clippy::arithmetic_side_effects, reason = "Denominator checked non-zero")]
        let quotient = product / U512::from(denominator);
        Some(Target(U256::try_from(quotient).unwrap_or(U256::MAX)))
    }

    /// Drops the precision the declared compact value cannot carry.
    ///
    /// A compact value keeps only its 24-bit mantissa at the position given by
    /// its exponent, so a freshly computed target is masked to that same window
    /// before it is compared with the declared one. A mask shifted past the
    /// 256-bit range keeps nothing.
    pub fn mask_to_precision_of(self, declared: CompactTarget) -> Self {
        let exponent = declared.exponent();
        let window = U256::from(0x00ff_ffffu32);
        let mask = if exponent >= 3 {
            let shift = exponent.saturating_sub(3).saturating_mul(8);
            if shift >= 256 {
                U256::zero()
            } else {
                #[allow(clippy::arithmetic_side_effects, reason = "Shift checked below 256")]
                let mask = window << shift;
                mask
            }
        } else {
            #[allow(clippy::arithmetic_side_effects, reason = "Exponent below 3")]
            let mask = window >> ((3 - exponent) * 8);
            mask
        };
        Target(self.0 & mask)
    }

    /// Converts a compact target representation into a Target instance.
    ///
    /// The compact format stores:
    /// - A 1-byte exponent (8 bits)
    /// - A sign bit
    /// - A 23-bit mantissa
    ///
    /// The actual target is calculated as: `mantissa * 256^(exponent - 3)`
    ///
    /// # Returns
    ///
    /// * `Some(Target)` - The decoded target; a zero mantissa decodes to zero
    /// * `None` - If the value is negative (sign bit set on a non-zero
    ///   mantissa) or would not fit into 256 bits
    ///
    /// # Example
    ///
    /// ```
    /// use altcoin_consensus::pow::{CompactTarget, Target};
    /// use primitive_types::U256;
    ///
    /// let target = Target::from_compact(CompactTarget::new(0x03123456)).unwrap();
    /// assert_eq!(target.as_u256(), U256::from(0x123456));
    /// ```
    pub fn from_compact(compact: CompactTarget) -> Option<Self> {
        let n = compact.0;
        let exponent = n >> 24;
        let mantissa = n & 0x007f_ffff;

        if mantissa == 0 {
            return Some(Target::zero());
        }

        if n & 0x0080_0000 != 0 {
            return None; // Negative
        }

        if exponent > 34
            || (mantissa > 0xff && exponent > 33)
            || (mantissa > 0xffff && exponent > 32)
        {
            return None; // Overflows 256 bits
        }

        let base = U256::from(mantissa);

        #[allow(clippy::arithmetic_side_effects, reason = "Exponent bounded above")]
        let target = if exponent <= 3 {
            base >> (8 * (3 - exponent))
        } else {
            base << (8 * (exponent - 3))
        };

        Some(Target(target))
    }

    /// Converts a target value into its compact representation.
    ///
    /// The conversion follows these rules:
    /// - Zero encodes as the compact value zero.
    /// - The most significant bit position determines the size in bytes needed
    ///   to represent the value.
    /// - The top three bytes form the mantissa; lower bytes are truncated.
    /// - If the high bit of the mantissa is set, the mantissa is shifted right
    ///   by 8 bits and the size incremented, so the value never reads as
    ///   negative.
    pub fn to_compact(self) -> CompactTarget {
        if self.0.is_zero() {
            return CompactTarget(0);
        }

        // At most 32 bytes for a 256-bit value
        #[allow(clippy::cast_possible_truncation, reason = "Bit length is at most 256")]
        let size = self.0.bits().div_ceil(8) as u32;

        #[allow(clippy::arithmetic_side_effects, reason = "Size bounded by 32")]
        let mantissa = if size <= 3 {
            self.0.low_u32() << (8 * (3 - size))
        } else {
            (self.0 >> (8 * (size - 3))).low_u32() & 0x00ff_ffff
        };

        let (mantissa, size) = if mantissa & 0x0080_0000 != 0 {
            (mantissa >> 8, size.saturating_add(1))
        } else {
            (mantissa, size)
        };

        CompactTarget((size << 24) | mantissa)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:064x}", self.0)
    }
}

/// Compact representation of a Target, as used in block headers.
///
/// # Example
///
/// ```
/// use altcoin_consensus::pow::CompactTarget;
///
/// let compact = CompactTarget::new(0x1e0ffff0);
/// assert_eq!(compact.to_consensus(), 0x1e0ffff0);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompactTarget(u32);

impl CompactTarget {
    pub const fn new(target: u32) -> Self {
        CompactTarget(target)
    }

    /// Returns the raw `nBits` value.
    pub const fn to_consensus(self) -> u32 {
        self.0
    }

    /// Size byte of the encoding.
    pub const fn exponent(self) -> u32 {
        self.0 >> 24
    }

    /// Converts the compact value to a floating-point difficulty relative to
    /// `0x1d00ffff`.
    ///
    /// This is the legacy conversion used by Darkcoin's early tolerance check,
    /// kept bit-for-bit: the 24-bit field (sign bit included) divides `0xffff`
    /// and the result is rescaled by powers of 256 until the exponent is 29.
    pub fn to_difficulty(self) -> f64 {
        let mut shift = (self.0 >> 24) & 0xff;
        let mut difficulty = f64::from(0x0000_ffffu32) / f64::from(self.0 & 0x00ff_ffff);
        while shift < 29 {
            difficulty *= 256.0;
            shift = shift.saturating_add(1);
        }
        while shift > 29 {
            difficulty /= 256.0;
            shift = shift.saturating_sub(1);
        }
        difficulty
    }
}

impl From<bitcoin::CompactTarget> for CompactTarget {
    fn from(bits: bitcoin::CompactTarget) -> Self {
        CompactTarget(bits.to_consensus())
    }
}

impl From<CompactTarget> for bitcoin::CompactTarget {
    fn from(bits: CompactTarget) -> Self {
        bitcoin::CompactTarget::from_consensus(bits.0)
    }
}

impl fmt::Display for CompactTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// A 32-byte proof-of-work digest in big-endian order.
///
/// Hash functions emit digests in internal (little-endian) order; the
/// constructors here take care of the reversal so that the numeric value of a
/// `PowHash` is directly comparable with a [`Target`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PowHash([u8; 32]);

impl PowHash {
    /// Wraps a digest that is already big-endian.
    pub const fn from_big_endian(bytes: [u8; 32]) -> Self {
        PowHash(bytes)
    }

    /// Wraps a digest produced in internal byte order.
    pub fn from_internal(mut bytes: [u8; 32]) -> Self {
        bytes.reverse();
        PowHash(bytes)
    }

    /// Returns the big-endian bytes.
    pub const fn to_byte_array(self) -> [u8; 32] {
        self.0
    }

    /// Reads the digest as a 256-bit number.
    pub fn to_target(self) -> Target {
        Target::from_bytes(&self.0)
    }

    /// Returns the digest as a block identity hash (internal byte order).
    pub fn to_block_hash(self) -> bitcoin::BlockHash {
        use bitcoin::hashes::Hash;

        let mut bytes = self.0;
        bytes.reverse();
        bitcoin::BlockHash::from_byte_array(bytes)
    }
}

impl fmt::Display for PowHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PowHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PowHash({self})")
    }
}
