use crate::core::error::{Error, Result};
use num_bigint::BigUint;

/// Default anti-dust/DoS exponent: `1 << 33` shannons (~86 CKB).
pub const DEFAULT_CKB_MIN_MATCH_LOG: u8 = 33;

/// `Ratio` is an exchange rate `ckbScale / udtScale`, or the "empty" (unset) ratio.
///
/// A ratio is either *empty* (both scales zero, meaning the direction it is attached to is
/// disabled) or *populated* (both scales strictly positive). Any other combination cannot be
/// constructed through [`Ratio::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ratio {
    pub ckb_scale: u64,
    pub udt_scale: u64,
}

impl Ratio {
    /// The disabled/unset ratio.
    pub const EMPTY: Ratio = Ratio {
        ckb_scale: 0,
        udt_scale: 0,
    };

    /// Builds a ratio, rejecting half-populated pairs.
    pub fn new(ckb_scale: u64, udt_scale: u64) -> Result<Self> {
        let ratio = Ratio {
            ckb_scale,
            udt_scale,
        };
        if !ratio.is_empty() && !ratio.is_populated() {
            return Err(Error::invalid_entity(
                "Ratio",
                "ckbScale and udtScale must both be zero or both be positive",
            ));
        }
        Ok(ratio)
    }

    pub fn is_empty(&self) -> bool {
        self.ckb_scale == 0 && self.udt_scale == 0
    }

    pub fn is_populated(&self) -> bool {
        self.ckb_scale > 0 && self.udt_scale > 0
    }

    /// Lexicographic comparison in the cross-product domain:
    /// `a < b ⇔ a.ckbScale·b.udtScale < b.ckbScale·a.udtScale`.
    ///
    /// Only meaningful for two populated ratios; fast paths avoid promoting to `BigUint` when one
    /// side of the cross product is trivially equal.
    pub fn cmp_rate(&self, other: &Ratio) -> std::cmp::Ordering {
        if self.udt_scale == other.udt_scale {
            return self.ckb_scale.cmp(&other.ckb_scale);
        }
        if self.ckb_scale == other.ckb_scale {
            return other.udt_scale.cmp(&self.udt_scale);
        }
        let lhs = BigUint::from(self.ckb_scale) * BigUint::from(other.udt_scale);
        let rhs = BigUint::from(other.ckb_scale) * BigUint::from(self.udt_scale);
        lhs.cmp(&rhs)
    }
}

/// `Info` carries both directions' ratios and the anti-dust floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Info {
    pub ckb_to_udt: Ratio,
    pub udt_to_ckb: Ratio,
    pub ckb_min_match_log: u8,
}

impl Info {
    /// Validates: `ckbMinMatchLog` in range, at least one populated ratio, and — when both are
    /// populated — that the round trip cannot extract value.
    pub fn validate(&self) -> Result<()> {
        if self.ckb_min_match_log > 64 {
            return Err(Error::invalid_entity(
                "Info",
                format!(
                    "ckbMinMatchLog {} is out of range [0, 64]",
                    self.ckb_min_match_log
                ),
            ));
        }
        if self.ckb_to_udt.is_empty() && self.udt_to_ckb.is_empty() {
            return Err(Error::invalid_entity(
                "Info",
                "at least one of ckbToUdt/udtToCkb must be populated",
            ));
        }
        if self.ckb_to_udt.is_populated() && self.udt_to_ckb.is_populated() {
            // ckbToUdt.ckbScale * udtToCkb.udtScale >= ckbToUdt.udtScale * udtToCkb.ckbScale
            let lhs = BigUint::from(self.ckb_to_udt.ckb_scale) * BigUint::from(self.udt_to_ckb.udt_scale);
            let rhs = BigUint::from(self.ckb_to_udt.udt_scale) * BigUint::from(self.udt_to_ckb.ckb_scale);
            if lhs < rhs {
                return Err(Error::invalid_entity(
                    "Info",
                    "dual-ratio round trip would extract value",
                ));
            }
        }
        Ok(())
    }

    /// Minimum CKB-equivalent size of any partial match: `1 << ckbMinMatchLog`.
    ///
    /// `ckbMinMatchLog` is validated to be `<= 64`, so the shift never panics; at exactly 64 this
    /// saturates to `u64::MAX` rather than wrapping to zero.
    pub fn ckb_min_match(&self) -> u64 {
        if self.ckb_min_match_log >= 64 {
            u64::MAX
        } else {
            1u64 << self.ckb_min_match_log
        }
    }
}
