use crate::core::cell::OrderCell;
use crate::core::data::{FixedPoint, Num, OutPoint};
use crate::core::error::Error;
use num_bigint::{BigInt, BigUint};
use num_traits::{Signed, Zero};

fn to_fixed_point(value: BigUint, what: &'static str) -> Result<FixedPoint, Error> {
    value.try_into().map_err(|_| Error::Arithmetic(what))
}

/// The non-decreasing-value arithmetic core.
///
/// Given a match from `(aIn, bIn)` to `(aOut, bOut)` at scales `(aScale, bScale)`, the cell's
/// weighted value must never decrease:
///
/// ```text
/// aScale·aOut + bScale·bOut  >=  aScale·aIn + bScale·bIn
/// ```
///
/// This returns the **minimum** `bOut` satisfying that, given `aOut`. `aOut` need not be `<=
/// aIn`: `OrderMatcher::match_with`'s partial-fill branch calls this with the `a`/`b` roles
/// swapped (computing the giving side from a known receiving side), which makes the "aOut"
/// argument the side that *increases*. The computation is carried out in arbitrary-precision
/// signed integers (intermediate products of two `u64` scales and a `u128` amount can exceed 192
/// bits, and `aIn - aOut` can be negative under the swapped call) and only narrowed back to
/// `FixedPoint` at the end, once the result is known to be non-negative.
pub fn non_decreasing(
    a_scale: Num,
    b_scale: Num,
    a_in: FixedPoint,
    b_in: FixedPoint,
    a_out: FixedPoint,
) -> Result<FixedPoint, Error> {
    if a_scale == 0 || b_scale == 0 {
        return Err(Error::Arithmetic("non_decreasing: scale must be positive"));
    }

    let a_scale = BigInt::from(a_scale);
    let b_scale = BigInt::from(b_scale);
    let a_consumed = BigInt::from(a_in) - BigInt::from(a_out);
    let b_in = BigInt::from(b_in);

    // ceil((aScale*(aIn-aOut) + bScale*bIn) / bScale), rounding toward +infinity regardless of
    // the numerator's sign: truncating division already rounds a negative numerator toward
    // +infinity (it rounds toward zero), so only a non-negative numerator with a remainder needs
    // the `+1` bump.
    let numerator = &a_scale * a_consumed + &b_scale * b_in;
    let quotient = &numerator / &b_scale;
    let remainder = &numerator % &b_scale;
    let b_out = if remainder.is_zero() || numerator.is_negative() {
        quotient
    } else {
        quotient + 1
    };

    if b_out.is_negative() {
        return Err(Error::Arithmetic("non_decreasing: bOut would be negative"));
    }
    let (_, magnitude) = b_out.into_parts();
    to_fixed_point(magnitude, "non_decreasing: bOut")
}

/// A fill computed by an [`OrderMatcher`] (or accumulated across several, by
/// `SequentialMatcherIter`/`best_match`), reported from the caller's perspective (the party
/// supplying the allowance, not the order itself): `ckb_delta`/`udt_delta` are positive when the
/// caller *receives* that asset and negative when the caller *gives it up* to the order. Deltas
/// are gross — neither side has any mining fee netted in; the fee is charged exactly once, by the
/// caller, as `ckbMiningFee * partials.len()`.
///
/// `partials` carries one entry per order actually touched, in the order the orders were
/// committed, so a caller can enumerate exactly which orders (and their resulting on-chain
/// amounts) to hand to [`crate::core::manager::add_match`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Match {
    pub ckb_delta: i128,
    pub udt_delta: i128,
    pub partials: Vec<Partial>,
}

impl Match {
    pub fn empty() -> Self {
        Match::default()
    }

    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }
}

/// One order's contribution to a match: which order, and its new on-chain amounts after the fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partial {
    pub order: OutPoint,
    pub ckb_out: FixedPoint,
    pub udt_out: FixedPoint,
}

/// Binds one order, a direction, and a mining-fee charge, and exposes [`OrderMatcher::match_with`]
/// to compute the maximum legal (partial or full) fill for a given counter-asset allowance.
#[derive(Debug, Clone, Copy)]
pub struct OrderMatcher {
    pub is_ckb2udt: bool,
    order_out_point: OutPoint,
    a_scale: Num,
    b_scale: Num,
    a_in: FixedPoint,
    b_in: FixedPoint,
    a_min: FixedPoint,
    b_min_match: FixedPoint,
    a_mining_fee: FixedPoint,
    b_mining_fee: FixedPoint,
    b_max_out: FixedPoint,
    b_max_match: FixedPoint,
    /// Effective rate; a real number used only for ranking matchers against each other.
    pub real_ratio: f64,
}

impl OrderMatcher {
    /// Builds a matcher for `order` in the given direction, charging `ckb_mining_fee` (in
    /// shannons) on the CKB side. Returns `None` (construction fails silently) if the order
    /// cannot yield a positive-rate match in this direction.
    pub fn new(order: &OrderCell, is_ckb2udt: bool, ckb_mining_fee: FixedPoint) -> Option<Self> {
        let info = &order.data.info;
        let (ratio, a_in, b_in, a_min, a_mining_fee, b_mining_fee) = if is_ckb2udt {
            let ratio = info.ckb_to_udt;
            (
                ratio,
                order.ckb_unoccupied(),
                order.data.udt_amount,
                0, // aMin is relative to ckb_unoccupied; the occupied floor is already excluded
                ckb_mining_fee,
                0,
            )
        } else {
            let ratio = info.udt_to_ckb;
            (
                ratio,
                order.data.udt_amount,
                order.ckb_unoccupied(),
                0,
                0,
                ckb_mining_fee,
            )
        };

        if ratio.ckb_scale == 0 || ratio.udt_scale == 0 {
            return None;
        }
        let (a_scale, b_scale) = if is_ckb2udt {
            (ratio.ckb_scale, ratio.udt_scale)
        } else {
            (ratio.udt_scale, ratio.ckb_scale)
        };

        if a_in <= a_min + a_mining_fee {
            return None;
        }

        let b_max_out = non_decreasing(a_scale, b_scale, a_in, b_in, a_min).ok()?;
        let b_max_match = b_max_out.checked_sub(b_in)?;

        let b_min_match_raw = if is_ckb2udt {
            // convert the CKB-denominated floor into b (UDT) units via the active ratio
            let min = info.ckb_min_match();
            non_decreasing(a_scale, b_scale, min as FixedPoint, 0, 0).ok()?
        } else {
            info.ckb_min_match() as FixedPoint
        };
        let b_min_match = b_min_match_raw.min(b_max_match);

        let denom = b_max_match.checked_add(b_mining_fee)?;
        if denom == 0 {
            return None;
        }
        let numerator = a_in.checked_sub(a_min)?.checked_sub(a_mining_fee)?;
        let real_ratio = numerator as f64 / denom as f64;
        if real_ratio <= 0.0 {
            return None;
        }

        Some(OrderMatcher {
            is_ckb2udt,
            order_out_point: order.out_point(),
            a_scale,
            b_scale,
            a_in,
            b_in,
            a_min,
            b_min_match,
            a_mining_fee,
            b_mining_fee,
            b_max_out,
            b_max_match,
            real_ratio,
        })
    }

    pub fn b_max_match(&self) -> FixedPoint {
        self.b_max_match
    }

    pub fn b_min_match(&self) -> FixedPoint {
        self.b_min_match
    }

    /// Computes the fill for a given allowance on the receiving (`b`) side.
    ///
    /// - Below `bMinMatch`: an empty match (the allowance cannot clear the anti-dust floor).
    /// - At or above `bMaxMatch`: a full fill.
    /// - Otherwise: the minimum-legal partial fill at exactly `bAllowance`.
    ///
    /// The reported deltas are gross: the per-partial `ckbMiningFee` is not netted in here (it
    /// only shapes `real_ratio`, for ranking). The caller — `best_match`, which alone knows how
    /// many partials a combined match ultimately carries — charges it exactly once, as
    /// `ckbMiningFee * partials.len()`.
    pub fn match_with(&self, b_allowance: FixedPoint) -> Result<Match, Error> {
        if b_allowance < self.b_min_match {
            return Ok(Match::empty());
        }

        let (a_out, b_out) = if b_allowance >= self.b_max_match {
            (self.a_min, self.b_max_out)
        } else {
            let b_out = self.b_in + b_allowance;
            let a_out = non_decreasing(self.b_scale, self.a_scale, self.b_in, self.a_in, b_out)?;
            (a_out, b_out)
        };

        let a_consumed = (self.a_in - a_out) as i128;
        let b_consumed = (b_out - self.b_in) as i128;

        let (ckb_delta, udt_delta) = if self.is_ckb2udt {
            (a_consumed, -b_consumed)
        } else {
            (-b_consumed, a_consumed)
        };

        Ok(Match {
            ckb_delta,
            udt_delta,
            partials: vec![Partial {
                order: self.order_out_point,
                ckb_out: if self.is_ckb2udt { a_out } else { b_out },
                udt_out: if self.is_ckb2udt { b_out } else { a_out },
            }],
        })
    }
}

/// Matches `order` directly against a caller-supplied allowance, raising rather than silently
/// abandoning: unlike `sequential_matcher`/`best_match` (which test feasibility before ever
/// calling a matcher and simply skip orders that don't pan out), a direct caller asking for one
/// specific fill wants to know *why* it didn't happen.
///
/// Returns `Err(Error::IncompatibleOrder)` if `order` cannot be matched in this direction at all
/// (construction fails, mirroring [`OrderMatcher::new`]'s silent-`None` construction policy turned
/// into a raised error for this entry point), or `Err(Error::InfeasibleMatch)` if `allowance` is
/// below the order's minimum match size.
pub fn match_ckb2udt(order: &OrderCell, udt_allowance: FixedPoint, ckb_mining_fee: FixedPoint) -> Result<Match, Error> {
    match_direct(order, true, udt_allowance, ckb_mining_fee)
}

/// The `udtToCkb` counterpart of [`match_ckb2udt`]: `ckb_allowance` is the allowance on the
/// receiving (CKB) side.
pub fn match_udt2ckb(order: &OrderCell, ckb_allowance: FixedPoint, ckb_mining_fee: FixedPoint) -> Result<Match, Error> {
    match_direct(order, false, ckb_allowance, ckb_mining_fee)
}

fn match_direct(
    order: &OrderCell,
    is_ckb2udt: bool,
    allowance: FixedPoint,
    ckb_mining_fee: FixedPoint,
) -> Result<Match, Error> {
    let matcher = OrderMatcher::new(order, is_ckb2udt, ckb_mining_fee).ok_or(Error::IncompatibleOrder)?;
    let result = matcher.match_with(allowance)?;
    if result.is_empty() {
        return Err(Error::InfeasibleMatch {
            allowance,
            min_match: matcher.b_min_match(),
        });
    }
    Ok(result)
}
