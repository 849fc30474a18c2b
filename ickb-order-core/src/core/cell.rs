use crate::core::data::{Cell, FixedPoint, OrderData, OutPoint, Script};
use crate::core::error::{Error, Result};
use crate::core::ratio::Info;
use num_bigint::BigUint;

/// Shannons charged per byte of on-chain cell storage (1 CKB == 10^8 shannons == 1 byte of
/// capacity, by the host chain's own rule).
pub const CKB_SHANNONS_PER_BYTE: FixedPoint = 100_000_000;

/// Size, in bytes, of a script with the given `args` length: 32-byte code hash + 1-byte hash
/// type tag + args.
fn script_occupied_bytes(script: &Script) -> usize {
    32 + 1 + script.args.len()
}

/// The minimal capacity (in shannons) the given cell must hold to exist on-chain: the byte size
/// of its `capacity` field, scripts, and data, each priced at [`CKB_SHANNONS_PER_BYTE`].
pub fn occupied_capacity(cell: &Cell) -> FixedPoint {
    let mut bytes = 8usize; // the capacity field itself
    bytes += script_occupied_bytes(&cell.output.lock);
    bytes += cell
        .output
        .type_
        .as_ref()
        .map(script_occupied_bytes)
        .unwrap_or(0);
    bytes += cell.data.len();
    bytes as FixedPoint * CKB_SHANNONS_PER_BYTE
}

fn to_fixed_point(value: BigUint, what: &'static str) -> Result<FixedPoint> {
    value.try_into().map_err(|_| Error::Arithmetic(what))
}

/// A decoded, immutable view of a live order cell, with its derived scalars precomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCell {
    pub cell: Cell,
    pub data: OrderData,
    pub ckb_occupied: FixedPoint,
    pub abs_total: FixedPoint,
    pub abs_progress: FixedPoint,
}

impl OrderCell {
    pub fn out_point(&self) -> OutPoint {
        self.cell.out_point
    }

    /// Builds an `OrderCell` from a raw cell and its already-decoded payload.
    pub fn new(cell: Cell, data: OrderData) -> Result<Self> {
        data.validate()?;
        let ckb_occupied = occupied_capacity(&cell);
        if cell.output.capacity < ckb_occupied {
            return Err(Error::invalid_entity(
                "OrderCell",
                "capacity is below the cell's own occupied capacity",
            ));
        }
        let ckb_unoccupied = cell.output.capacity - ckb_occupied;

        let (abs_total, abs_progress) = derived_scalars(ckb_unoccupied, data.udt_amount, &data.info)?;

        Ok(OrderCell {
            cell,
            data,
            ckb_occupied,
            abs_total,
            abs_progress,
        })
    }

    /// Decodes `cell.data` and builds the `OrderCell`. Used by discovery, which silently skips
    /// cells that fail this conversion rather than propagating `Error`.
    pub fn try_from_cell(cell: Cell) -> Result<Self> {
        let data = OrderData::decode(&cell.data)?;
        OrderCell::new(cell, data)
    }

    pub fn ckb_unoccupied(&self) -> FixedPoint {
        self.cell.output.capacity - self.ckb_occupied
    }

    pub fn is_ckb2udt_matchable(&self) -> bool {
        self.data.info.ckb_to_udt.is_populated() && self.ckb_unoccupied() > 0
    }

    pub fn is_udt2ckb_matchable(&self) -> bool {
        self.data.info.udt_to_ckb.is_populated() && self.data.udt_amount > 0
    }

    /// Resolves this order's master outpoint.
    pub fn master_out_point(&self) -> Result<OutPoint> {
        self.data.master.resolve(&self.cell.out_point)
    }

    /// Validates that `descendant` is a legal, non-degrading evolution of `self` (the origin),
    /// per the anti-confusion rule: same outpoint, or same `info` with non-regressing progress.
    pub fn validate_descendant(&self, descendant: &OrderCell) -> Result<()> {
        if self.cell.out_point == descendant.cell.out_point {
            return Ok(());
        }
        if self.cell.output.lock != descendant.cell.output.lock {
            return Err(Error::InvalidDescendant("lock script mismatch".into()));
        }
        if self.cell.output.type_ != descendant.cell.output.type_ {
            return Err(Error::InvalidDescendant("type script mismatch".into()));
        }
        if self.master_out_point()? != descendant.master_out_point()? {
            return Err(Error::InvalidDescendant("master outpoint mismatch".into()));
        }
        if self.data.info != descendant.data.info {
            return Err(Error::InvalidDescendant("info mismatch".into()));
        }
        if self.abs_total > descendant.abs_total {
            return Err(Error::InvalidDescendant("absTotal decreased".into()));
        }
        if self.abs_progress > descendant.abs_progress {
            return Err(Error::InvalidDescendant("absProgress decreased".into()));
        }
        Ok(())
    }

    /// Picks the live descendant out of `candidates`: the one with the largest `absProgress`,
    /// preferring a non-mint cell on ties. Returns `None` if no candidate validates against
    /// `self` (treated as the origin).
    pub fn resolve<'a>(&self, candidates: &'a [OrderCell]) -> Option<&'a OrderCell> {
        let mut best: Option<&OrderCell> = None;
        for candidate in candidates {
            if self.validate_descendant(candidate).is_err() {
                continue;
            }
            best = Some(match best {
                None => candidate,
                Some(current) => {
                    if candidate.abs_progress > current.abs_progress {
                        candidate
                    } else if candidate.abs_progress == current.abs_progress
                        && current.data.is_mint()
                        && !candidate.data.is_mint()
                    {
                        candidate
                    } else {
                        current
                    }
                }
            });
        }
        best
    }
}

/// Computes `(absTotal, absProgress)`, using arbitrary-precision integers
/// for the cross-weighted intermediates and narrowing back to `FixedPoint` only once the final
/// value is known to fit.
fn derived_scalars(k: FixedPoint, u: FixedPoint, info: &Info) -> Result<(FixedPoint, FixedPoint)> {
    let r = info.ckb_to_udt;
    let r_prime = info.udt_to_ckb;

    let ckb2udt_value = if r.is_populated() {
        BigUint::from(k) * BigUint::from(r.ckb_scale) + BigUint::from(u) * BigUint::from(r.udt_scale)
    } else {
        BigUint::from(0u32)
    };
    let udt2ckb_value = if r_prime.is_populated() {
        BigUint::from(k) * BigUint::from(r_prime.ckb_scale)
            + BigUint::from(u) * BigUint::from(r_prime.udt_scale)
    } else {
        BigUint::from(0u32)
    };

    let abs_total = if r.is_populated() && !r_prime.is_populated() {
        ckb2udt_value.clone()
    } else if r_prime.is_populated() && !r.is_populated() {
        udt2ckb_value.clone()
    } else {
        let weighted = ckb2udt_value.clone() * BigUint::from(r_prime.ckb_scale) * BigUint::from(r_prime.udt_scale)
            + udt2ckb_value.clone() * BigUint::from(r.ckb_scale) * BigUint::from(r.udt_scale);
        weighted >> 1u32
    };

    let abs_progress = if r.is_populated() && r_prime.is_populated() {
        abs_total.clone()
    } else if r.is_populated() {
        BigUint::from(u) * BigUint::from(r.udt_scale)
    } else {
        BigUint::from(k) * BigUint::from(r_prime.ckb_scale)
    };

    Ok((
        to_fixed_point(abs_total, "absTotal")?,
        to_fixed_point(abs_progress, "absProgress")?,
    ))
}

/// The triple `(master, order, origin)` used by discovery and by confusion-attack resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderGroup {
    /// The witness cell; carries no order data itself.
    pub master: Cell,
    /// The current live descendant, selected by [`OrderCell::resolve`].
    pub order: OrderCell,
    /// The originally-minted order (used as the trust anchor for descendant validation).
    pub origin: OrderCell,
}

impl OrderGroup {
    /// Validates jointly: `origin` must validate `order` as a legal descendant, and both must
    /// resolve to the same master outpoint as `master`'s own outpoint.
    pub fn new(master: Cell, order: OrderCell, origin: OrderCell) -> Result<Self> {
        origin.validate_descendant(&order)?;
        let resolved = origin.master_out_point()?;
        if resolved != master.out_point {
            return Err(Error::InvalidDescendant(
                "origin's master reference does not resolve to the supplied master cell".into(),
            ));
        }
        Ok(OrderGroup {
            master,
            order,
            origin,
        })
    }

    /// `true` once the live order can no longer be matched in either direction — the on-chain
    /// equivalent of "fully filled".
    pub fn is_fulfilled(&self) -> bool {
        !self.order.is_ckb2udt_matchable() && !self.order.is_udt2ckb_matchable()
    }
}
