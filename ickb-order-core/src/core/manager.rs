use crate::core::cell::{occupied_capacity, OrderCell};
use crate::core::config::MatcherConfig;
use crate::core::data::{Cell, CellOutput, FixedPoint, MasterRef, OrderData, Script};
use crate::core::error::{Error, Result};
use crate::core::matcher::{non_decreasing, Match, OrderMatcher};
use crate::core::ratio::{Info, Ratio};
use crate::core::tx::TransactionSkeleton;
use num_bigint::BigUint;
use tracing::{debug, trace};

fn to_fixed_point(value: BigUint, what: &'static str) -> Result<FixedPoint> {
    value.try_into().map_err(|_| Error::Arithmetic(what))
}

/// The result of [`convert`]: a fee-adjusted conversion preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub converted_amount: FixedPoint,
    pub ckb_fee: FixedPoint,
    pub info: Info,
}

/// Previews the effect of minting an order at `midpoint` with the given `{fee, fee_base}`,
/// converting `ckb_value` into the UDT side when `is_ckb2udt`, or the reverse otherwise.
///
/// The fee is charged by scaling the ratio the submitter actually gets, not by subtracting from
/// the converted amount directly: the submitter's effective rate is `(fee_base - fee)/fee_base`
/// worse than `midpoint`, so a larger `fee` always strictly worsens `converted_amount` for a
/// fixed input.
pub fn convert(
    is_ckb2udt: bool,
    midpoint: Ratio,
    ckb_value: FixedPoint,
    udt_value: FixedPoint,
    config: &MatcherConfig,
) -> Result<Conversion> {
    if !midpoint.is_populated() {
        return Err(Error::invalid_entity(
            "Ratio",
            "convert requires a populated midpoint ratio",
        ));
    }
    if config.fee > config.fee_base {
        return Err(Error::invalid_entity(
            "MatcherConfig",
            "fee cannot exceed fee_base",
        ));
    }

    let fee_base = BigUint::from(config.fee_base);
    let fee = BigUint::from(config.fee);
    let (in_amount, in_scale, out_scale) = if is_ckb2udt {
        (ckb_value, midpoint.ckb_scale, midpoint.udt_scale)
    } else {
        (udt_value, midpoint.udt_scale, midpoint.ckb_scale)
    };

    // adjusted out_scale = out_scale * (fee_base - fee) / fee_base, rounded down: this makes the
    // submitter's conversion strictly worse, never better, for any fee > 0.
    let adjusted_out_scale_num = BigUint::from(out_scale) * (&fee_base - &fee);
    let adjusted_out_scale = &adjusted_out_scale_num / &fee_base;

    let converted_amount = if in_amount == 0 || adjusted_out_scale == BigUint::from(0u32) {
        0
    } else {
        let numerator = BigUint::from(in_amount) * &adjusted_out_scale;
        let quotient = &numerator / BigUint::from(in_scale);
        let remainder = &numerator % BigUint::from(in_scale);
        let rounded = if remainder == BigUint::from(0u32) {
            quotient
        } else {
            quotient + 1u32
        };
        to_fixed_point(rounded, "convert: convertedAmount")?
    };

    let ckb_fee = if in_amount == 0 || config.fee == 0 {
        0
    } else {
        // midpoint-priced difference between what the submitter would get at midpoint and what
        // the adjusted rate actually gives, expressed in CKB.
        let at_midpoint = if is_ckb2udt {
            non_decreasing(midpoint.ckb_scale, midpoint.udt_scale, ckb_value, 0, 0)?
        } else {
            non_decreasing(midpoint.udt_scale, midpoint.ckb_scale, udt_value, 0, 0)?
        };
        if at_midpoint <= converted_amount {
            0
        } else {
            let diff = at_midpoint - converted_amount;
            if is_ckb2udt {
                // diff is in UDT units; price it in CKB at midpoint.
                non_decreasing(midpoint.udt_scale, midpoint.ckb_scale, diff, 0, 0)?
            } else {
                diff
            }
        }
    };

    let info = if is_ckb2udt {
        Info {
            ckb_to_udt: Ratio::new(in_scale, adjusted_out_scale_to_u64(&adjusted_out_scale)?)?,
            udt_to_ckb: Ratio::EMPTY,
            ckb_min_match_log: config.ckb_min_match_log,
        }
    } else {
        Info {
            ckb_to_udt: Ratio::EMPTY,
            udt_to_ckb: Ratio::new(adjusted_out_scale_to_u64(&adjusted_out_scale)?, in_scale)?,
            ckb_min_match_log: config.ckb_min_match_log,
        }
    };

    Ok(Conversion {
        converted_amount,
        ckb_fee,
        info,
    })
}

fn adjusted_out_scale_to_u64(value: &BigUint) -> Result<u64> {
    value
        .clone()
        .try_into()
        .map_err(|_| Error::Arithmetic("convert: adjusted scale"))
}

/// Mints a fresh order: the order cell, then the master witness cell at the next output index.
///
/// `master_lock` is the caller-chosen owner lock for the witness cell; the master's capacity is
/// computed from its own occupied size once it has been appended (demonstrating
/// `outputs_mut`-style post-hoc capacity fixup, since the occupied size depends on the concrete
/// script the caller passed in).
pub fn mint(
    tx: &mut impl TransactionSkeleton,
    order_script: Script,
    udt_script: Script,
    master_lock: Script,
    ckb_value: FixedPoint,
    udt_value: FixedPoint,
    info: Info,
) -> Result<()> {
    info.validate()?;

    let order_data = OrderData {
        udt_amount: udt_value,
        master: MasterRef::Relative { distance: 1 },
        info,
    };
    let order_bytes = order_data.encode();

    let probe = Cell {
        out_point: crate::core::data::OutPoint {
            tx_hash: crate::core::data::Byte32::ZERO,
            index: 0,
        },
        output: CellOutput {
            capacity: 0,
            lock: order_script.clone(),
            type_: Some(udt_script.clone()),
        },
        data: order_bytes.clone(),
    };
    let ckb_occupied = occupied_capacity(&probe);
    let order_index = tx.add_output(
        CellOutput {
            capacity: ckb_occupied + ckb_value,
            lock: order_script,
            type_: Some(udt_script),
        },
        order_bytes,
    );

    let master_probe = Cell {
        out_point: probe.out_point,
        output: CellOutput {
            capacity: 0,
            lock: master_lock.clone(),
            type_: None,
        },
        data: Vec::new(),
    };
    let master_occupied = occupied_capacity(&master_probe);
    let master_index = tx.add_output(
        CellOutput {
            capacity: master_occupied,
            lock: master_lock,
            type_: None,
        },
        Vec::new(),
    );
    // the +1 distance is load-bearing: it makes the master's own resolved outpoint point to
    // itself, which is how a freshly-minted order's witness is recognized.
    debug_assert_eq!(master_index, order_index + 1);
    tx.outputs_mut()[master_index].capacity = master_occupied;

    debug!(target: "ickb_order_core::manager", order_index, master_index, "minted order");
    Ok(())
}

/// One leg of a batch `add_match`: the order consumed and its new on-chain amounts.
#[derive(Debug, Clone, Copy)]
pub struct MatchedLeg<'a> {
    pub order: &'a OrderCell,
    pub ckb_out: FixedPoint,
    pub udt_out: FixedPoint,
}

/// Consumes each leg's original order cell as an input and produces a successor output with the
/// matched amounts, converting the master reference from relative to absolute so any later
/// descendant keeps pointing at the same witness cell.
pub fn add_match(tx: &mut impl TransactionSkeleton, legs: &[MatchedLeg<'_>]) -> Result<()> {
    for leg in legs {
        let master = leg.order.master_out_point()?;
        tx.add_input(leg.order.out_point());

        let successor = OrderData {
            udt_amount: leg.udt_out,
            master: MasterRef::Absolute { out_point: master },
            info: leg.order.data.info,
        };
        let index = tx.add_output(
            CellOutput {
                capacity: leg.ckb_out,
                lock: leg.order.cell.output.lock.clone(),
                type_: leg.order.cell.output.type_.clone(),
            },
            successor.encode(),
        );
        trace!(target: "ickb_order_core::manager", index, "added match leg");
    }
    Ok(())
}

/// A group eligible for melting: an order's master witness cell plus the order cell itself.
#[derive(Debug, Clone, Copy)]
pub struct MeltGroup<'a> {
    pub master: &'a Cell,
    pub order: &'a OrderCell,
    /// `true` once the order can no longer be matched in either direction.
    pub is_fulfilled: bool,
}

/// Consumes each group's order cell and master cell as inputs. When `fulfilled_only` is set,
/// groups with `is_fulfilled == false` are left untouched.
pub fn melt(tx: &mut impl TransactionSkeleton, groups: &[MeltGroup<'_>], fulfilled_only: bool) -> Result<()> {
    for group in groups {
        if fulfilled_only && !group.is_fulfilled {
            continue;
        }
        tx.add_input(group.order.out_point());
        tx.add_input(group.master.out_point);
        debug!(target: "ickb_order_core::manager", "melted order");
    }
    Ok(())
}

/// Splits `total` into `n` chunks differing by at most one, the first `remainder` chunks getting
/// the larger size, per the sequential matcher's chunk-boundary table.
fn partition_chunks(total: FixedPoint, step: FixedPoint) -> Vec<FixedPoint> {
    if total == 0 {
        return Vec::new();
    }
    let n = total.div_ceil(step);
    let q = total / n;
    let r = total % n;
    let mut chunks = Vec::with_capacity(n as usize);
    for i in 0..n {
        chunks.push(if i < r { q + 1 } else { q });
    }
    chunks
}

/// A stateful, pull-only iterator over a pool's cumulative fair-distribution match in one
/// direction: each item is the cumulative [`Match`] after one more chunk has been applied.
///
/// Matchers are precomputed and sorted by `real_ratio` descending at construction; a matcher
/// whose chunk allowance still falls short of its own `b_min_match` is abandoned outright (its
/// rate is worse than every matcher ahead of it in the sort, so no smaller allowance helps any
/// matcher still to come).
pub struct SequentialMatcher {
    matchers: Vec<OrderMatcher>,
    matcher_index: usize,
    chunks: Vec<FixedPoint>,
    chunk_index: usize,
    cum_allowance: FixedPoint,
    /// The sum of every matcher fully committed before the one currently in progress.
    committed: Match,
    cumulative: Match,
    done: bool,
}

impl SequentialMatcher {
    pub fn new(orders: &[OrderCell], is_ckb2udt: bool, allowance_step: FixedPoint, ckb_mining_fee: FixedPoint) -> Self {
        let mut matchers: Vec<OrderMatcher> = orders
            .iter()
            .filter_map(|order| OrderMatcher::new(order, is_ckb2udt, ckb_mining_fee))
            .collect();
        matchers.sort_by(|a, b| b.real_ratio.partial_cmp(&a.real_ratio).unwrap_or(std::cmp::Ordering::Equal));

        let chunks = matchers
            .first()
            .map(|m| partition_chunks(m.b_max_match(), allowance_step))
            .unwrap_or_default();

        SequentialMatcher {
            matchers,
            matcher_index: 0,
            chunks,
            chunk_index: 0,
            cum_allowance: 0,
            committed: Match::empty(),
            cumulative: Match::empty(),
            done: false,
        }
    }

    /// Moves on to the next matcher. `commit` is `true` when the matcher being left behind
    /// finished its chunks successfully (its contribution becomes part of every later cumulative
    /// match) and `false` when it is abandoned (arithmetic error, or its first chunk already fell
    /// below its own `b_min_match`) — in which case it must leave no trace.
    fn advance_to_next_matcher(&mut self, allowance_step: FixedPoint, commit: bool) {
        if commit {
            self.committed = self.cumulative.clone();
        } else {
            self.cumulative = self.committed.clone();
        }
        self.matcher_index += 1;
        self.chunk_index = 0;
        self.cum_allowance = 0;
        self.chunks = match self.matchers.get(self.matcher_index) {
            Some(m) => partition_chunks(m.b_max_match(), allowance_step),
            None => Vec::new(),
        };
    }
}

/// Sums two matches' deltas and concatenates their partials, `base`'s first.
fn combine_matches(base: &Match, delta: &Match) -> Match {
    let mut partials = base.partials.clone();
    partials.extend(delta.partials.iter().cloned());
    Match {
        ckb_delta: base.ckb_delta + delta.ckb_delta,
        udt_delta: base.udt_delta + delta.udt_delta,
        partials,
    }
}

/// Matches a pool in one direction, fairly distributing each order's fill across `allowance_step`
/// -sized chunks, yielding the strictly cumulative [`Match`] after each step.
pub struct SequentialMatcherIter<'a> {
    inner: &'a mut SequentialMatcher,
    allowance_step: FixedPoint,
    yielded_initial: bool,
}

impl SequentialMatcher {
    pub fn iter(&mut self, allowance_step: FixedPoint) -> SequentialMatcherIter<'_> {
        SequentialMatcherIter {
            inner: self,
            allowance_step,
            yielded_initial: false,
        }
    }
}

impl Iterator for SequentialMatcherIter<'_> {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        if !self.yielded_initial {
            self.yielded_initial = true;
            return Some(self.inner.cumulative.clone());
        }

        loop {
            if self.inner.done {
                return None;
            }
            let Some(matcher) = self.inner.matchers.get(self.inner.matcher_index) else {
                self.inner.done = true;
                return None;
            };

            let Some(&chunk) = self.inner.chunks.get(self.inner.chunk_index) else {
                self.inner.advance_to_next_matcher(self.allowance_step, true);
                continue;
            };

            self.inner.cum_allowance += chunk;
            self.inner.chunk_index += 1;

            let result = match matcher.match_with(self.inner.cum_allowance) {
                Ok(m) => m,
                Err(_) => {
                    trace!(target: "ickb_order_core::manager", "sequential matcher abandoned order on arithmetic error");
                    self.inner.advance_to_next_matcher(self.allowance_step, false);
                    continue;
                }
            };

            if result.is_empty() {
                trace!(target: "ickb_order_core::manager", ratio = matcher.real_ratio, "sequential matcher abandoned order below min match");
                self.inner.advance_to_next_matcher(self.allowance_step, false);
                continue;
            }

            self.inner.cumulative = combine_matches(&self.inner.committed, &result);
            return Some(self.inner.cumulative.clone());
        }
    }
}

/// A 2-element look-ahead buffer over a [`SequentialMatcherIter`]'s future cumulative matches, so
/// `best_match` can reconcile two independently-monotone streams against a shared budget without
/// enumerating either stream in full.
///
/// `buffer[k]` (`k` in `0..len()`) is the absolute cumulative match the stream would be at after
/// advancing `k + 1` more steps past whatever has already been committed; committing to index `k`
/// means adopting `buffer[k]` as the new baseline and discarding `buffer[0..=k]`. The iterator's
/// always-empty first yield is consumed once at construction and never buffered: it carries no
/// information beyond what an un-advanced baseline already is.
struct LookaheadBuffer {
    pulled: Vec<Match>,
}

impl LookaheadBuffer {
    fn new(iter: &mut SequentialMatcherIter<'_>) -> Self {
        iter.next(); // discard the guaranteed-empty initial cumulative
        let mut pulled = Vec::with_capacity(2);
        for _ in 0..2 {
            match iter.next() {
                Some(m) => pulled.push(m),
                None => break,
            }
        }
        LookaheadBuffer { pulled }
    }

    fn get(&self, i: usize) -> Option<&Match> {
        self.pulled.get(i)
    }

    fn len(&self) -> usize {
        self.pulled.len()
    }

    /// Consumes the first `n` buffered items and refills up to 2.
    fn advance(&mut self, n: usize, iter: &mut SequentialMatcherIter<'_>) {
        if n == 0 {
            return;
        }
        self.pulled.drain(0..n.min(self.pulled.len()));
        while self.pulled.len() < 2 {
            match iter.next() {
                Some(m) => self.pulled.push(m),
                None => break,
            }
        }
    }
}

/// A caller-supplied budget `best_match` must not push negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub ckb_value: i128,
    pub udt_value: i128,
}

/// Options overriding `best_match`'s fee-rate and step-size defaults.
#[derive(Debug, Clone, Copy)]
pub struct BestMatchOptions {
    pub fee_rate: u64,
    pub ckb_allowance_step: FixedPoint,
}

impl Default for BestMatchOptions {
    fn default() -> Self {
        BestMatchOptions {
            fee_rate: 1000,
            ckb_allowance_step: crate::core::config::DEFAULT_CKB_ALLOWANCE_STEP,
        }
    }
}

/// Finds the best combined match across both directions of `order_pool` against `allowance`,
/// reconciling two independently-sorted, monotone streams with a 2-wide look-ahead rather than
/// enumerating their full Cartesian product.
///
/// The returned `Match.partials` is the concatenation of every order either stream actually
/// touched, each tagged with its outpoint, so the caller can drive `add_match` with it directly.
/// The mining fee is charged exactly once per partial — `ckbMiningFee * partials.len()` — against
/// the CKB side of `allowance`; `OrderMatcher::match_with` itself reports gross deltas.
pub fn best_match(
    order_pool: &[OrderCell],
    allowance: Allowance,
    exchange_rate: Ratio,
    options: BestMatchOptions,
) -> Result<Match> {
    if !exchange_rate.is_populated() {
        return Err(Error::invalid_entity(
            "Ratio",
            "best_match requires a populated exchange rate",
        ));
    }

    let order_size = order_pool
        .first()
        .map(|o| occupied_capacity(&o.cell))
        .unwrap_or(0);
    let ckb_mining_fee = ((36 + order_size) * options.fee_rate as FixedPoint).div_ceil(1000);

    let udt_allowance_step = (options.ckb_allowance_step * exchange_rate.ckb_scale as FixedPoint)
        .div_ceil(exchange_rate.udt_scale as FixedPoint);

    // the ckb2udt stream's receiving (`b`) side is UDT, so its fair-distribution step must be
    // UDT-denominated; the udt2ckb stream's `b` side is CKB, so it uses the step directly.
    let mut ckb2udt = SequentialMatcher::new(order_pool, true, udt_allowance_step, ckb_mining_fee);
    let mut udt2ckb = SequentialMatcher::new(order_pool, false, options.ckb_allowance_step, ckb_mining_fee);
    let mut ckb2udt_iter = ckb2udt.iter(udt_allowance_step);
    let mut udt2ckb_iter = udt2ckb.iter(options.ckb_allowance_step);

    let mut ckb2udt_buf = LookaheadBuffer::new(&mut ckb2udt_iter);
    let mut udt2ckb_buf = LookaheadBuffer::new(&mut udt2ckb_iter);

    // the committed cumulative match for each stream, not yet advanced into the lookahead window
    let mut ckb2udt_base = Match::empty();
    let mut udt2ckb_base = Match::empty();

    let mut best = Match::empty();
    let mut best_gain = i128::MIN;

    loop {
        let mut chosen: Option<(usize, usize, Match, i128)> = None;

        // i/j = 0 means "stay at the current base"; i/j = k > 0 means "adopt buffer[k-1]"
        for i in 0..=ckb2udt_buf.len() {
            let c2u = if i == 0 { ckb2udt_base.clone() } else { ckb2udt_buf.get(i - 1).unwrap().clone() };
            for j in 0..=udt2ckb_buf.len() {
                let u2c = if j == 0 { udt2ckb_base.clone() } else { udt2ckb_buf.get(j - 1).unwrap().clone() };

                // fee is charged exactly once here, per order actually touched across both
                // streams — `match_with` reports gross deltas, so this is the sole place the
                // mining fee enters the CKB budget (§8 invariant 8).
                let partials_count = (c2u.partials.len() + u2c.partials.len()) as i128;
                let ckb_delta = c2u.ckb_delta + u2c.ckb_delta;
                let udt_delta = c2u.udt_delta + u2c.udt_delta;
                let ckb_fee = ckb_mining_fee as i128 * partials_count;

                let ckb_ok = allowance.ckb_value + ckb_delta - ckb_fee >= 0;
                let udt_ok = allowance.udt_value + udt_delta >= 0;
                if !ckb_ok || !udt_ok {
                    continue;
                }

                let gain = ckb_delta * exchange_rate.ckb_scale as i128 + udt_delta * exchange_rate.udt_scale as i128;
                let mut partials = c2u.partials.clone();
                partials.extend(u2c.partials.iter().cloned());
                let combined = Match {
                    ckb_delta,
                    udt_delta,
                    partials,
                };

                let better = match &chosen {
                    None => true,
                    Some((_, _, _, g)) => gain > *g,
                };
                if better {
                    chosen = Some((i, j, combined, gain));
                }
            }
        }

        let Some((i, j, combined, gain)) = chosen else {
            break;
        };

        if gain > best_gain {
            best_gain = gain;
            best = combined;
        }

        if i == 0 && j == 0 {
            break;
        }

        if i > 0 {
            ckb2udt_base = ckb2udt_buf.get(i - 1).unwrap().clone();
        }
        if j > 0 {
            udt2ckb_base = udt2ckb_buf.get(j - 1).unwrap().clone();
        }
        ckb2udt_buf.advance(i, &mut ckb2udt_iter);
        udt2ckb_buf.advance(j, &mut udt2ckb_iter);
    }

    Ok(best)
}
