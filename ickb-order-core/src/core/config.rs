use crate::core::data::FixedPoint;
use crate::core::ratio::DEFAULT_CKB_MIN_MATCH_LOG;
use serde::{Deserialize, Serialize};

/// `1000 CKB`, expressed in shannons.
pub const DEFAULT_CKB_ALLOWANCE_STEP: FixedPoint = 1000 * 100_000_000;

/// The library's tunable defaults, grouped so a caller can override any subset without having to
/// re-derive the rest. `(De)serialize`-able so an application can load it from its own
/// CLI/config-file layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Fee numerator, out of `fee_base`. Zero disables fee charging in `convert`.
    pub fee: u64,
    /// Fee denominator.
    pub fee_base: u64,
    /// `log2` of the anti-dust/DoS floor on any partial match, in CKB-equivalent shannons.
    pub ckb_min_match_log: u8,
    /// Shannons charged per 1000 bytes of estimated transaction weight, used to derive
    /// `ckb_mining_fee` in `best_match`.
    pub fee_rate: u64,
    /// The per-step allowance chunk used by `sequential_matcher`.
    pub ckb_allowance_step: FixedPoint,
    /// Page size used when paginating `find_cells_on_chain` queries in discovery.
    pub find_cells_limit: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            fee: 0,
            fee_base: 100_000,
            ckb_min_match_log: DEFAULT_CKB_MIN_MATCH_LOG,
            fee_rate: 1000,
            ckb_allowance_step: DEFAULT_CKB_ALLOWANCE_STEP,
            find_cells_limit: 400,
        }
    }
}
