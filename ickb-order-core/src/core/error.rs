use thiserror::Error;

/// Errors raised by explicit, validating APIs.
///
/// Discovery never surfaces these for a single malformed cell — it skips the cell instead (see
/// [`crate::core::discovery`]); this enum is for the APIs that are expected to validate their
/// input and fail loudly when it is wrong.
#[derive(Debug, Error)]
pub enum Error {
    /// The raw cell payload did not parse as `OrderData`.
    #[error("failed to decode order cell data: {0}")]
    Decode(String),

    /// A parsed entity failed semantic validation.
    #[error("invalid {entity}: {reason}")]
    InvalidEntity {
        /// Name of the entity that failed validation (`"Info"`, `"MasterRef"`, ...).
        entity: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A caller-supplied allowance was below the order's minimum match size.
    #[error("allowance {allowance} is below the minimum match size {min_match}")]
    InfeasibleMatch {
        /// The allowance that was supplied.
        allowance: u128,
        /// The order's minimum match size.
        min_match: u128,
    },

    /// A descendant cell failed the anti-confusion validation against its origin.
    #[error("invalid descendant: {0}")]
    InvalidDescendant(String),

    /// The order cannot be matched in the requested direction.
    #[error("order is not matchable in the requested direction")]
    IncompatibleOrder,

    /// An intermediate computation exceeded its declared integer width.
    #[error("arithmetic overflow while computing {0}")]
    Arithmetic(&'static str),

    /// The blockchain client reported a failure while servicing a discovery request.
    #[error("blockchain client error: {0}")]
    Client(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub(crate) fn invalid_entity(entity: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidEntity {
            entity,
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
