//! Error taxonomy for the carbon computation engine

use thiserror::Error;

/// Errors surfaced by the computation pipeline.
///
/// Node-level missing inputs with a documented default (replication
/// factor, unknown storage coefficients) are handled locally and never
/// reach this enum; everything else escalates.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid engine parameters (unknown instance types,
    /// malformed catalogs, bad profile wiring).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A resource is missing a value a node requires at a given time
    /// index. Never silently propagated as NaN.
    #[error("resource {resource_id}: missing input `{input}` at time index {time_index}")]
    ComputationInput {
        resource_id: String,
        input: String,
        time_index: usize,
    },

    /// The external evaluator reported a non-success status for a
    /// chunk. Fatal for that chunk; partial results are never merged.
    #[error("evaluator failed to calculate the carbon impact for manifest {manifest_id}")]
    EvaluatorFailure { manifest_id: usize },

    /// Interpolation against the desired grid was impossible.
    #[error("alignment failed: {0}")]
    Alignment(String),

    /// Every pod was dropped during filtering. Distinct from a crash so
    /// callers can report an empty result instead of an error page.
    #[error("no data: {0}")]
    NoData(String),
}

pub type Result<T> = std::result::Result<T, Error>;
