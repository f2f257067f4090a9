use tracing::error;

use crate::distribution_store::{EventKey, EventKind};
use crate::types::{MFloat, Mtime};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No trip instance matches a realtime event or an event key.
    #[error("no connection of train {train_id} at station {station_idx} ({kind}) scheduled at {scheduled_time}")]
    ConnectionNotFound {
        train_id: u32,
        station_idx: usize,
        kind: EventKind,
        scheduled_time: Mtime,
    },

    #[error("station {0} does not exist")]
    UnknownStation(usize),

    #[error("route edge {0} does not exist")]
    UnknownRouteEdge(usize),

    #[error("no distribution stored for {0}")]
    MissingDistribution(EventKey),

    #[error("rounding residual {residual} exceeds the tolerated maximum")]
    RoundingResidual { residual: MFloat },

    #[error("rounding residual {residual} would make bucket {bucket} negative")]
    NegativeMass { residual: MFloat, bucket: usize },

    #[error("distribution sum {sum} exceeds the sum {expected} of its input")]
    SumExceeded { sum: MFloat, expected: MFloat },

    #[error("invalid trip: {0}")]
    InvalidTrip(String),

    #[error("invalid journey: {0}")]
    InvalidJourney(&'static str),

    #[error("{path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Invariant violations indicate corrupted input data. They are fatal in debug builds and
/// only logged in release builds, where the caller clamps the offending value.
pub(crate) fn invariant_violation(err: &Error) {
    error!("invariant violation: {}", err);
    debug_assert!(false, "invariant violation: {}", err);
}
