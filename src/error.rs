use thiserror::Error;

/// Failures the tracker distinguishes from plain library errors
#[derive(Error, Debug)]
pub enum TrackerError {
    /// The frame source could not be opened or gave no first frame
    #[error("video device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A flow estimator returned outputs that do not line up with its input points
    #[error(
        "flow estimator returned {points} points, {status} status flags and {errors} errors for {expected} input points"
    )]
    FlowLengthMismatch {
        expected: usize,
        points: usize,
        status: usize,
        errors: usize,
    },
}
