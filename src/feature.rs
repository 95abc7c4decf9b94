use anyhow::Result;

use crate::error::TrackerError;
use crate::my_types::*;

/// Output of one flow estimation, parallel to the reference points it was
/// computed from: `points[i]`, `status[i]` and `errors[i]` all belong to the
/// i-th reference point.
#[derive(Clone, Debug, Default)]
pub struct FlowResult {
    pub points: FeatureSet,
    pub status: Vec<bool>,
    pub errors: Vec<f32>,
}

/// Displacement of one feature between the reference frame and the new frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Motion {
    pub from: Vector2d,
    pub to: Vector2d,
    pub tracked: bool,
    pub error: f32,
}

impl Motion {
    pub fn displacement(&self) -> Vector2d {
        self.to - self.from
    }
}

impl FlowResult {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn tracked_count(&self) -> usize {
        self.status.iter().filter(|s| **s).count()
    }

    /// Check that every output sequence has one entry per reference point
    pub fn check_len(&self, expected: usize) -> Result<(), TrackerError> {
        if self.points.len() != expected
            || self.status.len() != expected
            || self.errors.len() != expected
        {
            return Err(TrackerError::FlowLengthMismatch {
                expected,
                points: self.points.len(),
                status: self.status.len(),
                errors: self.errors.len(),
            });
        }
        Ok(())
    }

    /// Pair each reference point with its estimate, by index.
    pub fn motions(&self, reference: &[Vector2d]) -> Result<Vec<Motion>> {
        self.check_len(reference.len())?;
        Ok(reference
            .iter()
            .zip(self.points.iter())
            .zip(self.status.iter().zip(self.errors.iter()))
            .map(|((from, to), (tracked, error))| Motion {
                from: *from,
                to: *to,
                tracked: *tracked,
                error: *error,
            })
            .collect())
    }
}
