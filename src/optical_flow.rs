use anyhow::{Context as AnyhowContext, Result};
use opencv as cv2;
use cv2::prelude::*;

use crate::feature::FlowResult;
use crate::my_types::*;

/// Pyramidal Lucas-Kanade parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowParams {
    /// side of the square search window
    pub win_size: i32,
    /// deepest pyramid level, 0 means no pyramid
    pub max_level: i32,
    /// iterations per level before giving up
    pub max_iters: i32,
    /// stop once the position update is below this many pixels
    pub epsilon: f64,
}

pub trait FlowEstimator {
    /// Advance `points` from `prev` into `next`. The result has exactly one
    /// point, status and error per input point, in input order.
    fn estimate(
        &mut self,
        prev: &cv2::core::Mat,
        next: &cv2::core::Mat,
        points: &[Vector2d],
        params: &FlowParams,
    ) -> Result<FlowResult>;
}

/// Estimator backed by `cv::calcOpticalFlowPyrLK`
pub struct PyrLkFlow {
    prev_points: cv2::core::Vector<cv2::core::Point2f>,
    next_points: cv2::core::Vector<cv2::core::Point2f>,
    status: cv2::core::Vector<u8>,
    err: cv2::core::Vector<f32>,
}

impl PyrLkFlow {
    pub fn new() -> Self {
        PyrLkFlow {
            prev_points: cv2::core::Vector::new(),
            next_points: cv2::core::Vector::new(),
            status: cv2::core::Vector::new(),
            err: cv2::core::Vector::new(),
        }
    }
}

impl Default for PyrLkFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn term_criteria(params: &FlowParams) -> Result<cv2::core::TermCriteria> {
    let kind = cv2::core::TermCriteria_Type::COUNT as i32 | cv2::core::TermCriteria_Type::EPS as i32;
    Ok(cv2::core::TermCriteria::new(kind, params.max_iters, params.epsilon)?)
}

impl FlowEstimator for PyrLkFlow {
    fn estimate(
        &mut self,
        prev: &cv2::core::Mat,
        next: &cv2::core::Mat,
        points: &[Vector2d],
        params: &FlowParams,
    ) -> Result<FlowResult> {
        if points.is_empty() {
            return Ok(FlowResult::default());
        }

        self.prev_points.clear();
        for p in points {
            self.prev_points
                .push(cv2::core::Point2f::new(p.x as f32, p.y as f32));
        }
        self.next_points.clear();
        self.status.clear();
        self.err.clear();

        cv2::video::calc_optical_flow_pyr_lk(
            prev,
            next,
            &self.prev_points,
            &mut self.next_points,
            &mut self.status,
            &mut self.err,
            cv2::core::Size::new(params.win_size, params.win_size),
            params.max_level,
            term_criteria(params)?,
            0,
            1e-4,
        )
        .context("optical flow estimation failed")?;

        let result = FlowResult {
            points: self
                .next_points
                .iter()
                .map(|p| Vector2d::new(p.x as f64, p.y as f64))
                .collect(),
            status: self.status.iter().map(|s| s != 0).collect(),
            errors: self.err.iter().collect(),
        };
        result.check_len(points.len())?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DetectorParams, FeatureDetector, ShiTomasiDetector};
    use crate::frame::Frame;
    use crate::video::{FrameRead, FrameSource, SyntheticSource};

    fn read_frame(source: &mut SyntheticSource) -> cv2::core::Mat {
        match source.read().unwrap() {
            FrameRead::Frame(frame) => frame,
            _ => panic!("synthetic source gave no frame"),
        }
    }

    fn params() -> FlowParams {
        FlowParams {
            win_size: 30,
            max_level: 4,
            max_iters: 10,
            epsilon: 0.03,
        }
    }

    #[test]
    fn test_flow() {
        let mut source = SyntheticSource::new(640, 480, 40, (200, 200), (10, 0));
        let frame0 = Frame::from_first(read_frame(&mut source)).unwrap();
        let frame1 = Frame::new(read_frame(&mut source), 5).unwrap();

        let mut detector = ShiTomasiDetector::new();
        let points = detector
            .detect(
                &frame0.gray,
                &DetectorParams {
                    max_corners: 200,
                    quality_level: 0.01,
                    min_distance: 10.,
                    block_size: 7,
                },
            )
            .unwrap();
        assert!(!points.is_empty());

        let mut flow = PyrLkFlow::new();
        let result = flow
            .estimate(&frame0.gray, &frame1.gray, &points, &params())
            .unwrap();
        assert_eq!(result.len(), points.len());

        let motions = result.motions(&points).unwrap();
        let good = motions
            .iter()
            .filter(|m| m.tracked && (m.displacement() - Vector2d::new(10., 0.)).norm() < 1.)
            .count();
        assert!(good >= 1, "no point moved by 10 px: {:?}", motions);
    }

    #[test]
    fn test_flow_without_points() {
        let mut source = SyntheticSource::new(320, 240, 40, (100, 100), (10, 0));
        let frame0 = Frame::from_first(read_frame(&mut source)).unwrap();
        let frame1 = Frame::from_first(read_frame(&mut source)).unwrap();

        let mut flow = PyrLkFlow::new();
        let result = flow
            .estimate(&frame0.gray, &frame1.gray, &[], &params())
            .unwrap();
        assert!(result.is_empty());
        assert!(result.status.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_static_scene() {
        let mut source = SyntheticSource::new(320, 240, 40, (100, 100), (0, 0));
        let frame0 = Frame::from_first(read_frame(&mut source)).unwrap();
        let frame1 = Frame::from_first(read_frame(&mut source)).unwrap();

        let points = vec![Vector2d::new(100., 100.), Vector2d::new(139., 139.)];
        let mut flow = PyrLkFlow::new();
        let result = flow
            .estimate(&frame0.gray, &frame1.gray, &points, &params())
            .unwrap();
        for motion in result.motions(&points).unwrap() {
            assert!(motion.tracked);
            assert!(motion.displacement().norm() < 0.1);
        }
    }
}
