use cv2::prelude::*;
use opencv as cv2;

use anyhow::Result;
use ndarray as nd;

use crate::feature::Motion;
use crate::my_types::*;

/// Current position of a tracked point (BGR red)
pub const NEW_POINT_COLOR: (f64, f64, f64) = (0., 0., 255.);
/// Position in the reference frame (BGR blue)
pub const OLD_POINT_COLOR: (f64, f64, f64) = (255., 0., 0.);
/// Motion trail segments (BGR green)
pub const TRAIL_COLOR: (f64, f64, f64) = (0., 255., 0.);

const MARKER_RADIUS: i32 = 5;
const TRAIL_THICKNESS: i32 = 2;

fn scalar(color: (f64, f64, f64)) -> cv2::core::Scalar {
    cv2::core::Scalar::new(color.0, color.1, color.2, 0.)
}

fn to_cv_point(p: &Vector2d) -> cv2::core::Point {
    cv2::core::Point {
        x: p.x.round() as i32,
        y: p.y.round() as i32,
    }
}

pub trait AsArray {
    fn try_as_array(&self) -> Result<nd::Array3<u8>>;
}

impl AsArray for cv2::core::Mat {
    fn try_as_array(&self) -> Result<nd::Array3<u8>> {
        let bytes = self.data_bytes()?;
        let size = self.size()?;
        let channels = self.channels() as usize;
        let a = nd::ArrayView3::from_shape(
            (size.height as usize, size.width as usize, channels),
            bytes,
        )?;
        Ok(a.to_owned())
    }
}

/// A black image shaped like `like`
pub fn zeros_like(like: &cv2::core::Mat) -> Result<cv2::core::Mat> {
    Ok(cv2::core::Mat::new_size_with_default(
        like.size()?,
        like.typ(),
        cv2::core::Scalar::all(0.),
    )?)
}

/// Mark the old and new location of each motion on `image`
pub fn draw_markers(image: &mut cv2::core::Mat, motions: &[Motion]) -> Result<()> {
    for motion in motions {
        cv2::imgproc::circle(
            image,
            to_cv_point(&motion.to),
            MARKER_RADIUS,
            scalar(NEW_POINT_COLOR),
            cv2::imgproc::FILLED,
            cv2::imgproc::LINE_8,
            0,
        )?;
        cv2::imgproc::circle(
            image,
            to_cv_point(&motion.from),
            MARKER_RADIUS,
            scalar(OLD_POINT_COLOR),
            cv2::imgproc::FILLED,
            cv2::imgproc::LINE_8,
            0,
        )?;
    }
    Ok(())
}

/// Accumulates motion segments over a few frames
pub struct TrailBuffer {
    image: cv2::core::Mat,
}

impl TrailBuffer {
    pub fn new(like: &cv2::core::Mat) -> Result<Self> {
        Ok(TrailBuffer {
            image: zeros_like(like)?,
        })
    }

    pub fn image(&self) -> &cv2::core::Mat {
        &self.image
    }

    pub fn draw(&mut self, motions: &[Motion]) -> Result<()> {
        for motion in motions {
            cv2::imgproc::line(
                &mut self.image,
                to_cv_point(&motion.from),
                to_cv_point(&motion.to),
                scalar(TRAIL_COLOR),
                TRAIL_THICKNESS,
                cv2::imgproc::LINE_8,
                0,
            )?;
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.image = zeros_like(&self.image)?;
        Ok(())
    }

    pub fn is_blank(&self) -> Result<bool> {
        if self.image.empty() {
            return Ok(true);
        }
        let norm = cv2::core::norm(&self.image, cv2::core::NORM_INF, &cv2::core::Mat::default())?;
        Ok(norm == 0.)
    }
}

/// The image handed to the presenter
pub enum Composite {
    Ready(cv2::core::Mat),
    /// Nothing to show this iteration
    Empty,
}

/// Saturating sum of the annotated frame and the trail, optionally mirrored
/// left to right. Frames that do not match the trail buffer in size and type
/// give `Composite::Empty`.
pub fn compose(frame: &cv2::core::Mat, trail: &cv2::core::Mat, mirror: bool) -> Result<Composite> {
    if frame.empty()
        || trail.empty()
        || frame.size()? != trail.size()?
        || frame.typ() != trail.typ()
    {
        return Ok(Composite::Empty);
    }

    let mut sum = cv2::core::Mat::default();
    cv2::core::add(frame, trail, &mut sum, &cv2::core::Mat::default(), -1)?;
    let image = if mirror {
        let mut flipped = cv2::core::Mat::default();
        cv2::core::flip(&sum, &mut flipped, 1)?;
        flipped
    } else {
        sum
    };

    if image.empty() {
        return Ok(Composite::Empty);
    }
    Ok(Composite::Ready(image))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(rows: i32, cols: i32) -> cv2::core::Mat {
        cv2::core::Mat::new_rows_cols_with_default(
            rows,
            cols,
            cv2::core::CV_8UC3,
            cv2::core::Scalar::all(0.),
        )
        .unwrap()
    }

    fn motion(from: (f64, f64), to: (f64, f64)) -> Motion {
        Motion {
            from: Vector2d::new(from.0, from.1),
            to: Vector2d::new(to.0, to.1),
            tracked: true,
            error: 0.,
        }
    }

    #[test]
    fn test_trail_draw_and_clear() {
        let frame = blank(60, 80);
        let mut trail = TrailBuffer::new(&frame).unwrap();
        assert!(trail.is_blank().unwrap());

        trail.draw(&[motion((20., 30.), (30., 30.))]).unwrap();
        assert!(!trail.is_blank().unwrap());
        let a = trail.image().try_as_array().unwrap();
        for x in 20..=30 {
            assert_eq!(a[[30, x, 0]], 0);
            assert_eq!(a[[30, x, 1]], 255);
            assert_eq!(a[[30, x, 2]], 0);
        }
        // far from the segment
        assert_eq!(a[[5, 5, 1]], 0);

        trail.clear().unwrap();
        assert!(trail.is_blank().unwrap());
        assert_eq!(trail.image().size().unwrap(), frame.size().unwrap());
        assert_eq!(trail.image().typ(), frame.typ());
    }

    #[test]
    fn test_markers() {
        let mut frame = blank(60, 80);
        draw_markers(&mut frame, &[motion((10., 10.), (50., 40.))]).unwrap();
        let a = frame.try_as_array().unwrap();
        // old point is blue, new point is red (BGR)
        assert_eq!([a[[10, 10, 0]], a[[10, 10, 1]], a[[10, 10, 2]]], [255, 0, 0]);
        assert_eq!([a[[40, 50, 0]], a[[40, 50, 1]], a[[40, 50, 2]]], [0, 0, 255]);
        assert_eq!([a[[40, 54, 0]], a[[40, 54, 1]], a[[40, 54, 2]]], [0, 0, 255]);
        assert_eq!([a[[40, 57, 0]], a[[40, 57, 1]], a[[40, 57, 2]]], [0, 0, 0]);
    }

    #[test]
    fn test_compose_mirrors() {
        let mut frame = blank(10, 16);
        cv2::imgproc::rectangle(
            &mut frame,
            cv2::core::Rect::new(3, 4, 1, 1),
            cv2::core::Scalar::new(10., 20., 30., 0.),
            cv2::imgproc::FILLED,
            cv2::imgproc::LINE_8,
            0,
        )
        .unwrap();
        let mut trail = TrailBuffer::new(&frame).unwrap();
        trail.draw(&[motion((10., 7.), (13., 7.))]).unwrap();

        let plain = match compose(&frame, trail.image(), false).unwrap() {
            Composite::Ready(image) => image.try_as_array().unwrap(),
            Composite::Empty => panic!("composite should not be empty"),
        };
        let mirrored = match compose(&frame, trail.image(), true).unwrap() {
            Composite::Ready(image) => image.try_as_array().unwrap(),
            Composite::Empty => panic!("composite should not be empty"),
        };

        let width = 16;
        for r in 0..10 {
            for c in 0..width {
                for ch in 0..3 {
                    assert_eq!(plain[[r, c, ch]], mirrored[[r, width - 1 - c, ch]]);
                }
            }
        }
        assert_eq!(mirrored[[4, width - 1 - 3, 2]], 30);
        assert_eq!(plain[[7, 12, 1]], 255);
    }

    #[test]
    fn test_compose_saturates() {
        let frame = cv2::core::Mat::new_rows_cols_with_default(
            4,
            4,
            cv2::core::CV_8UC3,
            cv2::core::Scalar::all(200.),
        )
        .unwrap();
        let trail = frame.try_clone().unwrap();
        match compose(&frame, &trail, true).unwrap() {
            Composite::Ready(image) => {
                let a = image.try_as_array().unwrap();
                assert!(a.iter().all(|v| *v == 255));
            }
            Composite::Empty => panic!("composite should not be empty"),
        }
    }

    #[test]
    fn test_compose_mismatch_is_empty() {
        let frame = blank(10, 16);
        let trail = blank(12, 16);
        assert!(matches!(compose(&frame, &trail, true).unwrap(), Composite::Empty));
        assert!(matches!(
            compose(&cv2::core::Mat::default(), &trail, true).unwrap(),
            Composite::Empty
        ));
    }
}
