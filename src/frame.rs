use anyhow::{Context as AnyhowContext, Result};
use opencv as cv2;
use cv2::prelude::*;

/// One captured frame after preprocessing
#[derive(Debug)]
pub struct Frame {
    /// colour image that markers are drawn on
    pub image: cv2::core::Mat,
    /// grayscale of `image`, fed to the detector and flow estimator
    pub gray: cv2::core::Mat,
}

impl Frame {
    /// The very first frame is used as is, without denoising.
    pub fn from_first(image: cv2::core::Mat) -> Result<Frame> {
        let gray = to_grayscale(&image)?;
        Ok(Frame { image, gray })
    }

    /// Median blur the input, then derive its grayscale
    pub fn new(input: cv2::core::Mat, blur_kernel: i32) -> Result<Frame> {
        let image = if blur_kernel > 1 {
            let mut blurred = cv2::core::Mat::default();
            cv2::imgproc::median_blur(&input, &mut blurred, blur_kernel)
                .context("median blur failed")?;
            blurred
        } else {
            input
        };
        let gray = to_grayscale(&image)?;
        Ok(Frame { image, gray })
    }
}

pub fn to_grayscale(image: &cv2::core::Mat) -> Result<cv2::core::Mat> {
    let code = match image.channels() {
        1 => return Ok(image.try_clone()?),
        4 => cv2::imgproc::COLOR_BGRA2GRAY,
        _ => cv2::imgproc::COLOR_BGR2GRAY,
    };
    let mut gray = cv2::core::Mat::default();
    cv2::imgproc::cvt_color(image, &mut gray, code, 0).context("grayscale conversion failed")?;
    Ok(gray)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(value: f64) -> cv2::core::Mat {
        cv2::core::Mat::new_rows_cols_with_default(
            24,
            32,
            cv2::core::CV_8UC3,
            cv2::core::Scalar::all(value),
        )
        .unwrap()
    }

    #[test]
    fn test_frame_gray() {
        let frame = Frame::new(uniform(90.), 5).unwrap();
        assert_eq!(frame.gray.channels(), 1);
        assert_eq!(frame.gray.cols(), 32);
        assert_eq!(frame.gray.rows(), 24);
        assert_eq!(*frame.gray.at_2d::<u8>(10, 10).unwrap(), 90);
        assert_eq!(frame.image.channels(), 3);
    }

    #[test]
    fn test_median_blur_removes_speck() {
        let mut image = uniform(0.);
        cv2::imgproc::rectangle(
            &mut image,
            cv2::core::Rect::new(16, 12, 1, 1),
            cv2::core::Scalar::all(255.),
            cv2::imgproc::FILLED,
            cv2::imgproc::LINE_8,
            0,
        )
        .unwrap();
        let first = Frame::from_first(image.try_clone().unwrap()).unwrap();
        assert_eq!(*first.gray.at_2d::<u8>(12, 16).unwrap(), 255);

        let blurred = Frame::new(image, 5).unwrap();
        assert_eq!(*blurred.gray.at_2d::<u8>(12, 16).unwrap(), 0);
    }

    #[test]
    fn test_grayscale_passthrough() {
        let gray = cv2::core::Mat::new_rows_cols_with_default(
            4,
            4,
            cv2::core::CV_8UC1,
            cv2::core::Scalar::all(7.),
        )
        .unwrap();
        let out = to_grayscale(&gray).unwrap();
        assert_eq!(out.channels(), 1);
        assert_eq!(*out.at_2d::<u8>(3, 3).unwrap(), 7);
    }
}
