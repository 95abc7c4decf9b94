use anyhow::{Context as AnyhowContext, Result};
use log::warn;
use opencv as cv2;
use cv2::prelude::*;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::TrackerError;

/// Outcome of pulling one frame from a source
pub enum FrameRead {
    Frame(cv2::core::Mat),
    /// The source produced a frame without pixels
    Empty,
    EndOfStream,
}

/// Pull-based supplier of frames
pub trait FrameSource {
    fn read(&mut self) -> Result<FrameRead>;

    /// Free the underlying device. Called once by the owner on shutdown.
    fn release(&mut self) -> Result<()>;

    /// Number of frames the source will produce, when known up front
    fn frame_count(&self) -> Option<u64> {
        None
    }
}

/// Camera or video file read through OpenCV videoio
pub struct VideoInput {
    capture: cv2::videoio::VideoCapture,
    name: String,
}

impl VideoInput {
    pub fn camera(index: i32) -> Result<VideoInput> {
        let name = format!("camera {index}");
        let capture = cv2::videoio::VideoCapture::new(index, cv2::videoio::CAP_ANY)
            .map_err(|e| TrackerError::DeviceUnavailable(format!("{name}: {e}")))?;
        Self::opened(capture, name)
    }

    pub fn from_file(path: &str) -> Result<VideoInput> {
        let name = path.to_string();
        let capture = cv2::videoio::VideoCapture::from_file(path, cv2::videoio::CAP_ANY)
            .map_err(|e| TrackerError::DeviceUnavailable(format!("{name}: {e}")))?;
        Self::opened(capture, name)
    }

    fn opened(capture: cv2::videoio::VideoCapture, name: String) -> Result<VideoInput> {
        let is_opened = capture
            .is_opened()
            .map_err(|e| TrackerError::DeviceUnavailable(format!("{name}: {e}")))?;
        if !is_opened {
            return Err(TrackerError::DeviceUnavailable(format!("cannot open {name}")).into());
        }
        Ok(VideoInput { capture, name })
    }
}

impl FrameSource for VideoInput {
    fn read(&mut self) -> Result<FrameRead> {
        let mut frame = cv2::core::Mat::default();
        let ok = self
            .capture
            .read(&mut frame)
            .with_context(|| format!("failed to read from {}", self.name))?;
        if !ok {
            return Ok(FrameRead::EndOfStream);
        }
        if frame.empty() {
            warn!("{} produced an empty frame", self.name);
            return Ok(FrameRead::Empty);
        }
        Ok(FrameRead::Frame(frame))
    }

    fn release(&mut self) -> Result<()> {
        self.capture
            .release()
            .with_context(|| format!("failed to release {}", self.name))
    }

    fn frame_count(&self) -> Option<u64> {
        match self.capture.get(cv2::videoio::CAP_PROP_FRAME_COUNT) {
            Ok(count) if count > 0. => Some(count as u64),
            _ => None,
        }
    }
}

/// A bright square sliding over a dark background.
///
/// Frame `k` shows the square with its top-left corner at
/// `origin + k * velocity`, wrapped around the frame borders. Optional
/// salt-and-pepper noise gives the median blur something to remove.
pub struct SyntheticSource {
    width: i32,
    height: i32,
    square: i32,
    origin: (i32, i32),
    velocity: (i32, i32),
    remaining: Option<usize>,
    noise: f64,
    rng: Xoshiro256PlusPlus,
    index: i32,
}

impl SyntheticSource {
    pub fn new(
        width: i32,
        height: i32,
        square: i32,
        origin: (i32, i32),
        velocity: (i32, i32),
    ) -> Self {
        SyntheticSource {
            width,
            height,
            square,
            origin,
            velocity,
            remaining: None,
            noise: 0.,
            rng: Xoshiro256PlusPlus::seed_from_u64(0),
            index: 0,
        }
    }

    /// Stop after `count` frames
    pub fn with_frame_limit(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }

    pub fn with_noise(mut self, fraction: f64, seed: u64) -> Self {
        self.noise = fraction;
        self.rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        self
    }

    fn render(&mut self) -> Result<cv2::core::Mat> {
        let mut frame = cv2::core::Mat::new_rows_cols_with_default(
            self.height,
            self.width,
            cv2::core::CV_8UC3,
            cv2::core::Scalar::all(20.),
        )?;

        let x = (self.origin.0 + self.index * self.velocity.0).rem_euclid(self.width);
        let y = (self.origin.1 + self.index * self.velocity.1).rem_euclid(self.height);
        cv2::imgproc::rectangle(
            &mut frame,
            cv2::core::Rect::new(x, y, self.square, self.square),
            cv2::core::Scalar::new(230., 230., 230., 0.),
            cv2::imgproc::FILLED,
            cv2::imgproc::LINE_8,
            0,
        )?;

        if self.noise > 0. {
            let bytes = frame.data_bytes_mut()?;
            for pixel in bytes.chunks_exact_mut(3) {
                if self.rng.gen::<f64>() < self.noise {
                    let value = if self.rng.gen_bool(0.5) { 255 } else { 0 };
                    pixel.fill(value);
                }
            }
        }
        Ok(frame)
    }
}

impl FrameSource for SyntheticSource {
    fn read(&mut self) -> Result<FrameRead> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(FrameRead::EndOfStream);
            }
            *remaining -= 1;
        }
        let frame = self.render()?;
        self.index += 1;
        Ok(FrameRead::Frame(frame))
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }

    fn frame_count(&self) -> Option<u64> {
        self.remaining.map(|r| r as u64 + self.index as u64)
    }
}
