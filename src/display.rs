use anyhow::{Context as AnyhowContext, Result};
use opencv as cv2;
use cv2::prelude::*;
use rerun::{RecordingStream, RecordingStreamBuilder};

use crate::visualization::AsArray;

/// Surface the composed images are shown on
pub trait Presenter {
    fn show(&mut self, image: &cv2::core::Mat) -> Result<()>;

    /// Wait up to `delay_ms` for a key press
    fn poll_key(&mut self, delay_ms: i32) -> Result<Option<i32>>;

    fn close(&mut self) -> Result<()>;
}

/// Whether a key code returned by a presenter asks to quit
pub fn is_quit_key(key: i32, quit: char) -> bool {
    key & 0xFF == quit as i32
}

/// OpenCV highgui window
pub struct HighguiWindow {
    name: String,
}

impl HighguiWindow {
    pub fn new(name: &str) -> Result<Self> {
        cv2::highgui::named_window(name, cv2::highgui::WINDOW_AUTOSIZE)
            .with_context(|| format!("cannot create window {name}"))?;
        Ok(HighguiWindow {
            name: name.to_string(),
        })
    }
}

impl Presenter for HighguiWindow {
    fn show(&mut self, image: &cv2::core::Mat) -> Result<()> {
        cv2::highgui::imshow(&self.name, image)?;
        Ok(())
    }

    fn poll_key(&mut self, delay_ms: i32) -> Result<Option<i32>> {
        let key = cv2::highgui::wait_key(delay_ms)?;
        Ok(if key < 0 { None } else { Some(key) })
    }

    fn close(&mut self) -> Result<()> {
        cv2::highgui::destroy_window(&self.name)?;
        Ok(())
    }
}

/// Logs every composite into a rerun recording. There is no keyboard, so
/// the run only ends with the source.
pub struct RerunRecorder {
    recorder: RecordingStream,
    entity: String,
    frame_number: i64,
}

impl RerunRecorder {
    pub fn new(path: &str) -> Result<Self> {
        let recorder = RecordingStreamBuilder::new("sparse-flow")
            .save(path)
            .with_context(|| format!("cannot create recording {path}"))?;
        Ok(RerunRecorder {
            recorder,
            entity: "video/flow".to_string(),
            frame_number: 0,
        })
    }
}

impl Presenter for RerunRecorder {
    fn show(&mut self, image: &cv2::core::Mat) -> Result<()> {
        let code = match image.channels() {
            1 => cv2::imgproc::COLOR_GRAY2RGB,
            _ => cv2::imgproc::COLOR_BGR2RGB,
        };
        let mut rgb = cv2::core::Mat::default();
        cv2::imgproc::cvt_color(image, &mut rgb, code, 0)?;

        self.recorder.set_time_sequence("frame", self.frame_number);
        self.recorder
            .log(self.entity.as_str(), &rerun::Image::try_from(rgb.try_as_array()?)?)?;
        self.frame_number += 1;
        Ok(())
    }

    fn poll_key(&mut self, _delay_ms: i32) -> Result<Option<i32>> {
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.recorder.flush_blocking();
        Ok(())
    }
}
