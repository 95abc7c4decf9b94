use anyhow::Result;
use opencv as cv2;
use cv2::prelude::*;
use tracing::{debug, info, warn, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::config::Config;
use crate::detector::FeatureDetector;
use crate::display::{is_quit_key, Presenter};
use crate::error::TrackerError;
use crate::feature::{FlowResult, Motion};
use crate::frame::Frame;
use crate::my_types::*;
use crate::optical_flow::FlowEstimator;
use crate::video::{FrameRead, FrameSource};
use crate::visualization::{compose, draw_markers, Composite, TrailBuffer};

const QUIT_KEY: char = 'q';
const KEY_DELAY_MS: i32 = 1;

/// What happened to one frame pair
#[derive(Debug)]
pub struct FrameReport {
    pub frame_number: usize,
    /// every reference point paired with its estimate, in reference order
    pub motions: Vec<Motion>,
    pub tracked: usize,
    /// motions that got markers and a trail segment
    pub drawn: usize,
    pub trail_cleared: bool,
    pub presented: bool,
}

#[derive(Debug)]
pub enum StepOutcome {
    Continue(FrameReport),
    /// The source produced an empty frame, nothing was processed
    Skipped,
    Quit,
    EndOfStream,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Termination {
    EndOfStream,
    Quit,
}

#[derive(Debug)]
pub struct RunSummary {
    pub frames: usize,
    pub presented: usize,
    pub termination: Termination,
}

/// Tracks features between consecutive frames and draws their motion.
///
/// Each step reads a frame, advances the reference points into it, draws
/// markers and trail segments, shows the mirrored composite and then
/// re-detects features on the new frame, which becomes the next reference.
pub struct Tracker {
    source: Box<dyn FrameSource>,
    detector: Box<dyn FeatureDetector>,
    optical_flow: Box<dyn FlowEstimator>,
    config: Config,
    /// grayscale of the previous frame
    reference: cv2::core::Mat,
    points: FeatureSet,
    trail: TrailBuffer,
    // Frames since the last trail reset. Bumped after a successful read, which
    // matches bumping before the read since an empty read is skipped anyway.
    step: usize,
    frame_number: usize,
    released: bool,
}

impl Tracker {
    /// Read the first frame and seed the reference points. The source is
    /// released again if this fails.
    pub fn new(
        mut source: Box<dyn FrameSource>,
        mut detector: Box<dyn FeatureDetector>,
        optical_flow: Box<dyn FlowEstimator>,
        config: Config,
    ) -> Result<Tracker> {
        let first = match Self::initialize(source.as_mut(), detector.as_mut(), &config) {
            Ok(first) => first,
            Err(err) => {
                if let Err(release_err) = source.release() {
                    warn!("failed to release source: {release_err:#}");
                }
                return Err(err);
            }
        };
        let (frame, points, trail) = first;
        info!(
            "first frame {}x{}, {} features",
            frame.gray.cols(),
            frame.gray.rows(),
            points.len()
        );

        Ok(Tracker {
            source,
            detector,
            optical_flow,
            config,
            reference: frame.gray,
            points,
            trail,
            step: 0,
            frame_number: 0,
            released: false,
        })
    }

    fn initialize(
        source: &mut dyn FrameSource,
        detector: &mut dyn FeatureDetector,
        config: &Config,
    ) -> Result<(Frame, FeatureSet, TrailBuffer)> {
        let image = match source.read() {
            Ok(FrameRead::Frame(image)) => image,
            Ok(FrameRead::Empty) => {
                return Err(TrackerError::DeviceUnavailable("first frame is empty".into()).into())
            }
            Ok(FrameRead::EndOfStream) => {
                return Err(TrackerError::DeviceUnavailable("no first frame".into()).into())
            }
            Err(err) => return Err(TrackerError::DeviceUnavailable(format!("{err:#}")).into()),
        };
        let frame = Frame::from_first(image)?;
        let points = detector.detect(&frame.gray, &config.initial_detector_params())?;
        let trail = TrailBuffer::new(&frame.image)?;
        Ok((frame, points, trail))
    }

    pub fn trail(&self) -> &TrailBuffer {
        &self.trail
    }

    pub fn reference_points(&self) -> &[Vector2d] {
        &self.points
    }

    /// Frames processed since the trail was last cleared
    pub fn iteration(&self) -> usize {
        self.step
    }

    /// Frame pairs the source will still deliver, when known. The first
    /// frame was consumed by `new`.
    pub fn pair_count_hint(&self) -> Option<u64> {
        self.source
            .frame_count()
            .map(|count| count.saturating_sub(1))
    }

    /// Whether `frame` can be paired with the reference frame and drawn over
    /// the trail buffer
    fn matches_reference(&self, frame: &Frame) -> Result<bool> {
        Ok(frame.gray.size()? == self.reference.size()?
            && frame.gray.typ() == self.reference.typ()
            && frame.image.size()? == self.trail.image().size()?
            && frame.image.typ() == self.trail.image().typ())
    }

    /// Process one frame pair
    pub fn step(&mut self, presenter: &mut dyn Presenter) -> Result<StepOutcome> {
        let input = match self.source.read()? {
            FrameRead::Frame(input) => input,
            FrameRead::Empty => {
                warn!("skipping empty frame after frame {}", self.frame_number);
                return Ok(StepOutcome::Skipped);
            }
            FrameRead::EndOfStream => return Ok(StepOutcome::EndOfStream),
        };
        self.step += 1;
        self.frame_number += 1;

        let mut frame = Frame::new(input, self.config.blur_kernel)?;
        let flow = if self.matches_reference(&frame)? {
            self.optical_flow.estimate(
                &self.reference,
                &frame.gray,
                &self.points,
                &self.config.flow_params(),
            )?
        } else {
            // nothing to track across a resolution change, start over
            warn!(
                "frame {} is {}x{}, previous frame was {}x{}; restarting the trail",
                self.frame_number,
                frame.gray.cols(),
                frame.gray.rows(),
                self.reference.cols(),
                self.reference.rows()
            );
            self.trail = TrailBuffer::new(&frame.image)?;
            self.step = 1;
            self.points.clear();
            FlowResult::default()
        };
        let motions = flow.motions(&self.points)?;

        let visible: Vec<Motion> = if self.config.draw_lost_points {
            motions.clone()
        } else {
            motions.iter().filter(|m| m.tracked).copied().collect()
        };
        draw_markers(&mut frame.image, &visible)?;
        self.trail.draw(&visible)?;

        let trail_cleared = self.step >= self.config.trail_period.max(1);
        if trail_cleared {
            self.trail.clear()?;
            self.step = 0;
        }

        let mut quit = false;
        let presented = match compose(&frame.image, self.trail.image(), !self.config.no_mirror)? {
            Composite::Ready(image) => {
                presenter.show(&image)?;
                if let Some(key) = presenter.poll_key(KEY_DELAY_MS)? {
                    quit = is_quit_key(key, QUIT_KEY);
                }
                true
            }
            Composite::Empty => {
                debug!("nothing to show for frame {}", self.frame_number);
                false
            }
        };

        Span::current().pb_inc(1);
        debug!(
            "frame {}: {}/{} points tracked",
            self.frame_number,
            flow.tracked_count(),
            motions.len()
        );
        if quit {
            return Ok(StepOutcome::Quit);
        }

        // tracked points are dropped, the new frame is searched afresh
        self.points = self
            .detector
            .detect(&frame.gray, &self.config.detector_params())?;
        self.reference = frame.gray;

        Ok(StepOutcome::Continue(FrameReport {
            frame_number: self.frame_number,
            tracked: flow.tracked_count(),
            drawn: visible.len(),
            motions,
            trail_cleared,
            presented,
        }))
    }

    /// Step until the source ends or the user quits, then release the source
    /// and close the presenter whatever the outcome.
    pub fn run(&mut self, presenter: &mut dyn Presenter) -> Result<RunSummary> {
        let result = self.run_loop(presenter);
        let closed = presenter.close();
        let released = self.release();
        let summary = result?;
        closed?;
        released?;
        info!(
            "stopped after {} frames ({:?}), {} shown",
            summary.frames, summary.termination, summary.presented
        );
        Ok(summary)
    }

    fn run_loop(&mut self, presenter: &mut dyn Presenter) -> Result<RunSummary> {
        let mut frames = 0;
        let mut presented = 0;
        loop {
            match self.step(presenter)? {
                StepOutcome::Continue(report) => {
                    frames += 1;
                    if report.presented {
                        presented += 1;
                    }
                }
                StepOutcome::Skipped => {}
                StepOutcome::Quit => {
                    return Ok(RunSummary {
                        frames: frames + 1,
                        presented: presented + 1,
                        termination: Termination::Quit,
                    })
                }
                StepOutcome::EndOfStream => {
                    return Ok(RunSummary {
                        frames,
                        presented,
                        termination: Termination::EndOfStream,
                    })
                }
            }
        }
    }

    /// Release the frame source. Only the first call reaches the source.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.source.release()
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("failed to release source: {err:#}");
        }
    }
}
