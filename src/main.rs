use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;

use indicatif::ProgressStyle;
use tracing::info_span;
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use sparse_flow::config::*;
use sparse_flow::detector::ShiTomasiDetector;
use sparse_flow::display::{HighguiWindow, Presenter, RerunRecorder};
use sparse_flow::optical_flow::PyrLkFlow;
use sparse_flow::tracker::Tracker;
use sparse_flow::video::*;

#[derive(Parser)]
pub struct Args {
    /// Camera device index
    #[clap(long, default_value = "0")]
    pub camera: i32,
    /// Read frames from a video file instead of the camera
    #[clap(long)]
    pub video: Option<String>,
    /// Use a generated moving square instead of a real source
    #[clap(long)]
    pub synthetic: bool,
    /// Stop the synthetic source after this many frames
    #[clap(long)]
    pub frames: Option<usize>,
    /// Record the output to a rerun file instead of opening a window
    #[clap(long)]
    pub rerun: Option<String>,
    #[clap(flatten)]
    pub config: Config,
}

fn open_source(args: &Args) -> Result<Box<dyn FrameSource>> {
    if args.synthetic {
        let mut source = SyntheticSource::new(640, 480, 60, (80, 200), (6, 2))
            .with_noise(args.config.noise, args.config.seed);
        if let Some(frames) = args.frames {
            source = source.with_frame_limit(frames);
        }
        return Ok(Box::new(source));
    }
    match &args.video {
        Some(path) => Ok(Box::new(VideoInput::from_file(path)?)),
        None => Ok(Box::new(VideoInput::camera(args.camera)?)),
    }
}

fn main() -> Result<()> {
    // parse the config
    let args = Args::parse();

    // setup logging
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stdout_writer()))
        .with(indicatif_layer)
        .init();

    let source = open_source(&args)?;
    let mut tracker = Tracker::new(
        source,
        Box::new(ShiTomasiDetector::new()),
        Box::new(PyrLkFlow::new()),
        args.config.clone(),
    )?;

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    if let Some(length) = tracker.pair_count_hint() {
        header_span.pb_set_length(length);
    }
    let header_span_enter = header_span.enter();

    // the window only appears once the source delivered a frame
    let mut presenter: Box<dyn Presenter> = match &args.rerun {
        Some(path) => Box::new(RerunRecorder::new(path)?),
        None => Box::new(HighguiWindow::new("Video").context("cannot open display")?),
    };

    let summary = tracker.run(presenter.as_mut());

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    summary?;
    Ok(())
}
