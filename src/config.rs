use clap::Parser;

use crate::detector::DetectorParams;
use crate::optical_flow::FlowParams;

#[derive(Debug, Clone)]
#[derive(clap::Parser)]
pub struct Config {
    /// Seed for the synthetic source noise
    #[clap(long, default_value = "0")]
    pub seed: u64,

    /// Fraction of pixels replaced by salt-and-pepper noise in synthetic frames
    #[clap(long, default_value = "0.0")]
    pub noise: f64,

    #[clap(long, default_value = "200")]
    pub max_corners: i32,

    /// Minimum corner quality relative to the strongest corner
    #[clap(long, default_value = "0.01")]
    pub quality_level: f64,

    #[clap(long, default_value = "10")]
    pub min_distance: f64,

    /// Block size of the very first detection
    #[clap(long, default_value = "7")]
    pub initial_block_size: i32,

    /// Block size of every re-detection after a tracked frame
    #[clap(long, default_value = "10")]
    pub block_size: i32,

    #[clap(long, default_value = "30")]
    pub win_size: i32,

    #[clap(long, default_value = "4")]
    pub max_level: i32,

    #[clap(long, default_value = "10")]
    pub lk_iters: i32,

    #[clap(long, default_value = "0.03")]
    pub lk_epsilon: f64,

    /// Median blur aperture, odd and at least 3. 0 or 1 turns the blur off
    #[clap(long, default_value = "5", value_parser = parse_blur_kernel)]
    pub blur_kernel: i32,

    /// Number of frames a motion trail stays on screen
    #[clap(long, default_value = "2")]
    pub trail_period: usize,

    /// Draw markers and trails for points the flow estimator lost
    #[clap(long)]
    pub draw_lost_points: bool,

    #[clap(long)]
    pub no_mirror: bool,
}

fn parse_blur_kernel(value: &str) -> Result<i32, String> {
    let kernel: i32 = value
        .parse()
        .map_err(|_| format!("`{value}` is not an integer"))?;
    match kernel {
        0 | 1 => Ok(kernel),
        k if k >= 3 && k % 2 == 1 => Ok(k),
        _ => Err(format!("blur kernel must be odd and at least 3, or 0/1 to disable, got {kernel}")),
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::parse_from(["sparse-flow"])
    }
}

impl Config {
    pub fn initial_detector_params(&self) -> DetectorParams {
        DetectorParams {
            block_size: self.initial_block_size,
            ..self.detector_params()
        }
    }

    pub fn detector_params(&self) -> DetectorParams {
        DetectorParams {
            max_corners: self.max_corners,
            quality_level: self.quality_level,
            min_distance: self.min_distance,
            block_size: self.block_size,
        }
    }

    pub fn flow_params(&self) -> FlowParams {
        FlowParams {
            win_size: self.win_size,
            max_level: self.max_level,
            max_iters: self.lk_iters,
            epsilon: self.lk_epsilon,
        }
    }
}
