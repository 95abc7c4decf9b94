pub mod config;
pub mod detector;
pub mod display;
pub mod error;
pub mod feature;
pub mod frame;
pub mod my_types;
pub mod optical_flow;
pub mod tracker;
pub mod video;
pub mod visualization;
