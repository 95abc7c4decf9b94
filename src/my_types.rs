use nalgebra as na;

pub type Vector2d = na::Vector2::<f64>;

/// An ordered set of sub-pixel feature locations in one frame
pub type FeatureSet = Vec<Vector2d>;
