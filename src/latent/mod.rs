pub mod interpolate;
pub mod spline;

pub use interpolate::{interpolate_vectors, InterpolationKind};

/// Latent dimensionality of the image generator the path feeds.
pub const LATENT_DIM: usize = 512;
