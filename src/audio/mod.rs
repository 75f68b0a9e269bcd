pub mod analysis;
pub mod decode;
pub mod features;
pub mod hpss;
pub mod mel;
pub mod observer;
pub mod sections;
pub mod stft;
