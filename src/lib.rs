//! Interactive segmentation server: upload an image once, then ask for polygon outlines
//! from point and box prompts against its cached SAM embedding.

pub mod app;
pub mod config;
pub mod error;
mod utils;

pub use error::{Error, Result};
