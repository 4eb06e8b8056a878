pub mod prompt;
pub mod sam;

use super::ingest::RasterImage;
use crate::error::Result;
use prompt::Prompt;

use image::GrayImage;
use ndarray::Array4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device: Device,
    pub name: Option<String>,
}

/// Image features produced once per session and reused by every mask query.
#[derive(Debug, Clone)]
pub struct Embedding {
    features: Array4<f32>,
    image_size: (u32, u32),
}

impl Embedding {
    pub fn new(features: Array4<f32>, image_size: (u32, u32)) -> Self {
        Self {
            features,
            image_size,
        }
    }

    pub fn features(&self) -> &Array4<f32> {
        &self.features
    }

    // (width, height) of the image the features were computed from
    pub fn image_size(&self) -> (u32, u32) {
        self.image_size
    }
}

/// One mask proposed by the decoder. Foreground pixels are 255, background 0.
#[derive(Debug, Clone)]
pub struct CandidateMask {
    pub mask: GrayImage,
    pub score: f32,
}

/// The segmentation model as seen by the session store and the predictor.
///
/// `compute_embedding` is the expensive step and is called once per session;
/// `predict_masks` must be callable any number of times against the same embedding.
pub trait SegmentModel: Send + Sync {
    fn compute_embedding(&self, image: &RasterImage) -> Result<Embedding>;

    /// Prompts are in image pixel coordinates. Masks are returned in the order the model
    /// ranks them, each sized like the original image.
    fn predict_masks(
        &self,
        embedding: &Embedding,
        prompts: &[Prompt],
        multimask: bool,
    ) -> Result<Vec<CandidateMask>>;

    fn device(&self) -> DeviceInfo;
}
