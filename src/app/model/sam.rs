use super::prompt::Prompt;
use super::{CandidateMask, Device, DeviceInfo, Embedding, SegmentModel};
use crate::app::ingest::RasterImage;
use crate::config::Config;
use crate::error::{Error, Result};

use image::{imageops::FilterType, GrayImage};
use lazy_static::lazy_static;
use ndarray::{s, Array2, Array3, ArrayViewD, Ix2, Ix4};
use ort::{inputs, CUDAExecutionProvider, GraphOptimizationLevel, Session};
use tracing::{info, warn};

// the exported encoder takes a fixed size input, so DO NOT change this.
const INPUT_W: u32 = 1024;
const INPUT_H: u32 = 684;

const MASK_THRESHOLD: f32 = 0.5;

lazy_static! {
    static ref MASK: ndarray::Array4<f32> = ndarray::Array4::<f32>::default((1, 1, 256, 256));
    static ref HAS_MASK_INPUT: ndarray::Array1<f32> = ndarray::Array1::from(vec![0.0f32]);
    static ref ORIG_SIZE: ndarray::Array1<f32> =
        ndarray::Array1::from(vec![INPUT_H as f32, INPUT_W as f32]);
}

/// SAM split into an ONNX image encoder and a prompt decoder.
#[derive(Debug)]
pub struct SAMmodel {
    encoder: Session,
    decoder: Session,

    device: DeviceInfo,
}

impl SAMmodel {
    pub fn new(config: &Config) -> Result<Self> {
        let (encoder, device) = Self::load(&config.sam_e_path, config)?;
        let (decoder, _) = Self::load(&config.sam_d_path, config)?;

        info!(
            "SAM loaded on {} (encoder: {}, decoder: {})",
            device.device, config.sam_e_path, config.sam_d_path
        );

        Ok(Self {
            encoder,
            decoder,
            device,
        })
    }

    fn load(path: &str, config: &Config) -> Result<(Session, DeviceInfo)> {
        if config.use_cuda {
            match Self::commit(path, config, true) {
                Ok(session) => {
                    let device = DeviceInfo {
                        device: Device::Cuda,
                        name: Some(format!("CUDA:{}", config.cuda_device_id)),
                    };
                    return Ok((session, device));
                }
                Err(e) => warn!("CUDA unavailable for {path}, falling back to CPU: {e}"),
            }
        }

        let session = Self::commit(path, config, false)?;
        let device = DeviceInfo {
            device: Device::Cpu,
            name: None,
        };
        Ok((session, device))
    }

    fn commit(path: &str, config: &Config, cuda: bool) -> ort::Result<Session> {
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?;

        let builder = if cuda {
            builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(config.cuda_device_id)
                .build()
                .error_on_failure()])?
        } else {
            builder
        };

        builder.commit_from_file(path)
    }

    // HWC, BGR, unnormalized: the layout the exported encoder expects
    fn preprocess_img(image: &RasterImage) -> Array3<f32> {
        let img = image::imageops::resize(image.pixels(), INPUT_W, INPUT_H, FilterType::CatmullRom);

        let mut arr = Array3::zeros((INPUT_H as usize, INPUT_W as usize, 3));
        for (x, y, pixel) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = pixel.0;

            arr[[y, x, 2]] = r as f32;
            arr[[y, x, 1]] = g as f32;
            arr[[y, x, 0]] = b as f32;
        }

        arr
    }

    // prompts come in original pixel coordinates and are rescaled to the encoder input
    fn preprocess_prompts(prompts: &[Prompt], image_size: (u32, u32)) -> Result<(Array3<f32>, Array2<f32>)> {
        let (w, h) = image_size;
        let sx = INPUT_W as f32 / w as f32;
        let sy = INPUT_H as f32 / h as f32;

        let mut coords = Vec::new();
        let mut labels = Vec::new();
        for prompt in prompts {
            let (c, l): (Vec<f32>, Vec<f32>) = (*prompt).into();
            coords.extend(c);
            labels.extend(l);
        }

        // without a box the decoder expects a padding point labelled -1
        if !prompts.iter().any(|p| matches!(p, Prompt::Box(_))) {
            coords.extend([0.0, 0.0]);
            labels.push(-1.0);
        }

        let coords: Vec<f32> = coords
            .chunks(2)
            .flat_map(|chunk| [chunk[0] * sx, chunk[1] * sy])
            .collect();

        let points = Array3::from_shape_vec((1, labels.len(), 2), coords)?;
        let labels = Array2::from_shape_vec((1, labels.len()), labels)?;

        Ok((points, labels))
    }

    fn postprocess(
        masks: ArrayViewD<f32>,
        scores: ArrayViewD<f32>,
        multimask: bool,
        image_size: (u32, u32),
    ) -> Result<Vec<CandidateMask>> {
        let masks = masks.into_dimensionality::<Ix4>()?;
        let scores = scores.into_dimensionality::<Ix2>()?;

        // output 0 is the single-mask token, the rest are the multimask proposals
        let count = masks.shape()[1];
        let selected: Vec<usize> = match count {
            0 => Vec::new(),
            1 => vec![0],
            _ if multimask => (1..count).collect(),
            _ => vec![0],
        };

        let (w, h) = image_size;
        selected
            .into_iter()
            .map(|i| {
                let plane = masks.slice(s![0, i, .., ..]);
                let (mh, mw) = plane.dim();
                let data: Vec<u8> = plane
                    .iter()
                    .map(|&v| if v > MASK_THRESHOLD { 255u8 } else { 0u8 })
                    .collect();
                let mask = GrayImage::from_raw(mw as u32, mh as u32, data)
                    .ok_or_else(|| Error::ModelFailure("mask buffer size mismatch".to_string()))?;

                Ok(CandidateMask {
                    mask: image::imageops::resize(&mask, w, h, FilterType::Nearest),
                    score: scores[[0, i]],
                })
            })
            .collect()
    }
}

impl SegmentModel for SAMmodel {
    fn compute_embedding(&self, image: &RasterImage) -> Result<Embedding> {
        let input = Self::preprocess_img(image);

        let encoder_input = inputs!(&self.encoder.inputs[0].name => input.view())?;
        let mut encoder_output = self.encoder.run(encoder_input)?;
        let features = encoder_output
            .remove("image_embeddings")
            .ok_or_else(|| Error::ModelFailure("encoder returned no image_embeddings".to_string()))?
            .try_extract_tensor::<f32>()?
            .to_shape((1, 256, 64, 64))?
            .to_owned();

        Ok(Embedding::new(features, image.size()))
    }

    fn predict_masks(
        &self,
        embedding: &Embedding,
        prompts: &[Prompt],
        multimask: bool,
    ) -> Result<Vec<CandidateMask>> {
        let (points, labels) = Self::preprocess_prompts(prompts, embedding.image_size())?;

        let decoder_input = inputs!(
            &self.decoder.inputs[0].name => embedding.features().view(),
            &self.decoder.inputs[1].name => points.view(),
            &self.decoder.inputs[2].name => labels.view(),
            &self.decoder.inputs[3].name => MASK.view(),
            &self.decoder.inputs[4].name => HAS_MASK_INPUT.view(),
            &self.decoder.inputs[5].name => ORIG_SIZE.view(),
        )?;
        let decoder_output = self.decoder.run(decoder_input)?;

        let masks = decoder_output["masks"].try_extract_tensor::<f32>()?;
        let scores = decoder_output["iou_predictions"].try_extract_tensor::<f32>()?;
        Self::postprocess(masks, scores, multimask, embedding.image_size())
    }

    fn device(&self) -> DeviceInfo {
        self.device.clone()
    }
}
