#![allow(dead_code)]

use label_sam_server::app::ingest::{RasterImage, UploadDir};
use label_sam_server::app::model::prompt::{PointLabel, Prompt};
use label_sam_server::app::model::{CandidateMask, Device, DeviceInfo, Embedding, SegmentModel};
use label_sam_server::app::outline::Vectorizer;
use label_sam_server::app::service::SegmentService;
use label_sam_server::app::session::SessionStore;
use label_sam_server::{Error, Result};

use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use ndarray::Array4;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Segments bright pixels: positive points select the bright region they land on, negative
/// points remove theirs, a box keeps only what lies inside it. With multimask it also
/// proposes an empty low-confidence mask.
#[derive(Default)]
pub struct BrightRegionModel {
    pub embeddings: AtomicUsize,
    pub predictions: AtomicUsize,
    pub fail_predictions: bool,
}

impl BrightRegionModel {
    pub fn failing() -> Self {
        Self {
            fail_predictions: true,
            ..Default::default()
        }
    }
}

impl SegmentModel for BrightRegionModel {
    fn compute_embedding(&self, image: &RasterImage) -> Result<Embedding> {
        self.embeddings.fetch_add(1, Ordering::SeqCst);

        let (w, h) = image.size();
        let luma = DynamicImage::ImageRgb8(image.pixels().clone()).to_luma8();
        let features = Array4::from_shape_fn((1, 1, h as usize, w as usize), |(_, _, y, x)| {
            luma.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
        });

        Ok(Embedding::new(features, (w, h)))
    }

    fn predict_masks(
        &self,
        embedding: &Embedding,
        prompts: &[Prompt],
        multimask: bool,
    ) -> Result<Vec<CandidateMask>> {
        self.predictions.fetch_add(1, Ordering::SeqCst);
        if self.fail_predictions {
            return Err(Error::ModelFailure("decoder unavailable".to_string()));
        }

        let (w, h) = embedding.image_size();
        let features = embedding.features();
        let bright = |x: u32, y: u32| features[[0, 0, y as usize, x as usize]] > 0.5;

        let mut positives = Vec::new();
        let mut negatives = Vec::new();
        let mut bbox = None;
        for prompt in prompts {
            match *prompt {
                Prompt::Point(p, PointLabel::Positive) => positives.push(p),
                Prompt::Point(p, PointLabel::Negative) => negatives.push(p),
                Prompt::Box(b) => bbox = Some(b),
            }
        }

        let mut mask = GrayImage::new(w, h);
        if positives.is_empty() {
            for (x, y, px) in mask.enumerate_pixels_mut() {
                if bright(x, y) {
                    *px = Luma([255]);
                }
            }
        } else {
            for p in &positives {
                flood(&mut mask, *p, &bright, 255);
            }
        }
        for p in &negatives {
            flood(&mut mask, *p, &bright, 0);
        }
        if let Some([x1, y1, x2, y2]) = bbox {
            for (x, y, px) in mask.enumerate_pixels_mut() {
                let (fx, fy) = (x as f32, y as f32);
                if fx < x1 || fx >= x2 || fy < y1 || fy >= y2 {
                    *px = Luma([0]);
                }
            }
        }

        let mut masks = vec![CandidateMask { mask, score: 0.95 }];
        if multimask {
            masks.push(CandidateMask {
                mask: GrayImage::new(w, h),
                score: 0.05,
            });
        }
        Ok(masks)
    }

    fn device(&self) -> DeviceInfo {
        DeviceInfo {
            device: Device::Cpu,
            name: None,
        }
    }
}

fn flood(mask: &mut GrayImage, start: [f32; 2], bright: &impl Fn(u32, u32) -> bool, value: u8) {
    let (w, h) = mask.dimensions();
    let (sx, sy) = (start[0].floor() as i64, start[1].floor() as i64);
    if sx < 0 || sy < 0 || sx >= w as i64 || sy >= h as i64 || !bright(sx as u32, sy as u32) {
        return;
    }

    let mut seen = vec![false; (w * h) as usize];
    let mut queue = VecDeque::from([(sx as u32, sy as u32)]);
    while let Some((x, y)) = queue.pop_front() {
        let idx = (y * w + x) as usize;
        if seen[idx] || !bright(x, y) {
            continue;
        }
        seen[idx] = true;
        mask.put_pixel(x, y, Luma([value]));

        if x > 0 {
            queue.push_back((x - 1, y));
        }
        if y > 0 {
            queue.push_back((x, y - 1));
        }
        if x + 1 < w {
            queue.push_back((x + 1, y));
        }
        if y + 1 < h {
            queue.push_back((x, y + 1));
        }
    }
}

/// Black image with white rectangles given as (x0, y0, x1, y1), end exclusive.
pub fn png_with_rects(w: u32, h: u32, rects: &[(u32, u32, u32, u32)]) -> Vec<u8> {
    let mut img = RgbImage::new(w, h);
    for &(x0, y0, x1, y1) in rects {
        for y in y0..y1 {
            for x in x0..x1 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
    }

    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

pub struct Fixture {
    pub model: Arc<BrightRegionModel>,
    pub service: Arc<SegmentService>,
    pub uploads: tempfile::TempDir,
}

pub fn fixture_with(model: BrightRegionModel) -> Fixture {
    let model = Arc::new(model);
    let uploads = tempfile::tempdir().unwrap();
    let store = SessionStore::new(model.clone(), UploadDir::new(uploads.path()).unwrap());
    let service = SegmentService::new(model.clone(), store, Vectorizer::default());

    Fixture {
        model,
        service: Arc::new(service),
        uploads,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(BrightRegionModel::default())
}
