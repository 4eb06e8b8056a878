use super::ingest::{self, Upload};
use super::model::prompt::PromptSpec;
use super::model::{DeviceInfo, SegmentModel};
use super::outline::{Outline, Vectorizer};
use super::predictor::Predictor;
use super::session::{SessionId, SessionStore};
use crate::error::Result;

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub image_size: [u32; 2],
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaskResult {
    pub score: f32,
    pub polygons: Vec<Outline>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Segmentation {
    pub image_size: [u32; 2],
    pub num_masks: usize,
    pub masks: Vec<MaskResult>,
}

/// The three use cases of the server: start a session, segment within it, end it.
///
/// Every method is blocking; the HTTP layer runs them on the blocking pool.
pub struct SegmentService {
    store: SessionStore,
    predictor: Predictor,
    vectorizer: Vectorizer,
    device: DeviceInfo,
}

impl SegmentService {
    pub fn new(model: Arc<dyn SegmentModel>, store: SessionStore, vectorizer: Vectorizer) -> Self {
        Self {
            device: model.device(),
            predictor: Predictor::new(model),
            store,
            vectorizer,
        }
    }

    pub fn start_session(&self, upload: Upload) -> Result<SessionInfo> {
        let raster = ingest::decode(&upload.bytes)?;
        let session = self.store.create(raster, &upload)?;
        let (w, h) = session.image_size();

        Ok(SessionInfo {
            session_id: session.id().to_string(),
            image_size: [w, h],
            image_url: session.image_url().to_string(),
        })
    }

    pub fn segment(&self, session_id: &str, spec: &PromptSpec) -> Result<Segmentation> {
        let session = self.store.get(&session_id.parse::<SessionId>()?)?;
        let candidates = self.predictor.predict(&session, spec)?;

        let timer = Instant::now();
        let masks: Vec<MaskResult> = candidates
            .iter()
            .map(|c| MaskResult {
                score: c.score,
                polygons: self.vectorizer.vectorize(&c.mask),
            })
            .collect();
        debug!("Vectorized {} mask(s) in {:?}", masks.len(), timer.elapsed());

        let (w, h) = session.image_size();
        Ok(Segmentation {
            image_size: [w, h],
            num_masks: masks.len(),
            masks,
        })
    }

    pub fn end_session(&self, session_id: &str) -> Result<()> {
        self.store.destroy(&session_id.parse::<SessionId>()?)
    }

    pub fn evict_idle(&self, ttl: Duration) -> usize {
        self.store.evict_idle(ttl).len()
    }

    pub fn active_sessions(&self) -> usize {
        self.store.len()
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }
}
