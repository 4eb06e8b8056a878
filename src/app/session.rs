use super::ingest::{RasterImage, StoredImage, Upload, UploadDir};
use super::model::{Embedding, SegmentModel};
use crate::error::{Error, Result};

use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn generate() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// anything that is not a uuid cannot name a live session
impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(SessionId)
            .map_err(|_| Error::SessionNotFound(s.to_string()))
    }
}

/// An uploaded image bound to its embedding.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    embedding: Embedding,
    image_size: (u32, u32),
    image: StoredImage,

    created: Instant,
    last_used: Mutex<Instant>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }

    pub fn image_size(&self) -> (u32, u32) {
        self.image_size
    }

    pub fn image_url(&self) -> &str {
        &self.image.url
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn idle(&self) -> Duration {
        self.last_used.lock().elapsed()
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }
}

/// In-memory sessions keyed by id. Embeddings are computed once in `create` and never
/// mutated afterwards.
pub struct SessionStore {
    model: Arc<dyn SegmentModel>,
    uploads: UploadDir,
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionStore {
    pub fn new(model: Arc<dyn SegmentModel>, uploads: UploadDir) -> Self {
        Self {
            model,
            uploads,
            sessions: DashMap::new(),
        }
    }

    pub fn uploads(&self) -> &UploadDir {
        &self.uploads
    }

    pub fn create(&self, image: RasterImage, upload: &Upload) -> Result<Arc<Session>> {
        let image_size = image.size();
        if image_size.0 == 0 || image_size.1 == 0 {
            return Err(Error::ImageDecode("image has zero dimension".to_string()));
        }

        let timer = Instant::now();
        let embedding = self.model.compute_embedding(&image)?;
        debug!("Embedding computed in {:?}", timer.elapsed());
        // the raster is not needed once the embedding exists
        drop(image);

        let stored = self.uploads.persist(upload)?;

        let now = Instant::now();
        let session = Arc::new(Session {
            id: SessionId::generate(),
            embedding,
            image_size,
            image: stored,
            created: now,
            last_used: Mutex::new(now),
        });
        self.sessions.insert(session.id, session.clone());

        info!(
            "Session {} started ({}x{}, {} active)",
            session.id,
            image_size.0,
            image_size.1,
            self.sessions.len()
        );
        Ok(session)
    }

    pub fn get(&self, id: &SessionId) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;

        session.touch();
        Ok(session)
    }

    pub fn destroy(&self, id: &SessionId) -> Result<()> {
        let (_, session) = self
            .sessions
            .remove(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;

        session.image.remove();
        info!("Session {id} ended after {:?}", session.age());
        Ok(())
    }

    /// Drops every session idle for at least `ttl` and returns their ids.
    pub fn evict_idle(&self, ttl: Duration) -> Vec<SessionId> {
        let mut evicted = Vec::new();
        self.sessions.retain(|id, session| {
            if session.idle() >= ttl {
                session.image.remove();
                evicted.push(*id);
                false
            } else {
                true
            }
        });

        if !evicted.is_empty() {
            info!("Evicted {} idle session(s), {} active", evicted.len(), self.sessions.len());
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
