use super::model::prompt::PromptSpec;
use super::model::{CandidateMask, SegmentModel};
use super::session::Session;
use crate::error::{Error, Result};

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Runs prompts against a session's cached embedding.
#[derive(Clone)]
pub struct Predictor {
    model: Arc<dyn SegmentModel>,
}

impl Predictor {
    pub fn new(model: Arc<dyn SegmentModel>) -> Self {
        Self { model }
    }

    /// Masks are returned in the order the model ranked them.
    pub fn predict(&self, session: &Session, spec: &PromptSpec) -> Result<Vec<CandidateMask>> {
        let prompts = spec.prompts()?;

        let timer = Instant::now();
        let masks = self
            .model
            .predict_masks(session.embedding(), &prompts, spec.multimask)
            .map_err(|e| {
                error!(
                    "Mask prediction failed for session {} ({} prompt(s), multimask: {}): {e}",
                    session.id(),
                    prompts.len(),
                    spec.multimask
                );
                match e {
                    Error::ModelFailure(msg) => Error::ModelFailure(msg),
                    other => Error::ModelFailure(other.to_string()),
                }
            })?;

        debug!(
            "Predicted {} mask(s) for session {} in {:?}",
            masks.len(),
            session.id(),
            timer.elapsed()
        );
        Ok(masks)
    }
}
