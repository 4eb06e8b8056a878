use super::auth::AuthRotation;
use crate::app::service::SegmentService;

use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<SegmentService>,
    pub auth: Arc<AuthRotation>,
}

impl ApiState {
    pub fn new(service: Arc<SegmentService>, passwords: Vec<String>) -> Self {
        ApiState {
            service,
            auth: Arc::new(AuthRotation::new(passwords)),
        }
    }
}
