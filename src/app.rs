pub mod api;
pub mod ingest;
pub mod model;
pub mod outline;
pub mod predictor;
pub mod service;
pub mod session;

use crate::config::Config;
use crate::error::Result;
use api::ApiState;
use ingest::UploadDir;
use model::{sam::SAMmodel, SegmentModel};
use outline::Vectorizer;
use service::SegmentService;
use session::SessionStore;

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        App { config }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let model: Arc<dyn SegmentModel> = Arc::new(SAMmodel::new(&self.config)?);
        let service = Arc::new(self.service(model)?);

        if let Some(ttl) = self.config.session_idle_ttl() {
            let every = Duration::from_secs(self.config.sweep_interval_secs);
            Self::spawn_sweeper(service.clone(), ttl, every);
            info!("Idle sessions expire after {:?}", ttl);
        }

        let listener = tokio::net::TcpListener::bind(&self.config.bind).await?;
        info!("Listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router(service))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down");
            })
            .await?;

        Ok(())
    }

    pub fn service(&self, model: Arc<dyn SegmentModel>) -> Result<SegmentService> {
        let uploads = match &self.config.upload_dir {
            Some(dir) => UploadDir::new(dir.clone())?,
            None => UploadDir::temporary()?,
        };
        info!("Upload directory: {}", uploads.root().display());

        let store = SessionStore::new(model.clone(), uploads);
        Ok(SegmentService::new(
            model,
            store,
            Vectorizer::from_config(&self.config),
        ))
    }

    pub fn router(&self, service: Arc<SegmentService>) -> Router {
        let state = ApiState::new(service, self.config.passwords.clone());
        api::router(state, self.config.max_upload_bytes)
    }

    fn spawn_sweeper(service: Arc<SegmentService>, ttl: Duration, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                service.evict_idle(ttl);
            }
        })
    }
}
