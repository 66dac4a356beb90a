use crate::config::settings::AppConfig;
use crate::infrastructure::queue::JobPublisher;
use crate::infrastructure::storage::ObjectStore;
use crate::modules::videos::service::ReadinessOracle;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// Raw uploads, keyed by filename.
    pub incoming: Arc<dyn ObjectStore>,
    /// Transcoded variants.
    pub processed: Arc<dyn ObjectStore>,
    pub publisher: Arc<dyn JobPublisher>,
    pub oracle: Arc<ReadinessOracle>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        incoming: Arc<dyn ObjectStore>,
        processed: Arc<dyn ObjectStore>,
        publisher: Arc<dyn JobPublisher>,
    ) -> Self {
        let oracle = Arc::new(ReadinessOracle::new(processed.clone(), config.signed_url_ttl));

        Self {
            config,
            incoming,
            processed,
            publisher,
            oracle,
        }
    }
}
