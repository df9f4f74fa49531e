use std::sync::Arc;

use cohort_service::Service;
use cohort_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<Service>,
}
impl AppState {
	pub async fn new(config: cohort_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;
		let service = Service::new(config, db);

		Ok(Self { service: Arc::new(service) })
	}
}
