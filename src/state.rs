use crate::airtable::AirtableClient;
use crate::config::{Config, StoreBackend};
use crate::errors::StoreError;
use crate::storage::LocalStore;
use crate::store::RecordStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

/// Opens the record store selected by `config`.
pub async fn connect(config: &Config) -> Result<Arc<dyn RecordStore>, StoreError> {
    let store: Arc<dyn RecordStore> = match &config.backend {
        StoreBackend::Airtable { api_key, base_id } => {
            Arc::new(AirtableClient::new(api_key, base_id, config.store_timeout)?)
        }
        StoreBackend::File { path } => Arc::new(LocalStore::open(path.clone()).await?),
    };
    Ok(store)
}
