pub mod airtable;
pub mod app;
pub mod batch;
pub mod blog;
pub mod cafe;
pub mod config;
pub mod errors;
pub mod format;
pub mod handlers;
pub mod jobs;
pub mod medicontent;
pub mod models;
pub mod place;
pub mod schema;
pub mod settings;
pub mod state;
pub mod stats;
pub mod storage;
pub mod store;

pub use app::router;
pub use config::Config;
pub use state::{connect, AppState};
pub use store::RecordStore;
