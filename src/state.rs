use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::dataset::DatasetBuilder;
use crate::ingest::IngestStore;

/// Shared by every request handler.
///
/// Concurrent stores write distinct files. Concurrent builds write their
/// own temporary files, then replace `X.npy` and `y.npy` one at a time
/// under a process-wide lock, so the pair on disk always comes from the
/// same build.
#[derive(Clone)]
pub struct AppState
{
    pub ingest: Arc<IngestStore>,
    pub builder: Arc<DatasetBuilder>,
    pub assets_dir: PathBuf,
}

impl AppState
{
    pub fn new(config: &ServerConfig) -> AppState
    {
        AppState
        {
            ingest: Arc::new(IngestStore::new(config.data.clone())),
            builder: Arc::new(DatasetBuilder::new(config.data.clone())),
            assets_dir: config.assets_dir.clone(),
        }
    }
}
