//! CLI commands implementation

pub mod init;
pub mod scan;
pub mod status;
pub mod sync;
pub mod worker;

pub use init::*;
pub use scan::*;
pub use status::*;
pub use sync::*;
pub use worker::*;

use crate::config::Config;
use crate::embed::{EmbedderProvider, HttpEmbedderProvider};
use crate::error::Result;
use crate::objectstore::{ObjectStore, S3Store};
use crate::parse::{DocumentParser, OcrClient};
use crate::records::RecordStore;
use crate::scanner::Scanner;
use crate::store::{QdrantIndex, VectorIndex};
use crate::workflow::{Activities, SyncEngine, SyncPolicies};
use std::sync::Arc;
use std::time::Duration;

/// Fully wired sync runtime shared by the worker-facing commands
pub struct Runtime {
    pub records: RecordStore,
    pub engine: SyncEngine,
    pub scanner: Scanner,
}

/// Construct the runtime from configuration
///
/// All clients are built once here and handed down; nothing below this
/// point reaches for globals or the environment.
pub async fn build_runtime(config: &Config) -> Result<Runtime> {
    let records = RecordStore::connect(config).await?;

    let object_store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&config.object_store)?);
    let parser: Arc<dyn DocumentParser> = Arc::new(OcrClient::new(&config.parser)?);
    let embedders: Arc<dyn EmbedderProvider> =
        Arc::new(HttpEmbedderProvider::new(config.embedding.clone()));
    let index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::new(&config.vector.url)?);

    let activities = Activities::new(
        records.clone(),
        object_store,
        parser,
        embedders,
        index,
        config,
    );
    let engine = SyncEngine::new(
        records.clone(),
        activities,
        SyncPolicies::from_config(&config.sync),
    );
    let scanner = Scanner::new(
        records.clone(),
        engine.clone(),
        Duration::from_secs(config.sync.scan_interval_secs),
        config.sync.scan_batch_limit,
    );

    Ok(Runtime {
        records,
        engine,
        scanner,
    })
}
