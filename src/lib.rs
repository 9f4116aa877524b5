//! # topsoil-ingest
//!
//! Turns a remote archive of topsoil shapefiles into a stream of GeoJSON
//! features on a Kafka topic.
//!
//! One request names a zip archive, the data source it comes from, the
//! attribute identifying each record and a set of normalization rules. The
//! archive is downloaded into a request-scoped workspace, unpacked, and every
//! record of the expected shapefiles is normalized and published as one
//! message.
//!
//! ## Features
//!
//! - Request validation before any I/O
//! - Streaming download over HTTP(S) or from `file://` URLs
//! - Strict discovery of the configured shapefiles inside the archive
//! - Unit conversion through a small arithmetic grammar, value remapping and
//!   a closed set of named scalar transforms
//! - Batched publication with periodic flushes
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use topsoil_ingest::{Coordinator, KafkaBus, PipelineConfig, UrlFetcher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig {
//!         topic: "topsoil".to_string(),
//!         accepted_source_id: "topsoil:esdac".to_string(),
//!         target_files: vec!["SoilAttr_LUCAS_2009.shx".to_string()],
//!         crs_code: 4326,
//!         workspace_root: std::env::temp_dir(),
//!         flush_every: 1000,
//!     };
//!     let fetcher = Arc::new(UrlFetcher::new(Duration::from_secs(300))?);
//!     let bus = Arc::new(KafkaBus::new("localhost:9092", Duration::from_secs(60))?);
//!     let coordinator = Coordinator::ready(config, fetcher, bus);
//!
//!     let body = serde_json::json!({
//!         "format": "zip",
//!         "url": "https://example.com/LUCAS_2009.zip",
//!         "sourceID": "topsoil:esdac:lucas",
//!         "topsoilIdField": "POINT_ID",
//!         "normalizedProperties": {
//!             "depth": {"sourceProp": "depth_cm", "coefSI": "/100", "evalMethod": "toFloat"}
//!         },
//!         "version": "1"
//!     });
//!     let response = coordinator.handle(&body, "request-1").await;
//!     println!("{} {}", response.status, response.body);
//!
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod error;
pub mod io;
pub mod normalize;
pub mod pipeline;
pub mod publish;
pub mod request;
pub mod shp;
pub mod workspace;

pub use cli::Cli;
pub use error::PipelineError;
pub use io::{Fetch, FetchError, HttpFetcher, LocalFileFetcher, UrlFetcher};
pub use normalize::{NormalizationRule, Normalizer};
pub use pipeline::{Coordinator, PipelineConfig, Response, Summary};
pub use publish::{KafkaBus, MemoryBus, MessageBus, NormalizedFeature, Publisher};
pub use request::ArchiveRequest;
pub use workspace::Workspace;
