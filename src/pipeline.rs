//! Request coordination.
//!
//! The [`Coordinator`] is the application context: configuration, the
//! archive fetcher and, once startup has completed, the shared message bus.
//! It starts out not ready and rejects every request until a bus is attached.
//!
//! An accepted request runs through:
//!
//! 1. validation (no I/O)
//! 2. workspace creation
//! 3. archive download
//! 4. extraction and target discovery
//! 5. per file, per record: normalization and publication
//!
//! Steps 4 and 5 run on one blocking worker, one file and one record at a
//! time. The workspace is removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::archive;
use crate::error::{PipelineError, Result};
use crate::io::Fetch;
use crate::normalize::Normalizer;
use crate::publish::{MessageBus, NormalizedFeature, Publisher};
use crate::request::ArchiveRequest;
use crate::shp;
use crate::workspace::Workspace;

/// Workspace subdirectory holding the downloaded archive.
const DOWNLOAD_DIR: &str = "download";
/// Workspace subdirectory the archive is unpacked into.
const EXTRACT_DIR: &str = "extracted";

/// Startup configuration shared by every request.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub topic: String,
    /// Prefix every request `sourceID` must start with.
    pub accepted_source_id: String,
    /// Shapefile component names that must each appear once per archive.
    pub target_files: Vec<String>,
    /// EPSG code of the source shapefiles.
    pub crs_code: u32,
    pub workspace_root: PathBuf,
    /// Flush the producer after this many features.
    pub flush_every: usize,
}

/// Per-file processing result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub path: PathBuf,
    pub records: u64,
    /// Records with at least one nulled property or identifier.
    pub failed_records: u64,
}

/// Outcome of a completed request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub files: Vec<FileSummary>,
}

impl Summary {
    /// Records published across every file.
    pub fn geometries(&self) -> u64 {
        self.files.iter().map(|f| f.records).sum()
    }

    /// Records published with at least one soft failure.
    pub fn failed_records(&self) -> u64 {
        self.files.iter().map(|f| f.failed_records).sum()
    }
}

/// Status code and plain-text body returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub body: String,
}

enum Readiness {
    NotReady,
    Ready(Arc<dyn MessageBus>),
}

/// Application context serving ingestion requests.
///
/// Holds the configuration and fetcher from construction on. Requests are
/// denied with `503` until [`Coordinator::attach`] supplies the bus.
pub struct Coordinator {
    config: Arc<PipelineConfig>,
    fetcher: Arc<dyn Fetch>,
    readiness: Readiness,
}

impl Coordinator {
    /// A coordinator that still waits for its message bus.
    pub fn new(config: PipelineConfig, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            config: Arc::new(config),
            fetcher,
            readiness: Readiness::NotReady,
        }
    }

    /// A coordinator ready to accept requests.
    pub fn ready(config: PipelineConfig, fetcher: Arc<dyn Fetch>, bus: Arc<dyn MessageBus>) -> Self {
        let mut coordinator = Self::new(config, fetcher);
        coordinator.attach(bus);
        coordinator
    }

    /// Complete startup by attaching the shared bus.
    pub fn attach(&mut self, bus: Arc<dyn MessageBus>) {
        self.readiness = Readiness::Ready(bus);
        info!(topic = %self.config.topic, "Pipeline ready");
    }

    /// Whether startup has completed and requests are accepted.
    pub fn is_ready(&self) -> bool {
        matches!(self.readiness, Readiness::Ready(_))
    }

    /// Process one request and render the response.
    ///
    /// # Arguments
    ///
    /// * `body` - The parsed JSON request
    /// * `request_id` - Identifier naming the request's workspace
    ///
    /// # Returns
    ///
    /// `200` with the geometry count on success, otherwise the error's status
    /// code and message.
    pub async fn handle(&self, body: &Value, request_id: &str) -> Response {
        match self.process(body, request_id).await {
            Ok(summary) => Response {
                status: StatusCode::OK,
                body: format!("Processing Completed ({} geometries)", summary.geometries()),
            },
            Err(err) => {
                let status = err.status();
                if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
                    error!(request_id, error = %err, "Request failed");
                } else {
                    warn!(request_id, error = %err, "Request rejected");
                }
                Response {
                    status,
                    body: err.to_string(),
                }
            }
        }
    }

    /// Process one request.
    ///
    /// The workspace is removed whether or not processing succeeds.
    ///
    /// # Returns
    ///
    /// The per-file [`Summary`], or the first error that stopped the request.
    pub async fn process(&self, body: &Value, request_id: &str) -> Result<Summary> {
        let bus = match &self.readiness {
            Readiness::Ready(bus) => bus.clone(),
            Readiness::NotReady => {
                warn!(request_id, "Function not ready, denying request !");
                return Err(PipelineError::NotReady);
            }
        };

        let request = ArchiveRequest::validate(body, &self.config.accepted_source_id)?;
        let workspace = Workspace::create(&self.config.workspace_root, request_id)?;
        info!(request_id, source_id = %request.source_id, "Processing request");

        let result = self.run(request, workspace.path(), bus).await;
        if let Err(err) = workspace.destroy() {
            warn!(request_id, error = %err, "Failed to clean up workspace");
        }

        if let Ok(summary) = &result {
            info!(
                request_id,
                geometries = summary.geometries(),
                failed_records = summary.failed_records(),
                "Request completed"
            );
        }
        result
    }

    async fn run(
        &self,
        request: ArchiveRequest,
        workspace: &Path,
        bus: Arc<dyn MessageBus>,
    ) -> Result<Summary> {
        let archive_name = request.archive_name();
        let archive_path = workspace.join(DOWNLOAD_DIR).join(&archive_name);

        info!(url = %request.archive_url, "Start downloading archive");
        self.fetcher
            .fetch(&request.archive_url, &archive_path)
            .await
            .map_err(|e| {
                warn!(url = %request.archive_url, error = %e, "Failed to download file");
                PipelineError::Download {
                    url: request.archive_url.clone(),
                    reason: e.to_string(),
                }
            })?;

        let job = ScanJob {
            config: self.config.clone(),
            bus,
            archive_name,
            archive_path,
            extract_dir: workspace.join(EXTRACT_DIR),
            request,
        };
        tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| PipelineError::Unexpected(e.to_string()))?
    }
}

/// Extraction, discovery and publication for one downloaded archive.
struct ScanJob {
    config: Arc<PipelineConfig>,
    bus: Arc<dyn MessageBus>,
    archive_name: String,
    archive_path: PathBuf,
    extract_dir: PathBuf,
    request: ArchiveRequest,
}

impl ScanJob {
    fn run(self) -> Result<Summary> {
        info!("Start extracting archive");
        archive::extract_all(&self.archive_path, &self.extract_dir)?;
        let targets = archive::locate(&self.extract_dir, &self.config.target_files, &self.archive_name)?;

        info!(code = self.config.crs_code, "Coordinate Reference System, EPSG");
        let normalizer = Normalizer::new(
            self.request.normalized_properties.clone(),
            self.config.crs_code,
            self.request.version.clone(),
        );
        let mut publisher = Publisher::new(
            self.bus.clone(),
            self.config.topic.clone(),
            self.config.flush_every,
        );

        let mut summary = Summary::default();
        for target in targets {
            let file = self.scan_file(&target, &normalizer, &mut publisher)?;
            summary.files.push(file);
        }
        Ok(summary)
    }

    fn scan_file(
        &self,
        path: &Path,
        normalizer: &Normalizer,
        publisher: &mut Publisher,
    ) -> Result<FileSummary> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id_field = &self.request.topsoil_id_field;

        let fields = shp::field_names(path)?;
        if !fields.iter().any(|field| field == id_field) {
            return Err(PipelineError::Validation(format!(
                "topsoilIdField '{id_field}' is not an attribute of {name}"
            )));
        }

        info!(file = %name, "Processing shapefile");
        let start = Instant::now();
        let mut failed_records = 0;

        let records = shp::for_each_record(path, &fields, |record| {
            let shp::RawRecord { fields, geometry } = record;
            let (id, id_ok) = identifier(fields.get(id_field));
            let normalized = normalizer.normalize(&fields);
            if !id_ok || normalized.soft_failures > 0 {
                failed_records += 1;
            }

            let feature = NormalizedFeature::new(
                format!("{}:{id}", self.request.source_id),
                geometry,
                normalized.properties,
            );
            publisher.publish(&feature)
        })?;
        publisher.flush()?;

        info!(
            file = %name,
            count = records,
            failures = failed_records,
            elapsed_secs = start.elapsed().as_secs(),
            "Shapefile processed successfully"
        );
        Ok(FileSummary {
            path: path.to_path_buf(),
            records,
            failed_records,
        })
    }
}

/// Text form of a record identifier; `false` when it is missing or null.
fn identifier(value: Option<&Value>) -> (String, bool) {
    match value {
        Some(Value::String(s)) => (s.clone(), true),
        Some(Value::Null) | None => (String::new(), false),
        Some(other) => (other.to_string(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::FetchError;
    use crate::publish::MemoryBus;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher(AtomicUsize);

    #[async_trait]
    impl Fetch for CountingFetcher {
        async fn fetch(&self, _url: &str, _destination: &Path) -> Result<u64, FetchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Io(std::io::Error::other("connection refused")))
        }
    }

    fn config(root: &Path) -> PipelineConfig {
        PipelineConfig {
            topic: "topsoil".to_string(),
            accepted_source_id: "topsoil:esdac".to_string(),
            target_files: vec!["SoilAttr_LUCAS_2009.shx".to_string()],
            crs_code: 4326,
            workspace_root: root.to_path_buf(),
            flush_every: 1000,
        }
    }

    fn body() -> Value {
        json!({
            "format": "zip",
            "url": "https://esdac.example.org/LUCAS.zip",
            "sourceID": "topsoil:esdac",
            "topsoilIdField": "POINT_ID",
            "normalizedProperties": {},
            "version": "1"
        })
    }

    #[tokio::test]
    async fn not_ready_rejects_without_side_effects() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher(AtomicUsize::new(0)));
        let coordinator = Coordinator::new(config(root.path()), fetcher.clone());
        assert!(!coordinator.is_ready());

        let response = coordinator.handle(&body(), "req-1").await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(fetcher.0.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn invalid_request_never_fetches() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher(AtomicUsize::new(0)));
        let bus = Arc::new(MemoryBus::new());
        let coordinator = Coordinator::ready(config(root.path()), fetcher.clone(), bus.clone());

        let mut body = body();
        body.as_object_mut().unwrap().remove("topsoilIdField");
        let response = coordinator.handle(&body, "req-2").await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body, "Missing 'topsoilIdField' attribute !");

        let mut body = self::body();
        body["sourceID"] = json!("topsoil:other");
        let response = coordinator.handle(&body, "req-3").await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        assert_eq!(fetcher.0.load(Ordering::SeqCst), 0);
        assert!(bus.messages().is_empty());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn download_failure_is_unavailable_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher(AtomicUsize::new(0)));
        let coordinator =
            Coordinator::ready(config(root.path()), fetcher.clone(), Arc::new(MemoryBus::new()));

        let response = coordinator.handle(&body(), "req-4").await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.body.starts_with("Failed to download file"));
        assert_eq!(fetcher.0.load(Ordering::SeqCst), 1);
        assert!(!root.path().join("archive-processor-req-4").exists());
    }

    #[test]
    fn identifier_rendering() {
        assert_eq!(identifier(Some(&json!("A12"))), ("A12".to_string(), true));
        assert_eq!(identifier(Some(&json!(42))), ("42".to_string(), true));
        assert_eq!(identifier(Some(&Value::Null)), (String::new(), false));
        assert_eq!(identifier(None), (String::new(), false));
    }
}
