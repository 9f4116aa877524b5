use clap::Parser;
use std::path::PathBuf;

use crate::pipeline::PipelineConfig;

#[derive(Parser, Debug)]
#[command(name = "topsoil-ingest")]
#[command(version)]
#[command(about = "Publish the records of a remote shapefile archive as GeoJSON to Kafka", long_about = None)]
#[command(after_help = "Examples:\n  \
  topsoil-ingest request.json              process the request in request.json\n  \
  cat request.json | topsoil-ingest -      read the request from stdin\n\n\
The response body is written to stdout. Exit status: 0 on success, 2 for a\n\
rejected request, 3 when the archive or service is unavailable, 1 otherwise.")]
pub struct Cli {
    /// JSON request file, or - for stdin
    #[arg(value_name = "REQUEST", default_value = "-")]
    pub request: String,

    /// Kafka bootstrap servers
    #[arg(long, env = "KAFKA_BOOTSTRAP_SERVER")]
    pub bootstrap_servers: String,

    /// Topic receiving the GeoJSON features
    #[arg(long, env = "TARGET_TOPIC")]
    pub topic: String,

    /// Prefix every request sourceID must start with
    #[arg(long, env = "ACCEPTED_SOURCE_ID", default_value = "topsoil:esdac")]
    pub accepted_source_id: String,

    /// Shapefile component expected once in every archive
    #[arg(
        long = "target-file",
        value_name = "NAME",
        env = "TARGET_FILES",
        value_delimiter = ',',
        default_value = "SoilAttr_LUCAS_2009.shx"
    )]
    pub target_files: Vec<String>,

    /// EPSG code of the source shapefiles
    #[arg(long, env = "SOURCE_CRS_EPSG_CODE", default_value_t = 4326)]
    pub crs_code: u32,

    /// Directory holding request workspaces (default: system temp dir)
    #[arg(long, value_name = "DIR", env = "WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    /// Flush the producer after this many features
    #[arg(long, env = "FLUSH_EVERY", default_value_t = 1000)]
    pub flush_every: usize,

    /// Archive download timeout in seconds
    #[arg(long, value_name = "SECS", env = "DOWNLOAD_TIMEOUT", default_value_t = 300)]
    pub download_timeout: u64,

    /// Producer flush timeout in seconds
    #[arg(long, value_name = "SECS", env = "FLUSH_TIMEOUT", default_value_t = 60)]
    pub flush_timeout: u64,

    /// Request identifier naming the workspace (default: random UUID)
    #[arg(long, env = "REQUEST_ID")]
    pub request_id: Option<String>,
}

impl Cli {
    /// Whether the request body is read from stdin (`-`) instead of a file.
    pub fn reads_stdin(&self) -> bool {
        self.request == "-"
    }

    /// The configured request id, or a fresh UUID v4 when none was given.
    pub fn request_id(&self) -> String {
        self.request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    /// Build the shared pipeline configuration.
    ///
    /// Target file names are trimmed, blank entries dropped and duplicates
    /// collapsed while keeping their order.
    ///
    /// # Returns
    ///
    /// A [`PipelineConfig`] whose workspace root falls back to the system temp
    /// directory and whose flush cadence is at least one feature.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut target_files: Vec<String> = Vec::new();
        for name in &self.target_files {
            let name = name.trim();
            if !name.is_empty() && !target_files.iter().any(|t| t == name) {
                target_files.push(name.to_string());
            }
        }

        PipelineConfig {
            topic: self.topic.clone(),
            accepted_source_id: self.accepted_source_id.clone(),
            target_files,
            crs_code: self.crs_code,
            workspace_root: self
                .workspace_root
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            flush_every: self.flush_every.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let base = ["topsoil-ingest", "--bootstrap-servers", "kafka:9092", "--topic", "topsoil"];
        Cli::try_parse_from(base.iter().chain(args.iter()).copied()).unwrap()
    }

    #[test]
    fn explicit_options() {
        let cli = parse(&[
            "--target-file",
            "A.shx, B.shx,A.shx",
            "--crs-code",
            "3035",
            "--workspace-root",
            "/var/spool/ingest",
            "--flush-every",
            "0",
            "--request-id",
            "evt-9",
            "request.json",
        ]);
        assert!(!cli.reads_stdin());
        assert_eq!(cli.request_id(), "evt-9");

        let config = cli.pipeline_config();
        assert_eq!(config.topic, "topsoil");
        assert_eq!(config.target_files, ["A.shx", "B.shx"]);
        assert_eq!(config.crs_code, 3035);
        assert_eq!(config.workspace_root, PathBuf::from("/var/spool/ingest"));
        assert_eq!(config.flush_every, 1);
    }

    #[test]
    fn generated_request_ids_are_unique() {
        let cli = parse(&["-"]);
        assert!(cli.reads_stdin());
        assert_ne!(cli.request_id(), cli.request_id());
    }
}
