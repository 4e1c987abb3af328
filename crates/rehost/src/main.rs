//! rehost: legacy image URL migration
//!
//! Scans document collections for image URLs on the deprecated S3 bucket,
//! re-uploads each image to Cloudinary and writes the new URLs back.
//!
//! - `--dry-run`: count legacy URLs, change nothing
//! - `--test`: migrate the first matching document, then stop
//! - `--debug`: log document structure and per-field decisions

mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rehost_cdn::CloudinaryClient;
use rehost_migrate::{MigrationConfig, MigrationWorker, Orchestrator, RunMode, UrlMigrator};
use rehost_store::{DocumentStore, FirestoreClient, MemoryStore};

use settings::{CloudinaryArgs, FirestoreArgs, StoreTarget};

#[derive(Parser)]
#[command(name = "rehost")]
#[command(about = "Migrate legacy S3 image URLs to Cloudinary", long_about = None)]
struct Cli {
    /// Verbose per-field tracing
    #[arg(long)]
    debug: bool,

    /// Report legacy URLs without downloading, uploading or writing
    #[arg(long)]
    dry_run: bool,

    /// Process only the first document with a legacy URL, then stop
    #[arg(long)]
    test: bool,

    /// Collection to migrate (repeatable)
    #[arg(long = "collection", default_value = "products")]
    collections: Vec<String>,

    /// Documents processed concurrently per batch
    #[arg(long, default_value = "5")]
    batch_size: usize,

    /// Pause between batches in milliseconds
    #[arg(long, default_value = "2000")]
    batch_delay_ms: u64,

    /// Download timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Redirects followed per download
    #[arg(long, default_value = "5")]
    max_redirects: usize,

    /// URL migrations in flight per document
    #[arg(long, default_value = "1")]
    url_concurrency: usize,

    /// Leading folder of uploaded images
    #[arg(long, default_value = "migrated")]
    namespace: String,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Run against a JSON fixture instead of Firestore; migrated documents
    /// are written back to the same file
    #[arg(long)]
    fixture: Option<PathBuf>,

    #[command(flatten)]
    cloudinary: CloudinaryArgs,

    #[command(flatten)]
    firestore: FirestoreArgs,
}

impl Cli {
    fn migration_config(&self) -> MigrationConfig {
        MigrationConfig::default()
            .with_mode(RunMode::from_flags(self.dry_run, self.test))
            .with_debug(self.debug)
            .with_collections(self.collections.clone())
            .with_batch_size(self.batch_size)
            .with_batch_delay(Duration::from_millis(self.batch_delay_ms))
            .with_download_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_redirects(self.max_redirects)
            .with_url_concurrency(self.url_concurrency)
            .with_namespace(self.namespace.clone())
    }
}

/// Default log filter for the given verbosity.
fn default_filter(debug: bool) -> &'static str {
    if debug {
        "rehost=debug,rehost_migrate=debug,rehost_store=debug,rehost_cdn=debug"
    } else {
        "rehost=info,rehost_migrate=info,rehost_store=warn,rehost_cdn=warn"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter(cli.debug).to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Unexpected failures end the run
    std::panic::set_hook(Box::new(|panic| {
        error!(panic = %panic, "unexpected failure, exiting");
        std::process::exit(1);
    }));

    tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("migration interrupted by user");
            std::process::exit(0);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.migration_config();
    config.validate().map_err(|e| miette::miette!("{}", e))?;
    let mode = config.mode;

    let fixture = match &cli.fixture {
        Some(path) => Some(Arc::new(load_fixture(path).await?)),
        None => None,
    };
    let store: Arc<dyn DocumentStore> = match &fixture {
        Some(store) => Arc::clone(store) as Arc<dyn DocumentStore>,
        None => open_firestore(&cli.firestore)?,
    };
    let migrator = if mode == RunMode::DryRun {
        None
    } else {
        Some(build_migrator(&cli.cloudinary, &config)?)
    };

    let orchestrator =
        Orchestrator::new(config, store, migrator).map_err(|e| miette::miette!("{}", e))?;
    let report = orchestrator.run().await;

    if let (Some(store), Some(path)) = (&fixture, &cli.fixture) {
        if mode != RunMode::DryRun {
            save_fixture(store, path).await?;
        }
    }

    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .await
            .map_err(|e| miette::miette!("failed to write report to {}: {}", path.display(), e))?;
        info!(path = %path.display(), "wrote run report");
    }

    report.print_summary();
    Ok(())
}

async fn load_fixture(path: &Path) -> Result<MemoryStore> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .into_diagnostic()?;
    let json: serde_json::Value = serde_json::from_str(&contents).into_diagnostic()?;
    let store = MemoryStore::from_json(json).map_err(|e| miette::miette!("{}", e))?;
    info!(path = %path.display(), "using fixture store");
    Ok(store)
}

async fn save_fixture(store: &MemoryStore, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&store.to_json().await).into_diagnostic()?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| miette::miette!("failed to write fixture to {}: {}", path.display(), e))?;
    info!(path = %path.display(), "wrote migrated fixture");
    Ok(())
}

fn open_firestore(args: &FirestoreArgs) -> Result<Arc<dyn DocumentStore>> {
    let target = args.target().map_err(|e| miette::miette!("{}", e))?;
    let client = match target {
        StoreTarget::Emulator {
            host,
            project_id,
            database,
        } => {
            info!(host = %host, project = %project_id, "using Firestore emulator");
            FirestoreClient::emulator(&host, project_id).map(|c| c.with_database(database))
        }
        StoreTarget::Firestore {
            project_id,
            database,
            access_token,
        } => FirestoreClient::new(project_id, Some(access_token)).map(|c| c.with_database(database)),
    }
    .map_err(|e| miette::miette!("{}", e))?;

    Ok(Arc::new(client))
}

fn build_migrator(args: &CloudinaryArgs, config: &MigrationConfig) -> Result<Arc<dyn UrlMigrator>> {
    let credentials = args
        .credentials(|var| std::env::var(var).ok())
        .map_err(|missing| {
            miette::miette!(
                "missing required environment variables: {}",
                missing.join(", ")
            )
        })?;

    let host = CloudinaryClient::new(credentials)
        .map_err(|e| miette::miette!("{}", e))?
        .with_api_base(args.cloudinary_url.clone());
    let worker =
        MigrationWorker::new(config, Arc::new(host)).map_err(|e| miette::miette!("{}", e))?;

    Ok(Arc::new(worker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["rehost", "--fixture", "fixture.json"]).unwrap();
        let config = cli.migration_config();

        assert_eq!(config.mode, RunMode::Normal);
        assert_eq!(config.collections, vec!["products"]);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.batch_delay, Duration::from_secs(2));
        assert_eq!(config.download_timeout, Duration::from_secs(30));
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.namespace, "migrated");
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "rehost",
            "--dry-run",
            "--test",
            "--debug",
            "--collection",
            "products",
            "--collection",
            "gallery",
            "--batch-size",
            "10",
            "--batch-delay-ms",
            "0",
        ])
        .unwrap();
        let config = cli.migration_config();

        assert_eq!(config.mode, RunMode::DryRun);
        assert!(config.debug);
        assert_eq!(config.collections, vec!["products", "gallery"]);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.batch_delay, Duration::ZERO);
    }

    #[test]
    fn test_default_filter() {
        assert!(default_filter(true).contains("rehost_migrate=debug"));
        assert!(default_filter(false).starts_with("rehost=info"));
    }

    #[tokio::test]
    async fn test_dry_run_against_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("fixture.json");
        let report = dir.path().join("report.json");
        let original = serde_json::json!({
            "products": {
                "a": {"images": ["https://bucket.s3.amazonaws.com/a.jpg"]},
                "b": {"images": ["https://cdn.example.com/b.jpg"]}
            }
        })
        .to_string();
        std::fs::write(&fixture, &original).unwrap();

        let cli = Cli::try_parse_from([
            "rehost".to_string(),
            "--dry-run".to_string(),
            "--fixture".to_string(),
            fixture.display().to_string(),
            "--report".to_string(),
            report.display().to_string(),
        ])
        .unwrap();
        run(cli).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(json["mode"], "dry-run");
        assert_eq!(json["collections"][0]["documents_listed"], 2);
        assert_eq!(std::fs::read_to_string(&fixture).unwrap(), original);
    }

    #[tokio::test]
    async fn test_fixture_run_writes_migrated_documents_back() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        const NEW_URL: &str = "https://res.cloudinary.com/demo/image/upload/v1/migrated/a.jpg";

        let images = MockServer::start().await;
        let cdn = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bucket.s3.amazonaws.com/a.jpg"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![0xff, 0xd8, 0xff], "image/jpeg"),
            )
            .mount(&images)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1_1/demo/image/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "public_id": "migrated/a",
                "secure_url": NEW_URL
            })))
            .expect(1)
            .mount(&cdn)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("fixture.json");
        let legacy = format!("{}/bucket.s3.amazonaws.com/a.jpg", images.uri());
        std::fs::write(
            &fixture,
            serde_json::json!({
                "products": {
                    "a": {"name": "Chair", "images": [legacy, "https://cdn.example.com/b.jpg"]}
                }
            })
            .to_string(),
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "rehost".to_string(),
            "--fixture".to_string(),
            fixture.display().to_string(),
            "--cloud-name".to_string(),
            "demo".to_string(),
            "--api-key".to_string(),
            "key".to_string(),
            "--api-secret".to_string(),
            "secret".to_string(),
            "--cloudinary-url".to_string(),
            cdn.uri(),
        ])
        .unwrap();
        run(cli).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&fixture).unwrap()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({
                "products": {
                    "a": {"name": "Chair", "images": [NEW_URL, "https://cdn.example.com/b.jpg"]}
                }
            })
        );
    }
}
