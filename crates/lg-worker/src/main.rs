//! Inspection worker binary.
//!
//! ```text
//! lg-worker run <video-path> [--source <ref>]
//! lg-worker show <report-id>
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lg_firestore::{ConditionReportRepository, FirestoreClient, FirestoreError};
use lg_models::{ConditionReport, DefectRecord, ReportId};
use lg_storage::R2Client;
use lg_worker::{
    DefectClassifier, GeminiClient, GeminiConfig, InspectionPipeline, PipelineConfig,
    ReportAssembler, WorkerError, WorkerResult,
};

const USAGE: &str = "usage: lg-worker run <video-path> [--source <ref>] | lg-worker show <report-id>";
const ASSET_URL_TTL: Duration = Duration::from_secs(3600);

enum Command {
    Run {
        video_path: String,
        source_ref: Option<String>,
    },
    Show {
        report_id: String,
    },
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    match args.first().map(String::as_str) {
        Some("run") => {
            let video_path = args.get(1).ok_or("missing <video-path>")?.clone();
            let source_ref = match args.get(2).map(String::as_str) {
                None => None,
                Some("--source") => Some(args.get(3).ok_or("missing value for --source")?.clone()),
                Some(other) => return Err(format!("unexpected argument: {}", other)),
            };
            Ok(Command::Run {
                video_path,
                source_ref,
            })
        }
        Some("show") => Ok(Command::Show {
            report_id: args.get(1).ok_or("missing <report-id>")?.clone(),
        }),
        Some(other) => Err(format!("unknown command: {}", other)),
        None => Err("missing command".to_string()),
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lg=info"));

    // Logs go to stderr; stdout carries the JSON result
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

struct Services {
    storage: Arc<R2Client>,
    reports: Arc<ConditionReportRepository>,
}

impl Services {
    fn assembler(&self) -> ReportAssembler {
        ReportAssembler::new(self.storage.clone(), self.reports.clone())
    }
}

async fn connect_services() -> WorkerResult<Services> {
    let storage = Arc::new(R2Client::from_env()?);
    let firestore = FirestoreClient::from_env().await?;
    info!(
        bucket = storage.bucket(),
        project = %firestore.config().project_id,
        "Connected report stores"
    );
    Ok(Services {
        storage,
        reports: Arc::new(ConditionReportRepository::new(firestore)),
    })
}

async fn run_inspection(video_path: &str, source_ref: Option<String>) -> WorkerResult<String> {
    let config = PipelineConfig::from_env();
    info!("Pipeline config: {:?}", config);

    let services = connect_services().await?;
    let gemini = GeminiConfig::from_env()?.with_frame_timeout(config.classify_timeout);
    let model = Arc::new(GeminiClient::new(gemini)?);
    info!(models = ?model.models(), "Vision model ready");
    let classifier = DefectClassifier::new(model, config.classify_timeout)
        .with_concurrency(config.classify_concurrency);
    let assembler = services.assembler();
    let pipeline = InspectionPipeline::new(config, classifier, assembler);

    let bytes = tokio::fs::read(video_path).await?;
    let source_ref = source_ref.or_else(|| Some(video_path.to_string()));
    let summary = pipeline.run(&bytes, source_ref).await?;

    serde_json::to_string_pretty(&summary.response())
        .map_err(|e| WorkerError::config_error(format!("Failed to encode response: {}", e)))
}

#[derive(Serialize)]
struct DefectView<'a> {
    #[serde(flatten)]
    record: &'a DefectRecord,
    image_url: Option<String>,
}

#[derive(Serialize)]
struct ReportView<'a> {
    report_id: &'a str,
    created_at: String,
    source_ref: Option<&'a str>,
    defects: Vec<DefectView<'a>>,
}

async fn show_report(report_id: &str) -> WorkerResult<String> {
    let services = connect_services().await?;
    let id = ReportId::from_string(report_id);

    let report: ConditionReport = services
        .assembler()
        .fetch(&id)
        .await?
        .ok_or_else(|| FirestoreError::not_found(report_id))?;

    let mut defects = Vec::with_capacity(report.defects.len());
    for record in &report.defects {
        let image_url = match &record.asset_ref {
            Some(asset) => Some(services.storage.presign_get(asset.as_str(), ASSET_URL_TTL).await?),
            None => None,
        };
        defects.push(DefectView { record, image_url });
    }

    let view = ReportView {
        report_id: report.id.as_str(),
        created_at: report.created_at.to_rfc3339(),
        source_ref: report.source_ref.as_deref(),
        defects,
    };
    serde_json::to_string_pretty(&view)
        .map_err(|e| WorkerError::config_error(format!("Failed to encode report: {}", e)))
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let result = match command {
        Command::Run {
            video_path,
            source_ref,
        } => run_inspection(&video_path, source_ref).await,
        Command::Show { report_id } => show_report(&report_id).await,
    };

    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("{}", e);
            let body = serde_json::json!({ "status": "error", "error": e.user_message() });
            println!("{}", body);
            std::process::exit(1);
        }
    }
}
