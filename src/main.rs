mod config;
mod error;
mod harvest;
mod heuristics;
mod pdf_text;
mod portal;
mod sheet_store;
mod slip_db;

use config::{Config, DEFAULT_CONFIG_PATH, SourceConfig};
use harvest::Harvester;
use pdf_text::PdfTextDecoder;
use portal::{DirectorySource, DocumentSource, PortalSource};
use sheet_store::AppsScriptStore;
use slip_db::SlipJournal;
use std::path::PathBuf;
use std::sync::Arc;
use std::{env, fs};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: packslip_harvest [run [config]] | extract <file.pdf> \
    | set-cookie <cookie> [config] | history <document> [config]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None | Some("run") => run(config_path(args.get(1))).await,
        Some("extract") => {
            let pdf = args.get(1).ok_or(USAGE)?;
            pdf_text::inspect_pdf(pdf, &PdfTextDecoder)
        }
        Some("set-cookie") => {
            let cookie = args.get(1).ok_or(USAGE)?;
            let path = config_path(args.get(2));
            Config::update_cookie(&path, cookie)?;
            info!(config = %path.display(), "Session cookie updated");
            Ok(())
        }
        Some("history") => {
            let location = args.get(1).ok_or(USAGE)?;
            history(location, config_path(args.get(2)))
        }
        Some(other) => Err(format!("unknown command `{other}`\n{USAGE}").into()),
    }
}

/// CLI argument, then `PACKSLIP_CONFIG`, then the default location.
fn config_path(arg: Option<&String>) -> PathBuf {
    arg.map(PathBuf::from)
        .or_else(|| env::var_os("PACKSLIP_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

async fn run(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::load(&config_path)?;
    info!(config = %config_path.display(), "Configuration loaded");

    let source: Box<dyn DocumentSource> = match &cfg.source {
        SourceConfig::Portal(portal) => Box::new(PortalSource::new(portal)?),
        SourceConfig::Directory { path } => Box::new(DirectorySource::new(path)),
    };
    let store = Arc::new(AppsScriptStore::new(&cfg.store.script_url));

    let mut harvester =
        Harvester::new(source, Box::new(PdfTextDecoder), store).with_run_config(&cfg.run);

    if let Some(journal_path) = &cfg.run.journal_path {
        if let Some(dir) = journal_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        harvester = harvester.with_journal(SlipJournal::new(journal_path)?);
    }

    let report = match harvester.run().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Run aborted");
            return Err(e.into());
        }
    };

    if let Some(journal) = harvester.journal() {
        let counts = journal.counts()?;
        info!(
            documents_total = counts.documents,
            documents_failed = counts.failed_documents,
            submitted_total = counts.submitted,
            duplicates_total = counts.duplicates,
            failed_total = counts.failed_submissions,
            "Journal statistics"
        );
    }

    println!("Done! Processed {} pack-slip(s).", report.processed);
    Ok(())
}

/// Print what the journal recorded for one document URL or path.
fn history(location: &str, config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::load(&config_path)?;
    let journal_path = cfg
        .run
        .journal_path
        .ok_or("no journal_path configured under [run]")?;
    let journal = SlipJournal::new(journal_path)?;

    let uid = SlipJournal::document_uid(location);
    for row in journal.submissions_for(&uid)? {
        println!(
            "#{} {} po={} items={} qty={} date={} prov={} ship_to={} {}",
            row.id,
            row.outcome,
            row.purchase_order,
            row.item_number,
            row.quantity,
            row.order_date,
            row.province,
            row.ship_to,
            row.error.as_deref().unwrap_or_default(),
        );
    }
    info!(document = %location, uid = %uid, "History printed");
    Ok(())
}
