use anyhow::{Result, bail};
use chrono::Local;
use tracing::{info, warn};

use histsalvage::{
    browser::BrowserKind,
    cli,
    config,
    export::{self, ExportFormatKind},
    logging,
    pipeline::{self, EngineContext, ExtractionRequest},
    recover::{self, RecoveryBackendKind},
};

fn main() -> Result<()> {
    let cli_opts = cli::parse();
    logging::init_logging(cli_opts.log_json);

    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let mut cfg = loaded.config;
    if let Some(path) = cli_opts.history_path.clone() {
        cfg.webkit_history_path = Some(path);
    }
    if let Some(root) = cli_opts.profiles_root.clone() {
        cfg.gecko_profiles_root = Some(root);
    }
    if let Some(backend) = cli_opts.recovery_backend {
        cfg.recovery_backend = RecoveryBackendKind::from(backend);
    }
    if let Some(output) = cli_opts.output.clone() {
        cfg.output_dir = output;
    }
    if cli_opts.keep_working_files {
        cfg.keep_working_files = true;
    }

    let kind = BrowserKind::from(cli_opts.browser);
    let mut request =
        ExtractionRequest::from_dates(kind, cli_opts.start, cli_opts.end, cli_opts.include_deleted)?;
    request.keep_working_files = cfg.keep_working_files;

    let working_dir = cfg.working_dir();
    info!(
        "starting run_id={} browser={} include_deleted={} working_dir={} config_sha256={}",
        cfg.run_id,
        kind,
        request.include_deleted,
        working_dir.display(),
        loaded.config_hash
    );

    let recoverer = recover::build_recoverer(cfg.recovery_backend, &cfg.sqlite_binary);
    if request.include_deleted {
        info!("recovery backend: {}", recoverer.name());
    }
    let ctx = EngineContext {
        working_dir,
        recoverer: recoverer.as_ref(),
    };

    let outcomes = pipeline::run(&request, &ctx, &cfg.store_locations(), cfg.workers());

    let mut per_profile = Vec::new();
    let mut failures = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(extraction) => per_profile.push(extraction.records.clone()),
            Err(err) => {
                failures += 1;
                let store = outcome
                    .store_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                eprintln!("{} history unavailable {store}: {err}", kind.display_name());
                if err.is_storage_failure() {
                    if let Err(log_err) = export::append_error_log(&cfg.error_log_path, kind, err) {
                        warn!(
                            "could not write {}: {log_err}",
                            cfg.error_log_path.display()
                        );
                    }
                }
            }
        }
    }
    if failures == outcomes.len() {
        bail!("no {} history could be extracted", kind.display_name());
    }

    let records = pipeline::merge_newest_first(per_profile);
    if !cli_opts.quiet {
        print!("{}", export::render_text(&records));
    }

    let format = ExportFormatKind::from(cli_opts.format);
    std::fs::create_dir_all(&cfg.output_dir)?;
    let export_path = cfg
        .output_dir
        .join(export::export_file_name(kind, &Local::now(), format));
    export::export_records(format, kind, &export_path, &records)?;
    println!(
        "{} history exported to '{}'",
        kind.display_name(),
        export_path.display()
    );

    info!("histsalvage run finished: {} record(s)", records.len());
    Ok(())
}
