use crate::{
    config::{Config, ConfigError},
    extract::TextExtractor,
    ocr::{NoOcr, Ocr, TesseractOcr},
    oracle::{openai::OpenAiClient, LlmOracle},
    pipeline::Pipeline,
    report::RunReport,
    taxonomy::Taxonomy,
    util::{command_available, ensure_dir},
    window::Windower,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "estate-organizer")]
#[command(about = "Split scanned estate PDFs into documents and file them by category")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./estate-organizer.toml if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check OCR tools and credentials.
    Doctor {},
    /// Print the page windows that would be sent to the oracle.
    Plan {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, allow_negative_numbers = true)]
        window_size: Option<i64>,
    },
    /// Print the per-page text (with OCR fallback) of one PDF.
    Extract {
        #[arg(long)]
        input: PathBuf,
    },
    /// Classify and organize every PDF in a directory.
    Run {
        /// Directory containing input PDFs.
        input_dir: PathBuf,
        /// Directory to store organized documents.
        output_dir: PathBuf,
        /// YAML file with the document taxonomy.
        #[arg(long)]
        taxonomy: PathBuf,
        /// API key; falls back to the environment variable named by llm.api_key_env.
        #[arg(long)]
        openai_api_key: Option<String>,
        /// Replace files that already exist in the output directory.
        #[arg(long)]
        overwrite: bool,
        /// Show what would be done without touching the output directory.
        #[arg(long)]
        dry_run: bool,
        /// Pages per oracle window.
        #[arg(long, allow_negative_numbers = true)]
        window_size: Option<i64>,
        /// Keep blank pages in extracted documents.
        #[arg(long)]
        keep_blank_pages: bool,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let loaded = match resolve_config_path(args.config.as_deref()) {
        Some(p) => Config::load(&p),
        None => Ok(Config::default()),
    };
    let mut cfg = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            // Still report the failure through the usual logging path.
            let _ = init_logging(&args, &Config::default(), None);
            return Err(e);
        }
    };
    let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg).as_deref())?;

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Plan { input, window_size } => {
            if let Some(w) = window_size {
                cfg.windowing.window_size = *w;
            }
            plan(&cfg, input)
        }
        Command::Extract { input } => extract(&cfg, input),
        Command::Run {
            input_dir,
            output_dir,
            taxonomy,
            openai_api_key,
            overwrite,
            dry_run,
            window_size,
            keep_blank_pages,
        } => {
            cfg.output.overwrite |= *overwrite;
            cfg.output.dry_run |= *dry_run;
            if let Some(w) = window_size {
                cfg.windowing.window_size = *w;
            }
            if *keep_blank_pages {
                cfg.extraction.remove_blank_pages = false;
            }
            run(&cfg, input_dir, output_dir, taxonomy, openai_api_key.as_deref())
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("estate-organizer.toml");
    default.exists().then_some(default)
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries JSON results; logs go to stderr.
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from(&cfg.paths.work_dir).join("estate-organizer.log"))
}

fn build_ocr(cfg: &Config) -> Box<dyn Ocr> {
    if cfg.ocr.enabled {
        Box::new(TesseractOcr::new(cfg))
    } else {
        Box::new(NoOcr)
    }
}

fn resolve_api_key(cfg: &Config, flag: Option<&str>) -> Result<String, ConfigError> {
    if let Some(k) = flag.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(k.to_string());
    }
    std::env::var(&cfg.llm.api_key_env)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ConfigError::MissingCredential(cfg.llm.api_key_env.clone()))
}

fn doctor(cfg: &Config) -> Result<()> {
    let diag = serde_json::json!({
        "pdftoppm": command_available(&cfg.ocr.pdftoppm_exe),
        "tesseract": command_available(&cfg.ocr.tesseract_exe),
        "ocr_enabled": cfg.ocr.enabled,
        "api_key_env": cfg.llm.api_key_env,
        "api_key_present": resolve_api_key(cfg, None).is_ok(),
        "model": cfg.llm.model,
        "base_url": cfg.llm.base_url,
        "window_size": cfg.windowing.window_size,
    });
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(())
}

fn plan(cfg: &Config, input: &Path) -> Result<()> {
    validate_pdf_input(cfg, input)?;
    let windower = Windower::new(cfg.windowing.window_size)?;
    let doc = lopdf::Document::load(input)
        .with_context(|| format!("loading PDF: {}", input.display()))?;
    let page_count = doc.get_pages().len();
    let spans: Vec<_> = windower.spans(page_count).collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": input,
            "page_count": page_count,
            "window_size": windower.size(),
            "stride": windower.stride(),
            "windows": spans,
        }))?
    );
    Ok(())
}

fn extract(cfg: &Config, input: &Path) -> Result<()> {
    validate_pdf_input(cfg, input)?;
    let extractor = TextExtractor::new(cfg, build_ocr(cfg));
    let pdf_id = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pages = extractor.extract_pages(&pdf_id, input)?;
    println!("{}", serde_json::to_string_pretty(&pages)?);
    Ok(())
}

fn run(
    cfg: &Config,
    input_dir: &Path,
    output_dir: &Path,
    taxonomy_path: &Path,
    api_key_flag: Option<&str>,
) -> Result<()> {
    // Every configuration problem surfaces here, before the first PDF is opened.
    validate_input_dir(cfg, input_dir)?;
    Windower::new(cfg.windowing.window_size)?;
    let taxonomy = Taxonomy::load(taxonomy_path)?;
    let api_key = resolve_api_key(cfg, api_key_flag)?;

    info!(
        "taxonomy: {} categories, fallback {:?}",
        taxonomy.categories().len(),
        taxonomy.fallback()
    );

    if cfg.ocr.enabled
        && !(command_available(&cfg.ocr.pdftoppm_exe) && command_available(&cfg.ocr.tesseract_exe))
    {
        warn!("pdftoppm/tesseract not found; image-only pages will have no text");
    }

    if cfg.debug.dump_effective_config {
        let work_dir = Path::new(&cfg.paths.work_dir);
        ensure_dir(work_dir)?;
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(work_dir.join("effective-config.toml"), raw)?;
    }

    let oracle = LlmOracle::new(cfg, OpenAiClient::new(cfg, api_key)?);
    let pipeline = Pipeline::new(cfg, taxonomy, oracle, build_ocr(cfg))?;
    let report = pipeline.run(input_dir, output_dir)?;

    if cfg.global.print_summary {
        println!("{}", serde_json::to_string_pretty(&summary(&report))?);
    }

    if !report.is_success() {
        return Err(anyhow!(
            "{} PDF(s) failed and {} document(s) could not be written",
            report.failed_pdfs(),
            report.failed_actions()
        ));
    }
    Ok(())
}

fn summary(report: &RunReport) -> serde_json::Value {
    let manifest = report.manifest();
    serde_json::json!({
        "run_id": report.run_id,
        "dry_run": report.dry_run,
        "pdfs": report.pdfs.len(),
        "documents": manifest.documents.len(),
        "failed_pdfs": report.failed_pdfs(),
        "failed_actions": report.failed_actions(),
        "actions": manifest.documents,
        "failures": manifest.failures,
        "status": if report.is_success() { "ok" } else { "failed" },
    })
}

fn validate_input_dir(cfg: &Config, input: &Path) -> Result<(), ConfigError> {
    let input_str = input.display().to_string();
    let invalid = |reason: &str| ConfigError::InvalidInput {
        path: input_str.clone(),
        reason: reason.to_string(),
    };

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(invalid("URL inputs are disabled"));
    }
    if !input.exists() {
        return Err(invalid("does not exist"));
    }
    if !input.is_dir() {
        return Err(invalid("not a directory"));
    }
    Ok(())
}

fn validate_pdf_input(cfg: &Config, input: &Path) -> Result<()> {
    let input_str = input.display().to_string();

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }

    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    if let Some(ext) = input.extension().and_then(|s| s.to_str()) {
        if !ext.eq_ignore_ascii_case("pdf") {
            return Err(anyhow!("input is not a PDF: {}", input.display()));
        }
    } else {
        warn!("input has no extension; assuming PDF: {}", input.display());
    }

    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}
