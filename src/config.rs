use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration problems that must stop a run before any PDF is touched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("window size must be a positive integer, got {0}")]
    InvalidWindowSize(i64),
    #[error("missing API key: pass --openai-api-key or set {0}")]
    MissingCredential(String),
    #[error("invalid taxonomy {path}: {reason}")]
    InvalidTaxonomy { path: String, reason: String },
    #[error("invalid input directory {path}: {reason}")]
    InvalidInput { path: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub windowing: Windowing,
    #[serde(default)]
    pub voting: Voting,
    #[serde(default)]
    pub extraction: Extraction,
    #[serde(default)]
    pub ocr: Ocr,
    #[serde(default)]
    pub text: Text,
    #[serde(default)]
    pub llm: Llm,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: Default::default(),
            paths: Default::default(),
            limits: Default::default(),
            windowing: Default::default(),
            voting: Default::default(),
            extraction: Default::default(),
            ocr: Default::default(),
            text: Default::default(),
            llm: Default::default(),
            output: Default::default(),
            logging: Default::default(),
            debug: Default::default(),
            security: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Scratch space for OCR renders, log files and config dumps.
    /// Kept outside the output tree so dry runs leave it untouched.
    pub work_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            work_dir: ".estate-organizer-work".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_input_file_bytes: u64,
    pub max_input_pages: u32,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_file_bytes: 2 * 1024 * 1024 * 1024,
            max_input_pages: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Windowing {
    pub window_size: i64,
}
impl Default for Windowing {
    fn default() -> Self {
        Self { window_size: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryResolution {
    /// Declare a boundary (over-segment).
    Split,
    /// Continue the current document.
    Join,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Voting {
    /// Applied when a page has as many "new document" votes as "continuation" votes.
    pub tie: BoundaryResolution,
    /// Applied when no window produced a usable verdict for a page.
    pub unresolved: BoundaryResolution,
}
impl Default for Voting {
    fn default() -> Self {
        Self {
            tie: BoundaryResolution::Split,
            unresolved: BoundaryResolution::Join,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Extraction {
    /// Pages whose text layer has fewer non-whitespace chars than this go to OCR.
    pub min_text_chars: u32,
    /// Pages whose text layer is mostly unprintable garbage go to OCR.
    pub max_garbage_ratio: f32,
    pub remove_blank_pages: bool,
}
impl Default for Extraction {
    fn default() -> Self {
        Self {
            min_text_chars: 25,
            max_garbage_ratio: 0.2,
            remove_blank_pages: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ocr {
    pub enabled: bool,
    pub pdftoppm_exe: String,
    pub tesseract_exe: String,
    pub lang: String,
    pub dpi: u32,
    pub page_timeout_seconds: u64,
}
impl Default for Ocr {
    fn default() -> Self {
        Self {
            enabled: true,
            pdftoppm_exe: "pdftoppm".into(),
            tesseract_exe: "tesseract".into(),
            lang: "eng".into(),
            dpi: 300,
            page_timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Text {
    pub normalize_unicode: bool,
    pub normalize_newlines: bool,
    pub trim_trailing_whitespace: bool,
    pub collapse_blank_lines: bool,
    pub control_chars_to_sanitize: Vec<u8>,
}
impl Default for Text {
    fn default() -> Self {
        Self {
            normalize_unicode: true,
            normalize_newlines: true,
            trim_trailing_whitespace: true,
            collapse_blank_lines: true,
            control_chars_to_sanitize: (0u8..32).chain(std::iter::once(127)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Llm {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_seconds: u64,
    pub max_chars_per_page: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}
impl Default for Llm {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.0,
            max_tokens: 1024,
            request_timeout_seconds: 120,
            max_chars_per_page: 2000,
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteCollision {
    Skip,
    Replace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub overwrite: bool,
    pub dry_run: bool,
    /// With `overwrite`, what to do when two documents of the same run map to one path.
    pub overwrite_collisions: OverwriteCollision,
    pub write_manifest: bool,
    pub manifest_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            overwrite: false,
            dry_run: false,
            overwrite_collisions: OverwriteCollision::Skip,
            write_manifest: true,
            manifest_filename: "organizer-manifest.yaml".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub dump_effective_config: bool,
    pub log_prompts: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: false,
            log_prompts: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Security {
    pub reject_url_inputs: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
        }
    }
}
