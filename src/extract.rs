use crate::{
    config::Config,
    normalize::{garbage_ratio, non_whitespace_chars, normalize_page_text},
    ocr::Ocr,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// One page of a source PDF. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub pdf_id: String,
    pub page_index: usize,
    pub text: String,
    pub used_ocr: bool,
    /// Neither the text layer nor a successful OCR pass found any text.
    pub blank: bool,
}

/// Why a page's text layer was (or was not) replaced by OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    TextLayer,
    TooShort,
    Garbled,
    Unreadable,
}

pub struct TextExtractor<O: Ocr> {
    cfg: Config,
    ocr: O,
}

impl<O: Ocr> TextExtractor<O> {
    pub fn new(cfg: &Config, ocr: O) -> Self {
        Self {
            cfg: cfg.clone(),
            ocr,
        }
    }

    /// Extract every page of `path`. Page-level failures degrade to empty text;
    /// only a PDF that cannot be opened at all is an error.
    pub fn extract_pages(&self, pdf_id: &str, path: &Path) -> Result<Vec<Page>> {
        let meta = std::fs::metadata(path).with_context(|| "stat input")?;
        if meta.len() > self.cfg.limits.max_input_file_bytes {
            anyhow::bail!("input exceeds max_input_file_bytes: {}", meta.len());
        }

        let doc = lopdf::Document::load(path)
            .with_context(|| format!("loading PDF: {}", path.display()))?;
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();

        if page_numbers.is_empty() {
            anyhow::bail!("input has zero pages");
        }
        if page_numbers.len() > self.cfg.limits.max_input_pages as usize {
            anyhow::bail!("input exceeds max_input_pages: {}", page_numbers.len());
        }

        let mut pages = Vec::with_capacity(page_numbers.len());
        let mut ocr_count = 0usize;
        for (page_index, page_no) in page_numbers.into_iter().enumerate() {
            let layer = match doc.extract_text(&[page_no]) {
                Ok(t) => Some(normalize_page_text(&self.cfg.text, &t)),
                Err(e) => {
                    warn!("{pdf_id}: page {page_no} text layer unreadable: {e}");
                    None
                }
            };
            let page = self.finish_page(pdf_id, path, page_index, layer);
            if page.used_ocr {
                ocr_count += 1;
            }
            pages.push(page);
        }

        info!(
            "{pdf_id}: extracted {} pages ({} via OCR, {} blank)",
            pages.len(),
            ocr_count,
            pages.iter().filter(|p| p.blank).count()
        );
        Ok(pages)
    }

    /// Decide whether the text layer is good enough, and run OCR if it is not.
    pub fn finish_page(
        &self,
        pdf_id: &str,
        path: &Path,
        page_index: usize,
        layer: Option<String>,
    ) -> Page {
        let source = classify_text_layer(&self.cfg, layer.as_deref());
        let layer = layer.unwrap_or_default();

        if source == TextSource::TextLayer {
            return Page {
                pdf_id: pdf_id.to_string(),
                page_index,
                text: layer,
                used_ocr: false,
                blank: false,
            };
        }

        debug!("{pdf_id}: page {page_index} needs OCR ({source:?})");
        let ocr_text = if self.cfg.ocr.enabled {
            match self.ocr.recognize(path, page_index) {
                Ok(t) => Some(normalize_page_text(&self.cfg.text, &t)),
                Err(e) => {
                    warn!("{pdf_id}: OCR failed for page {page_index}: {e:#}");
                    None
                }
            }
        } else {
            None
        };

        match ocr_text {
            Some(text) if ocr_is_better(source, &layer, &text) => Page {
                pdf_id: pdf_id.to_string(),
                page_index,
                text,
                used_ocr: true,
                blank: false,
            },
            Some(text) => {
                let blank = non_whitespace_chars(&layer) == 0 && non_whitespace_chars(&text) == 0;
                Page {
                    pdf_id: pdf_id.to_string(),
                    page_index,
                    text: layer,
                    used_ocr: false,
                    blank,
                }
            }
            // Without a working OCR pass we cannot tell a blank page from an unread scan.
            None => Page {
                pdf_id: pdf_id.to_string(),
                page_index,
                text: layer,
                used_ocr: false,
                blank: false,
            },
        }
    }
}

/// A garbled layer loses to any cleaner OCR text; otherwise more content wins.
fn ocr_is_better(source: TextSource, layer: &str, ocr: &str) -> bool {
    let ocr_chars = non_whitespace_chars(ocr);
    match source {
        TextSource::Garbled => ocr_chars > 0 && garbage_ratio(ocr) < garbage_ratio(layer),
        _ => ocr_chars > non_whitespace_chars(layer),
    }
}

pub fn classify_text_layer(cfg: &Config, layer: Option<&str>) -> TextSource {
    let Some(text) = layer else {
        return TextSource::Unreadable;
    };
    if non_whitespace_chars(text) < cfg.extraction.min_text_chars as usize {
        TextSource::TooShort
    } else if garbage_ratio(text) > cfg.extraction.max_garbage_ratio {
        TextSource::Garbled
    } else {
        TextSource::TextLayer
    }
}
