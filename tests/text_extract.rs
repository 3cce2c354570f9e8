mod common;

use anyhow::{anyhow, Result};
use estate_organizer::{
    config::Config,
    extract::{classify_text_layer, TextExtractor, TextSource},
    normalize::normalize_page_text,
    ocr::{NoOcr, Ocr},
};
use std::path::Path;

struct FixedOcr(&'static str);

impl Ocr for FixedOcr {
    fn recognize(&self, _pdf: &Path, _page_index: usize) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct BrokenOcr;

impl Ocr for BrokenOcr {
    fn recognize(&self, _pdf: &Path, _page_index: usize) -> Result<String> {
        Err(anyhow!("tesseract exploded"))
    }
}

struct PanickingOcr;

impl Ocr for PanickingOcr {
    fn recognize(&self, _pdf: &Path, _page_index: usize) -> Result<String> {
        panic!("OCR must not run");
    }
}

const GOOD_LAYER: &str = "LAST WILL AND TESTAMENT of Jane Doe, being of sound mind";

#[test]
fn classify_layers() {
    let cfg = Config::default();
    assert_eq!(classify_text_layer(&cfg, None), TextSource::Unreadable);
    assert_eq!(classify_text_layer(&cfg, Some("  p. 3 ")), TextSource::TooShort);
    assert_eq!(classify_text_layer(&cfg, Some(GOOD_LAYER)), TextSource::TextLayer);
    let mojibake = format!("{}ab", "\u{fffd}".repeat(26));
    assert_eq!(classify_text_layer(&cfg, Some(&mojibake)), TextSource::Garbled);
}

#[test]
fn good_text_layer_skips_ocr() {
    let ocr = FixedOcr("ocr text that should never be used");
    let extractor = TextExtractor::new(&Config::default(), ocr);
    let page = extractor.finish_page("a.pdf", Path::new("a.pdf"), 0, Some(GOOD_LAYER.into()));
    assert_eq!(page.text, GOOD_LAYER);
    assert!(!page.used_ocr);
    assert!(!page.blank);
}

#[test]
fn short_layer_is_replaced_by_richer_ocr() {
    let ocr = FixedOcr("DEED OF TRUST recorded in the county of Somewhere");
    let extractor = TextExtractor::new(&Config::default(), ocr);
    let page = extractor.finish_page("a.pdf", Path::new("a.pdf"), 2, Some("DEED".into()));
    assert!(page.used_ocr);
    assert!(page.text.starts_with("DEED OF TRUST"));
    assert_eq!(page.page_index, 2);
}

#[test]
fn poorer_ocr_keeps_the_layer() {
    let extractor = TextExtractor::new(&Config::default(), FixedOcr("D"));
    let page = extractor.finish_page("a.pdf", Path::new("a.pdf"), 0, Some("DEED".into()));
    assert!(!page.used_ocr);
    assert_eq!(page.text, "DEED");
}

#[test]
fn garbled_layer_loses_to_clean_ocr() {
    let garbled = "\u{fffd}\u{25a1}".repeat(40);
    let extractor = TextExtractor::new(
        &Config::default(),
        FixedOcr("LAST WILL AND TESTAMENT of Jane Doe"),
    );
    let page = extractor.finish_page("a.pdf", Path::new("a.pdf"), 0, Some(garbled));
    assert!(page.used_ocr);
    assert_eq!(page.text, "LAST WILL AND TESTAMENT of Jane Doe");
}

#[test]
fn garbled_layer_kept_when_ocr_is_empty() {
    let garbled = "\u{fffd}\u{25a1}".repeat(40);
    let extractor = TextExtractor::new(&Config::default(), FixedOcr("   "));
    let page = extractor.finish_page("a.pdf", Path::new("a.pdf"), 0, Some(garbled.clone()));
    assert!(!page.used_ocr);
    assert!(!page.blank);
    assert_eq!(page.text, garbled);
}

#[test]
fn blank_only_when_ocr_confirms() {
    let extractor = TextExtractor::new(&Config::default(), FixedOcr("  \n "));
    let page = extractor.finish_page("a.pdf", Path::new("a.pdf"), 0, Some(String::new()));
    assert!(page.blank);
    assert!(page.text.is_empty());

    let extractor = TextExtractor::new(&Config::default(), BrokenOcr);
    let page = extractor.finish_page("a.pdf", Path::new("a.pdf"), 0, None);
    assert!(!page.blank);
    assert!(!page.used_ocr);
    assert!(page.text.is_empty());
}

#[test]
fn disabled_ocr_is_never_called() {
    let mut cfg = Config::default();
    cfg.ocr.enabled = false;
    let extractor = TextExtractor::new(&cfg, PanickingOcr);
    let page = extractor.finish_page("a.pdf", Path::new("a.pdf"), 0, Some(String::new()));
    assert!(!page.blank);
    assert!(!page.used_ocr);
}

#[test]
fn normalization_cleans_page_text() {
    let cfg = Config::default();
    let raw = "Bene\u{fb01}ciary:\r\nJohn\u{0007} Doe   \r\n\r\n\r\n\r\nSigned";
    let text = normalize_page_text(&cfg.text, raw);
    assert_eq!(text, "Beneficiary:\nJohn Doe\n\nSigned");
}

#[test]
fn extracts_every_page_of_a_real_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("bundle.pdf");
    common::write_pdf(&pdf, &["first page", "second page", "third page"]);

    let extractor = TextExtractor::new(&common::test_config(), NoOcr);
    let pages = extractor.extract_pages("bundle.pdf", &pdf).unwrap();
    assert_eq!(pages.len(), 3);
    for (i, p) in pages.iter().enumerate() {
        assert_eq!(p.page_index, i);
        assert_eq!(p.pdf_id, "bundle.pdf");
        assert!(!p.used_ocr);
    }
}

#[test]
fn page_limit_rejects_large_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("big.pdf");
    common::write_pdf(&pdf, &["a", "b", "c"]);

    let mut cfg = common::test_config();
    cfg.limits.max_input_pages = 2;
    let extractor = TextExtractor::new(&cfg, NoOcr);
    assert!(extractor.extract_pages("big.pdf", &pdf).is_err());
}
