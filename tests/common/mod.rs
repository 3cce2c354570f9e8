#![allow(dead_code)]

use estate_organizer::{
    config::Config,
    extract::Page,
    merge::{Document, DocumentSource},
    oracle::{prompt, BoundaryVerdict, Oracle, OracleError, PageVote, VerdictStatus},
    taxonomy::Taxonomy,
    window::Window,
};
use lopdf::{
    content::{Content, Operation},
    dictionary, Object, Stream,
};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::Path;

/// Write a PDF with one line of text per page.
pub fn write_pdf(path: &Path, texts: &[&str]) {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => texts.len() as i64,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    doc.save(path).unwrap();
}

pub fn page_count(path: &Path) -> usize {
    lopdf::Document::load(path).unwrap().get_pages().len()
}

pub fn pages(pdf_id: &str, n: usize) -> Vec<Page> {
    (0..n)
        .map(|i| Page {
            pdf_id: pdf_id.to_string(),
            page_index: i,
            text: format!("text of page {}", i + 1),
            used_ocr: false,
            blank: false,
        })
        .collect()
}

pub fn taxonomy(names: &[&str]) -> Taxonomy {
    Taxonomy::new(names.iter().map(|s| s.to_string()).collect(), None).unwrap()
}

/// Config with OCR off and every text layer accepted as is.
pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.ocr.enabled = false;
    cfg.extraction.min_text_chars = 0;
    cfg.extraction.max_garbage_ratio = 1.0;
    cfg.global.print_summary = false;
    cfg
}

/// A verdict where `starts` lists the pages voted as document starts and
/// `cats[i]` is the label for page `start + i`.
pub fn verdict(id: usize, start: usize, end: usize, starts: &[usize], cats: &[&str]) -> BoundaryVerdict {
    BoundaryVerdict {
        window_id: id,
        start,
        end,
        status: VerdictStatus::Determined,
        votes: (start..end)
            .map(|p| PageVote {
                page_index: p,
                starts_document: starts.contains(&p),
                category: cats.get(p - start).map(|c| c.to_string()),
            })
            .collect(),
        fallback_labels: Vec::new(),
    }
}

pub fn document(pdf_id: &str, start: usize, end: usize, category: &str) -> Document {
    Document {
        pdf_id: pdf_id.to_string(),
        start,
        end,
        category: category.to_string(),
        source: DocumentSource {
            windows: BTreeSet::from([0]),
            category_votes: 1,
            total_votes: 1,
            fallback: false,
        },
    }
}

/// Answers from fixed per-page boundaries and labels, through the real response parser.
pub struct StubOracle {
    pub starts: BTreeSet<usize>,
    pub labels: Vec<String>,
    pub fail_windows: BTreeSet<usize>,
    pub calls: RefCell<Vec<(usize, usize, usize)>>,
}

impl StubOracle {
    pub fn new(starts: &[usize], labels: &[&str]) -> Self {
        Self {
            starts: starts.iter().copied().collect(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            fail_windows: BTreeSet::new(),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl Oracle for StubOracle {
    fn evaluate(&self, window: &Window, taxonomy: &Taxonomy) -> Result<BoundaryVerdict, OracleError> {
        self.calls
            .borrow_mut()
            .push((window.id, window.start, window.end));
        if self.fail_windows.contains(&window.id) {
            return Err(OracleError::Malformed("stubbed failure".into()));
        }
        let pages: Vec<serde_json::Value> = (window.start..window.end)
            .map(|p| {
                serde_json::json!({
                    "page": p + 1,
                    "starts_new_document": self.starts.contains(&p),
                    "category": self.labels.get(p).cloned().unwrap_or_default(),
                })
            })
            .collect();
        let raw = serde_json::json!({ "pages": pages }).to_string();
        prompt::parse_verdict(window, taxonomy, &raw)
    }
}
