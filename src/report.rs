use crate::organize::{ActionKind, ActionOutcome, ActionStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started: String,
    pub finished: String,
    pub dry_run: bool,
    pub pdfs: Vec<PdfReport>,
}

impl RunReport {
    pub fn failed_pdfs(&self) -> usize {
        self.pdfs.iter().filter(|p| p.error.is_some()).count()
    }

    pub fn failed_actions(&self) -> usize {
        self.pdfs
            .iter()
            .flat_map(|p| p.outcomes.iter())
            .filter(|o| o.is_failed())
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_pdfs() == 0 && self.failed_actions() == 0
    }

    /// Flat, human-oriented listing of every document, as written to the manifest.
    pub fn manifest(&self) -> Manifest {
        let mut documents = Vec::new();
        let mut failures = Vec::new();
        for pdf in &self.pdfs {
            if let Some(e) = &pdf.error {
                failures.push(ManifestFailure {
                    source_pdf: pdf.source.clone(),
                    document: None,
                    error: e.clone(),
                });
            }
            for o in &pdf.outcomes {
                let doc = &o.action.document;
                if let ActionStatus::Failed { error } = &o.status {
                    failures.push(ManifestFailure {
                        source_pdf: pdf.source.clone(),
                        document: Some(format!("pages {}-{}", doc.start + 1, doc.end)),
                        error: error.clone(),
                    });
                }
                documents.push(ManifestDocument {
                    source_pdf: pdf.source.clone(),
                    start_page: doc.start + 1,
                    end_page: doc.end,
                    document_type: doc.category.clone(),
                    filename: o
                        .action
                        .destination
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    confidence: doc.confidence(),
                    fallback: doc.source.fallback,
                    output_path: o.action.destination.display().to_string(),
                    action: o.action.kind,
                    status: o.status.clone(),
                });
            }
        }
        Manifest {
            run_id: self.run_id.clone(),
            started: self.started.clone(),
            finished: self.finished.clone(),
            documents,
            failures,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfReport {
    pub source: String,
    pub sha256: Option<String>,
    pub page_count: usize,
    pub ocr_pages: usize,
    pub windows: usize,
    pub undetermined_windows: usize,
    pub fallback_labels: usize,
    pub outcomes: Vec<ActionOutcome>,
    pub error: Option<String>,
}

impl PdfReport {
    pub fn failed(source: String, sha256: Option<String>, error: String) -> Self {
        Self {
            source,
            sha256,
            page_count: 0,
            ocr_pages: 0,
            windows: 0,
            undetermined_windows: 0,
            fallback_labels: 0,
            outcomes: Vec::new(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: String,
    pub started: String,
    pub finished: String,
    pub documents: Vec<ManifestDocument>,
    pub failures: Vec<ManifestFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestDocument {
    pub source_pdf: String,
    pub start_page: usize, // 1-based inclusive
    pub end_page: usize,   // 1-based inclusive
    pub document_type: String,
    pub filename: String,
    pub confidence: f32,
    pub fallback: bool,
    pub output_path: String,
    pub action: ActionKind,
    #[serde(flatten)]
    pub status: ActionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFailure {
    pub source_pdf: String,
    pub document: Option<String>,
    pub error: String,
}
