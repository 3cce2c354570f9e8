use crate::{
    config::{Config, OverwriteCollision},
    extract::Page,
    merge::Document,
    util::{ensure_dir, sanitize_component},
};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// The document is the whole source; copy the file as is.
    Copy,
    /// Write the document's pages into a new PDF.
    ExtractPages,
    /// Another document of this run already owns the destination.
    SkipExists,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizeAction {
    pub document: Document,
    pub destination: PathBuf,
    pub kind: ActionKind,
    /// The destination existed before it was written (overwrite mode).
    pub replaces_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Planned,
    Written,
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: OrganizeAction,
    #[serde(flatten)]
    pub status: ActionStatus,
}

impl ActionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ActionStatus::Failed { .. })
    }
}

/// Places documents under `output_root/<category>/`. One organizer serves a whole
/// run so that destinations stay unique across source PDFs.
pub struct Organizer {
    output_root: PathBuf,
    overwrite: bool,
    overwrite_collisions: OverwriteCollision,
    dry_run: bool,
    remove_blank_pages: bool,
    reserved: HashSet<PathBuf>,
}

impl Organizer {
    pub fn new(cfg: &Config, output_root: &Path) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            overwrite: cfg.output.overwrite,
            overwrite_collisions: cfg.output.overwrite_collisions,
            dry_run: cfg.output.dry_run,
            remove_blank_pages: cfg.extraction.remove_blank_pages,
            reserved: HashSet::new(),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Decide where every document goes. Identical in dry-run and normal mode.
    pub fn plan(&mut self, source: &Path, pages: &[Page], documents: &[Document]) -> Vec<OrganizeAction> {
        let stem = source
            .file_stem()
            .map(|s| sanitize_component(&s.to_string_lossy()))
            .unwrap_or_else(|| "document".to_string());

        let mut actions = Vec::with_capacity(documents.len());
        for doc in documents {
            let whole = doc.start == 0 && doc.end == pages.len();
            let filename = if whole {
                format!("{stem}.pdf")
            } else {
                format!("{stem}_pages_{}-{}.pdf", doc.start + 1, doc.end)
            };
            let dir = self.output_root.join(sanitize_component(&doc.category));
            let has_blank =
                self.remove_blank_pages && pages[doc.start..doc.end].iter().any(|p| p.blank);
            let kind = if whole && !has_blank {
                ActionKind::Copy
            } else {
                ActionKind::ExtractPages
            };
            actions.push(self.claim(doc.clone(), &dir, &filename, kind));
        }
        actions
    }

    fn claim(&mut self, document: Document, dir: &Path, filename: &str, kind: ActionKind) -> OrganizeAction {
        let base = dir.join(filename);

        if self.overwrite {
            if self.reserved.contains(&base) {
                return match self.overwrite_collisions {
                    OverwriteCollision::Skip => OrganizeAction {
                        document,
                        destination: base,
                        kind: ActionKind::SkipExists,
                        replaces_existing: false,
                    },
                    OverwriteCollision::Replace => OrganizeAction {
                        document,
                        destination: base,
                        kind,
                        replaces_existing: true,
                    },
                };
            }
            let replaces_existing = base.exists();
            self.reserved.insert(base.clone());
            return OrganizeAction {
                document,
                destination: base,
                kind,
                replaces_existing,
            };
        }

        let destination = self.disambiguate(dir, filename);
        self.reserved.insert(destination.clone());
        OrganizeAction {
            document,
            destination,
            kind,
            replaces_existing: false,
        }
    }

    fn disambiguate(&self, dir: &Path, filename: &str) -> PathBuf {
        let taken = |p: &Path| self.reserved.contains(p) || p.exists();
        let base = dir.join(filename);
        if !taken(&base) {
            return base;
        }
        let (stem, ext) = match filename.rsplit_once('.') {
            Some((s, e)) => (s, format!(".{e}")),
            None => (filename, String::new()),
        };
        let mut n = 1usize;
        loop {
            let candidate = dir.join(format!("{stem}_{n}{ext}"));
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Carry out planned actions. A failure is recorded and the rest still run.
    pub fn execute(&mut self, source: &Path, pages: &[Page], actions: Vec<OrganizeAction>) -> Vec<ActionOutcome> {
        if self.dry_run {
            return actions
                .into_iter()
                .map(|action| {
                    info!(
                        "[dry-run] {:?} pages {}-{} -> {}",
                        action.kind,
                        action.document.start + 1,
                        action.document.end,
                        action.destination.display()
                    );
                    let status = match action.kind {
                        ActionKind::SkipExists => ActionStatus::Skipped,
                        _ => ActionStatus::Planned,
                    };
                    ActionOutcome { action, status }
                })
                .collect();
        }

        let needs_pdf = actions.iter().any(|a| a.kind == ActionKind::ExtractPages);
        let loaded = if needs_pdf {
            Some(
                lopdf::Document::load(source)
                    .map_err(|e| format!("loading {}: {e}", source.display())),
            )
        } else {
            None
        };

        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            let kind = action.kind;
            let result = match kind {
                ActionKind::SkipExists => {
                    info!(
                        "skip pages {}-{}: {} already written in this run",
                        action.document.start + 1,
                        action.document.end,
                        action.destination.display()
                    );
                    outcomes.push(ActionOutcome {
                        action,
                        status: ActionStatus::Skipped,
                    });
                    continue;
                }
                ActionKind::Copy => write_atomically(&action.destination, |tmp| {
                    std::fs::copy(source, tmp)
                        .map(|_| ())
                        .with_context(|| format!("copying {}", source.display()))
                }),
                ActionKind::ExtractPages => match &loaded {
                    Some(Ok(doc)) => {
                        let keep = self.pages_to_keep(pages, &action.document);
                        write_atomically(&action.destination, |tmp| write_page_range(doc, &keep, tmp))
                    }
                    Some(Err(e)) => Err(anyhow!("{e}")),
                    None => Err(anyhow!("source PDF not loaded")),
                },
            };

            let status = match result {
                Ok(()) => {
                    info!(
                        "{} pages {}-{} -> {}",
                        action.document.category,
                        action.document.start + 1,
                        action.document.end,
                        action.destination.display()
                    );
                    ActionStatus::Written
                }
                Err(e) => {
                    warn!("failed to write {}: {:#}", action.destination.display(), e);
                    self.reserved.remove(&action.destination);
                    ActionStatus::Failed {
                        error: format!("{e:#}"),
                    }
                }
            };
            outcomes.push(ActionOutcome { action, status });
        }
        outcomes
    }

    fn pages_to_keep(&self, pages: &[Page], doc: &Document) -> Vec<usize> {
        let range: Vec<usize> = (doc.start..doc.end).collect();
        if !self.remove_blank_pages {
            return range;
        }
        let kept: Vec<usize> = range
            .iter()
            .copied()
            .filter(|&i| !pages.get(i).is_some_and(|p| p.blank))
            .collect();
        // An all-blank document is still written rather than dropped.
        if kept.is_empty() { range } else { kept }
    }
}

/// Write through a hidden sibling temp file so only complete files get the real name.
fn write_atomically<F>(destination: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let dir = destination
        .parent()
        .ok_or_else(|| anyhow!("destination has no parent: {}", destination.display()))?;
    ensure_dir(dir)?;
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{name}.partial"));

    let result = write(&tmp).and_then(|()| {
        std::fs::rename(&tmp, destination)
            .with_context(|| format!("renaming into {}", destination.display()))
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn write_page_range(source: &lopdf::Document, keep: &[usize], out: &Path) -> Result<()> {
    let page_numbers: Vec<u32> = source.get_pages().keys().copied().collect();
    let keep: HashSet<u32> = keep
        .iter()
        .filter_map(|&i| page_numbers.get(i).copied())
        .collect();
    if keep.is_empty() {
        return Err(anyhow!("page range is outside the source PDF"));
    }
    let delete: Vec<u32> = page_numbers
        .iter()
        .copied()
        .filter(|n| !keep.contains(n))
        .collect();

    let mut doc = source.clone();
    doc.delete_pages(&delete);
    doc.prune_objects();
    doc.compress();
    doc.save(out)
        .with_context(|| format!("saving {}", out.display()))?;
    Ok(())
}
