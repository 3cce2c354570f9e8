use crate::{
    config::{Config, ConfigError},
    extract::{Page, TextExtractor},
    merge::{self, Document},
    ocr::Ocr,
    oracle::{BoundaryVerdict, Oracle},
    organize::Organizer,
    report::{PdfReport, RunReport},
    taxonomy::Taxonomy,
    util::{ensure_dir, hash_file, list_pdfs, now_rfc3339, sha256_hex},
    window::Windower,
};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};

pub struct Pipeline<O: Oracle, R: Ocr> {
    cfg: Config,
    taxonomy: Taxonomy,
    windower: Windower,
    extractor: TextExtractor<R>,
    oracle: O,
}

/// Verdicts and the documents merged from them, for one PDF.
pub struct Segmentation {
    pub verdicts: Vec<BoundaryVerdict>,
    pub documents: Vec<Document>,
}

impl<O: Oracle, R: Ocr> Pipeline<O, R> {
    pub fn new(cfg: &Config, taxonomy: Taxonomy, oracle: O, ocr: R) -> Result<Self, ConfigError> {
        Ok(Self {
            cfg: cfg.clone(),
            taxonomy,
            windower: Windower::new(cfg.windowing.window_size)?,
            extractor: TextExtractor::new(cfg, ocr),
            oracle,
        })
    }

    pub fn run(&self, input_dir: &Path, output_dir: &Path) -> Result<RunReport> {
        if !input_dir.is_dir() {
            return Err(ConfigError::InvalidInput {
                path: input_dir.display().to_string(),
                reason: "not a directory".into(),
            }
            .into());
        }

        let started = now_rfc3339();
        let dry_run = self.cfg.output.dry_run;
        let inputs = list_pdfs(input_dir)?;
        info!(
            "found {} PDFs in {} (dry_run={})",
            inputs.len(),
            input_dir.display(),
            dry_run
        );

        let hashes: Vec<Option<String>> = inputs
            .iter()
            .map(|p| match hash_file(p) {
                Ok(h) => Some(h),
                Err(e) => {
                    warn!("hashing {}: {:#}", p.display(), e);
                    None
                }
            })
            .collect();
        let run_id = {
            let mut key = self.cfg.normalized_for_hash();
            for h in hashes.iter().flatten() {
                key.push(':');
                key.push_str(h);
            }
            sha256_hex(key.as_bytes())
        };
        info!("run_id={run_id} out={}", output_dir.display());

        if !dry_run {
            ensure_dir(output_dir)?;
        }

        let mut organizer = Organizer::new(&self.cfg, output_dir);
        let mut pdfs = Vec::with_capacity(inputs.len());
        for (path, sha) in inputs.iter().zip(hashes) {
            pdfs.push(self.process_pdf(&mut organizer, path, sha));
        }

        let report = RunReport {
            run_id,
            started,
            finished: now_rfc3339(),
            dry_run,
            pdfs,
        };

        if !dry_run && self.cfg.output.write_manifest {
            let path = output_dir.join(&self.cfg.output.manifest_filename);
            let raw = serde_yaml::to_string(&report.manifest())?;
            std::fs::write(&path, raw)
                .with_context(|| format!("writing manifest: {}", path.display()))?;
        }

        Ok(report)
    }

    /// Extract, segment and organize one PDF. Failures end up in the report, not in `Err`.
    pub fn process_pdf(&self, organizer: &mut Organizer, path: &Path, sha256: Option<String>) -> PdfReport {
        let pdf_id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        info!("processing {pdf_id}");

        let pages = match self.extractor.extract_pages(&pdf_id, path) {
            Ok(p) => p,
            Err(e) => {
                warn!("{pdf_id}: skipped: {:#}", e);
                return PdfReport::failed(path.display().to_string(), sha256, format!("{e:#}"));
            }
        };

        let seg = self.segment(&pages);
        for d in &seg.documents {
            info!(
                "{pdf_id}: {} (pages {}-{}, confidence {:.2}{})",
                d.category,
                d.start + 1,
                d.end,
                d.confidence(),
                if d.source.fallback { ", fallback" } else { "" }
            );
        }

        let actions = organizer.plan(path, &pages, &seg.documents);
        let outcomes = organizer.execute(path, &pages, actions);

        PdfReport {
            source: path.display().to_string(),
            sha256,
            page_count: pages.len(),
            ocr_pages: pages.iter().filter(|p| p.used_ocr).count(),
            windows: seg.verdicts.len(),
            undetermined_windows: seg.verdicts.iter().filter(|v| !v.is_determined()).count(),
            fallback_labels: seg.verdicts.iter().map(|v| v.fallback_labels.len()).sum(),
            outcomes,
            error: None,
        }
    }

    /// Ask the oracle about every window, then merge. Windows that exhaust
    /// their retries abstain instead of failing the PDF.
    pub fn segment(&self, pages: &[Page]) -> Segmentation {
        let pdf_id = pages.first().map(|p| p.pdf_id.as_str()).unwrap_or_default();
        let mut verdicts = Vec::new();
        for window in self.windower.windows(pages) {
            debug!(
                "{pdf_id}: window {} pages {}-{}",
                window.id,
                window.start + 1,
                window.end
            );
            let verdict = match self.oracle.evaluate(&window, &self.taxonomy) {
                Ok(v) => v,
                Err(e) => {
                    warn!("{pdf_id}: window {} undetermined: {}", window.id, e);
                    BoundaryVerdict::undetermined(window.id, window.start, window.end)
                }
            };
            verdicts.push(verdict);
        }

        let documents = merge::merge(
            pdf_id,
            pages.len(),
            &verdicts,
            &self.taxonomy,
            &self.cfg.voting,
        );
        Segmentation {
            verdicts,
            documents,
        }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }
}
