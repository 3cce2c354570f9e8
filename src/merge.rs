use crate::{
    config::{BoundaryResolution, Voting},
    oracle::BoundaryVerdict,
    taxonomy::Taxonomy,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A contiguous page range of one source PDF with its resolved category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub pdf_id: String,
    pub start: usize, // 0-based inclusive
    pub end: usize,   // 0-based exclusive
    pub category: String,
    pub source: DocumentSource,
}

/// Which windows backed a document and how strongly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSource {
    pub windows: BTreeSet<usize>,
    pub category_votes: usize,
    pub total_votes: usize,
    pub fallback: bool,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.end - self.start
    }

    pub fn confidence(&self) -> f32 {
        if self.source.fallback || self.source.total_votes == 0 {
            0.0
        } else {
            self.source.category_votes as f32 / self.source.total_votes as f32
        }
    }
}

#[derive(Debug, Default, Clone)]
struct PageTally {
    starts: usize,
    continues: usize,
    categories: BTreeMap<String, usize>,
    windows: BTreeSet<usize>,
}

/// Reconcile per-window verdicts into a partition of `[0, page_count)`.
/// Pure: the same verdicts always give the same documents.
pub fn merge(
    pdf_id: &str,
    page_count: usize,
    verdicts: &[BoundaryVerdict],
    taxonomy: &Taxonomy,
    policy: &Voting,
) -> Vec<Document> {
    if page_count == 0 {
        return Vec::new();
    }

    let tallies = tally(page_count, verdicts);
    let boundaries = resolve_boundaries(&tallies, policy);

    let mut docs = Vec::with_capacity(boundaries.len());
    for (i, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).copied().unwrap_or(page_count);
        docs.push(resolve_document(pdf_id, start, end, &tallies, taxonomy));
    }

    debug!(
        "{pdf_id}: {} verdicts -> {} documents",
        verdicts.len(),
        docs.len()
    );
    docs
}

fn tally(page_count: usize, verdicts: &[BoundaryVerdict]) -> Vec<PageTally> {
    let mut tallies = vec![PageTally::default(); page_count];
    for verdict in verdicts.iter().filter(|v| v.is_determined()) {
        for vote in &verdict.votes {
            // A verdict only speaks for pages inside its own window.
            if vote.page_index < verdict.start
                || vote.page_index >= verdict.end
                || vote.page_index >= page_count
            {
                continue;
            }
            let t = &mut tallies[vote.page_index];
            t.windows.insert(verdict.window_id);
            if vote.starts_document {
                t.starts += 1;
            } else {
                t.continues += 1;
            }
            if let Some(c) = &vote.category {
                *t.categories.entry(c.clone()).or_insert(0) += 1;
            }
        }
    }
    tallies
}

fn resolve_boundaries(tallies: &[PageTally], policy: &Voting) -> Vec<usize> {
    let mut out = vec![0];
    for (idx, t) in tallies.iter().enumerate().skip(1) {
        let is_boundary = if t.starts > t.continues {
            true
        } else if t.starts < t.continues {
            false
        } else if t.starts == 0 {
            policy.unresolved == BoundaryResolution::Split
        } else {
            policy.tie == BoundaryResolution::Split
        };
        if is_boundary {
            out.push(idx);
        }
    }
    out
}

fn resolve_document(
    pdf_id: &str,
    start: usize,
    end: usize,
    tallies: &[PageTally],
    taxonomy: &Taxonomy,
) -> Document {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut windows = BTreeSet::new();
    for t in &tallies[start..end] {
        windows.extend(t.windows.iter().copied());
        for (c, n) in &t.categories {
            *counts.entry(c.as_str()).or_insert(0) += n;
        }
    }
    let total_votes: usize = counts.values().sum();

    // Highest count wins; equal counts go to the category declared first.
    let winner = counts
        .iter()
        .max_by(|(a, na), (b, nb)| na.cmp(nb).then_with(|| taxonomy.rank(b).cmp(&taxonomy.rank(a))))
        .map(|(c, n)| (c.to_string(), *n));

    let (category, category_votes, fallback) = match winner {
        Some((c, n)) => (c, n, false),
        None => (taxonomy.fallback().to_string(), 0, true),
    };

    Document {
        pdf_id: pdf_id.to_string(),
        start,
        end,
        category,
        source: DocumentSource {
            windows,
            category_votes,
            total_votes,
            fallback,
        },
    }
}
