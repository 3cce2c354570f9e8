use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

/// A chat message for the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Determined,
    /// Retries ran out; the window contributes no votes.
    Undetermined,
}

/// The oracle's opinion about one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVote {
    pub page_index: usize,
    pub starts_document: bool,
    /// `None` when the oracle's label was not in the taxonomy.
    pub category: Option<String>,
}

/// Everything one window said. Adjacent verdicts may disagree on shared pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryVerdict {
    pub window_id: usize,
    pub start: usize,
    pub end: usize,
    pub status: VerdictStatus,
    pub votes: Vec<PageVote>,
    /// Out-of-taxonomy labels, as `(page_index, label)`.
    pub fallback_labels: Vec<(usize, String)>,
}

impl BoundaryVerdict {
    pub fn undetermined(window_id: usize, start: usize, end: usize) -> Self {
        Self {
            window_id,
            start,
            end,
            status: VerdictStatus::Undetermined,
            votes: Vec::new(),
            fallback_labels: Vec::new(),
        }
    }

    pub fn is_determined(&self) -> bool {
        self.status == VerdictStatus::Determined
    }

    pub fn boundary_page_indices(&self) -> BTreeSet<usize> {
        self.votes
            .iter()
            .filter(|v| v.starts_document)
            .map(|v| v.page_index)
            .collect()
    }

    /// Segments inside this window, split at voted boundaries, with the label
    /// of each segment's first page that has one.
    pub fn category_by_segment(&self) -> Vec<(Range<usize>, Option<String>)> {
        let mut votes: Vec<&PageVote> = self.votes.iter().collect();
        votes.sort_by_key(|v| v.page_index);

        let mut segments: Vec<(Range<usize>, Option<String>)> = Vec::new();
        for v in votes {
            match segments.last_mut() {
                Some((range, category)) if !v.starts_document => {
                    range.end = v.page_index + 1;
                    if category.is_none() {
                        *category = v.category.clone();
                    }
                }
                _ => segments.push((v.page_index..v.page_index + 1, v.category.clone())),
            }
        }
        segments
    }
}

/// Wire shape the oracle is asked to answer with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleResponse {
    pub pages: Vec<OraclePage>,
}

/// Accepts the requested object or a bare list of page entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OracleAnswer {
    Object(OracleResponse),
    Pages(Vec<OraclePage>),
}

impl OracleAnswer {
    pub fn into_pages(self) -> Vec<OraclePage> {
        match self {
            OracleAnswer::Object(r) => r.pages,
            OracleAnswer::Pages(p) => p,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OraclePage {
    /// 1-based absolute page number, as labeled in the prompt.
    pub page: usize,
    #[serde(alias = "starts_new", alias = "is_boundary")]
    pub starts_new_document: bool,
    #[serde(default)]
    pub category: Option<String>,
}
