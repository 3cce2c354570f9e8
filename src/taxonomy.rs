use crate::config::ConfigError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Labels that mark the catch-all bucket when a taxonomy does not name one.
const FALLBACK_NAMES: [&str; 4] = ["other", "unorganized", "uncategorized", "unclassified"];

/// The closed, ordered set of categories a document may receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    categories: Vec<String>,
    fallback: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TaxonomyFile {
    Mapping {
        categories: Vec<serde_yaml::Value>,
        #[serde(default)]
        fallback: Option<String>,
    },
    List(Vec<serde_yaml::Value>),
}

impl Taxonomy {
    pub fn load(path: &Path) -> Result<Self> {
        let invalid = |reason: String| ConfigError::InvalidTaxonomy {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        Ok(Self::from_yaml(&raw).map_err(|e| invalid(format!("{e:#}")))?)
    }

    /// Accepts either `{categories: [...], fallback: ...}` or a bare list.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let parsed: TaxonomyFile = serde_yaml::from_str(raw).map_err(|e| {
            anyhow::anyhow!("expected a `categories` list or a bare list of strings: {e}")
        })?;
        let (values, fallback) = match parsed {
            TaxonomyFile::Mapping {
                categories,
                fallback,
            } => (categories, fallback),
            TaxonomyFile::List(values) => (values, None),
        };

        let mut categories = Vec::with_capacity(values.len());
        for v in values {
            match v {
                serde_yaml::Value::String(s) => categories.push(s),
                other => anyhow::bail!("all categories must be strings, found {other:?}"),
            }
        }
        Self::new(categories, fallback)
    }

    pub fn new(categories: Vec<String>, fallback: Option<String>) -> Result<Self> {
        let mut cleaned: Vec<String> = Vec::with_capacity(categories.len());
        for c in categories {
            let c = c.trim().to_string();
            if c.is_empty() {
                anyhow::bail!("category names cannot be empty");
            }
            if cleaned.iter().any(|e| e.eq_ignore_ascii_case(&c)) {
                anyhow::bail!("duplicate category: {c}");
            }
            cleaned.push(c);
        }
        if cleaned.is_empty() {
            anyhow::bail!("category list cannot be empty");
        }

        let fallback = match fallback.map(|f| f.trim().to_string()) {
            Some(f) if f.is_empty() => anyhow::bail!("fallback category cannot be empty"),
            Some(f) => match cleaned.iter().find(|c| c.eq_ignore_ascii_case(&f)) {
                Some(existing) => existing.clone(),
                None => {
                    cleaned.push(f.clone());
                    f
                }
            },
            None => cleaned
                .iter()
                .rev()
                .find(|c| FALLBACK_NAMES.contains(&c.to_ascii_lowercase().as_str()))
                .or_else(|| cleaned.last())
                .cloned()
                .unwrap_or_default(),
        };

        Ok(Self {
            categories: cleaned,
            fallback,
        })
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Map an oracle label onto the canonical taxonomy spelling.
    pub fn resolve(&self, label: &str) -> Option<&str> {
        let label = label.trim();
        self.categories
            .iter()
            .find(|c| c.eq_ignore_ascii_case(label))
            .map(String::as_str)
    }

    /// Position in declared order, used for deterministic tie-breaks.
    pub fn rank(&self, category: &str) -> usize {
        self.categories
            .iter()
            .position(|c| c == category)
            .unwrap_or(usize::MAX)
    }
}
