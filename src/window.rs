use crate::{config::ConfigError, extract::Page};
use serde::{Deserialize, Serialize};

/// A run of consecutive pages that the oracle judges together.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    pub id: usize,
    pub start: usize, // 0-based inclusive
    pub end: usize,   // 0-based exclusive
    pub pages: &'a [Page],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpan {
    pub id: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windower {
    size: usize,
}

impl Windower {
    pub fn new(size: i64) -> Result<Self, ConfigError> {
        if size <= 0 {
            return Err(ConfigError::InvalidWindowSize(size));
        }
        Ok(Self {
            size: size as usize,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Adjacent windows share one page so the seam gets judged twice.
    pub fn stride(&self) -> usize {
        if self.size > 1 { self.size - 1 } else { 1 }
    }

    pub fn spans(&self, page_count: usize) -> Spans {
        Spans {
            size: self.size,
            stride: self.stride(),
            page_count,
            next_start: Some(0).filter(|_| page_count > 0),
            next_id: 0,
        }
    }

    pub fn windows<'a>(&self, pages: &'a [Page]) -> impl Iterator<Item = Window<'a>> + use<'a> {
        self.spans(pages.len()).map(move |s| Window {
            id: s.id,
            start: s.start,
            end: s.end,
            pages: &pages[s.start..s.end],
        })
    }
}

/// Lazy window layout over `[0, page_count)`.
#[derive(Debug, Clone)]
pub struct Spans {
    size: usize,
    stride: usize,
    page_count: usize,
    next_start: Option<usize>,
    next_id: usize,
}

impl Iterator for Spans {
    type Item = WindowSpan;

    fn next(&mut self) -> Option<WindowSpan> {
        let start = self.next_start?;
        let end = (start + self.size).min(self.page_count);
        self.next_start = if end >= self.page_count {
            None
        } else {
            Some(start + self.stride)
        };
        let span = WindowSpan {
            id: self.next_id,
            start,
            end,
        };
        self.next_id += 1;
        Some(span)
    }
}
