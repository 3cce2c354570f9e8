use super::{
    OracleError,
    types::{BoundaryVerdict, Message, OracleAnswer, PageVote, Role, VerdictStatus},
};
use crate::{taxonomy::Taxonomy, window::Window};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You sort scanned estate paperwork. You receive consecutive pages \
of a scanned PDF that may contain several separate documents. For every page decide whether a \
new document starts on that page, and which category the document containing the page belongs \
to. Use only the category names you are given, spelled exactly. Answer with JSON only.";

/// Build the request for one window. Same window and taxonomy, same messages.
pub fn build_messages(window: &Window, taxonomy: &Taxonomy, max_chars_per_page: usize) -> Vec<Message> {
    let mut user = String::new();

    user.push_str("Categories (in order of preference):\n");
    for c in taxonomy.categories() {
        user.push_str("- ");
        user.push_str(c);
        user.push('\n');
    }
    user.push_str(&format!(
        "If no category fits, use \"{}\".\n\n",
        taxonomy.fallback()
    ));

    user.push_str(&format!(
        "Pages {} to {}:\n\n",
        window.start + 1,
        window.end
    ));
    if window.start > 0 {
        user.push_str(&format!(
            "Page {0} may continue a document begun before page {0}; \
mark it as a new document only if it clearly starts one.\n\n",
            window.start + 1
        ));
    }
    for page in window.pages {
        user.push_str(&format!("[PAGE {}]\n", page.page_index + 1));
        let text = truncate_chars(&page.text, max_chars_per_page);
        if text.trim().is_empty() {
            user.push_str("(no text found on this page)");
        } else {
            user.push_str(text);
        }
        user.push_str("\n\n");
    }

    user.push_str(
        "Respond with one JSON object of the form \
{\"pages\":[{\"page\":<page number>,\"starts_new_document\":<true|false>,\"category\":\"<category>\"}]} \
with exactly one entry per page listed above.",
    );

    vec![
        Message {
            role: Role::System,
            content: SYSTEM_PROMPT.to_string(),
        },
        Message {
            role: Role::User,
            content: user,
        },
    ]
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn fenced_json() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\}|\[.*\])\s*```").ok())
        .as_ref()
}

/// Spans of `raw` that may hold the answer: a fenced block, else the outermost
/// object and array spans in order of appearance.
fn json_candidates(raw: &str) -> Vec<&str> {
    if let Some(body) = fenced_json()
        .and_then(|re| re.captures(raw))
        .and_then(|c| c.get(1))
    {
        return vec![body.as_str()];
    }
    let mut spans: Vec<(usize, &str)> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| {
            let start = raw.find(open)?;
            let end = raw.rfind(close)?;
            (start < end).then(|| (start, &raw[start..=end]))
        })
        .collect();
    spans.sort_by_key(|(start, _)| *start);
    spans.into_iter().map(|(_, body)| body).collect()
}

/// Turn a raw oracle answer into a verdict for `window`.
pub fn parse_verdict(
    window: &Window,
    taxonomy: &Taxonomy,
    raw: &str,
) -> Result<BoundaryVerdict, OracleError> {
    let mut last_err = String::from("no JSON object in response");
    let mut response = None;
    for body in json_candidates(raw) {
        match serde_json::from_str::<OracleAnswer>(body) {
            Ok(answer) => {
                response = Some(answer);
                break;
            }
            Err(e) => last_err = e.to_string(),
        }
    }
    let response = response.ok_or(OracleError::Malformed(last_err))?;

    let mut seen = BTreeSet::new();
    let mut votes = Vec::new();
    let mut fallback_labels = Vec::new();

    for entry in response.into_pages() {
        let Some(page_index) = entry.page.checked_sub(1) else {
            warn!("window {}: ignoring page number 0", window.id);
            continue;
        };
        if page_index < window.start || page_index >= window.end {
            warn!(
                "window {}: ignoring page {} outside {}..={}",
                window.id,
                entry.page,
                window.start + 1,
                window.end
            );
            continue;
        }
        if !seen.insert(page_index) {
            debug!("window {}: duplicate entry for page {}", window.id, entry.page);
            continue;
        }

        let category = match entry.category.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(label) => match taxonomy.resolve(label) {
                Some(c) => Some(c.to_string()),
                None => {
                    warn!(
                        "window {}: page {} labeled {:?}, not in taxonomy; falling back",
                        window.id, entry.page, label
                    );
                    fallback_labels.push((page_index, label.to_string()));
                    None
                }
            },
        };

        votes.push(PageVote {
            page_index,
            starts_document: entry.starts_new_document,
            category,
        });
    }

    if votes.is_empty() {
        return Err(OracleError::Malformed(format!(
            "response covers none of pages {}..={}",
            window.start + 1,
            window.end
        )));
    }
    if votes.len() < window.end - window.start {
        debug!(
            "window {}: {} of {} pages answered",
            window.id,
            votes.len(),
            window.end - window.start
        );
    }

    votes.sort_by_key(|v| v.page_index);
    Ok(BoundaryVerdict {
        window_id: window.id,
        start: window.start,
        end: window.end,
        status: VerdictStatus::Determined,
        votes,
        fallback_labels,
    })
}
