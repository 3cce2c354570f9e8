use crate::config::Text;
use unicode_normalization::UnicodeNormalization;

/// Clean a page's raw text before it is stored and shown to the oracle.
pub fn normalize_page_text(cfg: &Text, raw: &str) -> String {
    let mut s = raw.to_string();

    if cfg.normalize_newlines {
        s = s.replace("\r\n", "\n").replace('\r', "\n");
    }

    if cfg.normalize_unicode {
        s = s.nfkc().collect::<String>();
    }

    s = sanitize_control_chars(&s, &cfg.control_chars_to_sanitize);

    if cfg.trim_trailing_whitespace {
        s = s
            .lines()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n");
    }

    if cfg.collapse_blank_lines {
        s = collapse_blank_lines(&s);
    }

    s.trim().to_string()
}

fn sanitize_control_chars(s: &str, codes: &[u8]) -> String {
    if codes.is_empty() {
        return s.to_string();
    }

    let mut mask = [false; 128];
    for &code in codes {
        if (code as usize) < mask.len() {
            mask[code as usize] = true;
        }
    }

    s.chars()
        .filter(|&ch| {
            // Structural whitespace survives regardless of the mask.
            if ch == '\n' || ch == '\t' {
                return true;
            }
            let cp = ch as u32;
            if cp < 128 {
                !mask[cp as usize]
            } else {
                // C1 controls are never meaningful in extracted page text.
                !(0x80..=0x9f).contains(&cp)
            }
        })
        .collect()
}

fn collapse_blank_lines(s: &str) -> String {
    let mut out = Vec::new();
    let mut blank_run = 0usize;
    for line in s.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }
    out.join("\n")
}

/// Count of chars that carry content.
pub fn non_whitespace_chars(s: &str) -> usize {
    s.chars().filter(|c| !c.is_whitespace()).count()
}

/// Share of non-whitespace chars that are neither alphanumeric nor common punctuation.
/// A high ratio means a broken font mapping rather than real text.
pub fn garbage_ratio(s: &str) -> f32 {
    let mut total = 0usize;
    let mut garbage = 0usize;
    for ch in s.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        let ok = ch.is_alphanumeric() || ch.is_ascii_punctuation() || "§¶©®°€£–—‘’“”•".contains(ch);
        if !ok {
            garbage += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        garbage as f32 / total as f32
    }
}
