//! Markdown heading and section splitting.
//!
//! Headings inside fenced code blocks are ignored. A document is split at
//! its shallowest heading level; deeper headings stay in the section body.

/// One `#`-headed section of a markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub level: u8,
    /// Lines between this heading and the next one at the same or higher
    /// level, with leading and trailing blank lines removed.
    pub body: String,
    /// 1-based line number of the heading.
    pub line: usize,
}

/// Result of splitting a markdown document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitMarkdown {
    /// Non-blank content before the first heading.
    pub preamble: String,
    pub sections: Vec<Section>,
}

/// Parse an ATX heading line, returning `(level, text)`.
pub fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_end();
    let hashes = trimmed.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let text = rest.trim().trim_end_matches('#').trim_end();
    Some((hashes as u8, text))
}

/// Heading positions as `(line index, level, text)`, skipping fenced code.
fn headings(lines: &[&str]) -> Vec<(usize, u8, String)> {
    let mut out = Vec::new();
    let mut fence: Option<&str> = None;
    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        let marker = if trimmed.starts_with("```") {
            Some("```")
        } else if trimmed.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        };
        match (fence, marker) {
            (None, Some(m)) => {
                fence = Some(m);
                continue;
            }
            (Some(open), Some(m)) if open == m => {
                fence = None;
                continue;
            }
            (Some(_), _) => continue,
            (None, None) => {}
        }
        if let Some((level, text)) = parse_heading(line) {
            out.push((idx, level, text.to_string()));
        }
    }
    out
}

/// Split `markdown` into sections at its shallowest heading level.
pub fn split_sections(markdown: &str) -> SplitMarkdown {
    let normalized = markdown.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized.lines().collect();
    let found = headings(&lines);

    let Some(top) = found.iter().map(|(_, level, _)| *level).min() else {
        return SplitMarkdown {
            preamble: trim_blank_lines(&lines).to_string(),
            sections: Vec::new(),
        };
    };

    let starts: Vec<&(usize, u8, String)> = found.iter().filter(|(_, l, _)| *l == top).collect();
    let preamble = trim_blank_lines(&lines[..starts[0].0]).to_string();

    let mut sections = Vec::with_capacity(starts.len());
    for (i, (idx, level, text)) in starts.iter().map(|s| (s.0, s.1, &s.2)).enumerate() {
        let end = starts.get(i + 1).map(|s| s.0).unwrap_or(lines.len());
        sections.push(Section {
            heading: text.clone(),
            level,
            body: trim_blank_lines(&lines[idx + 1..end]),
            line: idx + 1,
        });
    }

    SplitMarkdown { preamble, sections }
}

/// The first heading of a document, if any (skipping fenced code).
pub fn first_heading(markdown: &str) -> Option<(usize, u8, String)> {
    let lines: Vec<&str> = markdown.lines().collect();
    headings(&lines).into_iter().next()
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e].join("\n"),
        _ => String::new(),
    }
}

/// Lowercase, `-`-separated slug of `text`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("section");
    }
    slug
}
