//! The Markdown adapter (component C2).
//!
//! Scans raw Markdown once, left to right, masking every protected region
//! it finds (fenced code, inline code, raw/inline HTML, images, links,
//! autolinks, bare URLs, display/inline math) behind an opaque
//! [`mdvoice_core::MaskTable`] token, and records the remaining runs of
//! characters as [`TextSpan`]s. Downstream stages only ever see the
//! masked document and the span list; they never re-derive protected
//! regions themselves.
//!
//! Pattern ordering is kept data-driven (see [`try_protected_region`])
//! rather than spread across ad-hoc branches, so priority among
//! protected-region kinds is a single, auditable list.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use mdvoice_core::{MaskTable, TextSpan};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("unterminated fenced code block starting at byte offset {at}")]
    UnterminatedFence { at: usize },
    #[error("unbalanced inline code run starting at byte offset {at}")]
    UnbalancedInlineCode { at: usize },
}

/// The output of [`prepare`]: the masked document, the mask table needed
/// to restore it, and the editable text spans within it.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub masked: String,
    pub mask_table: MaskTable,
    pub spans: Vec<TextSpan>,
}

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "base", "basefont", "blockquote", "body", "caption",
    "center", "col", "colgroup", "dd", "details", "dialog", "dir", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "frame", "frameset", "h1", "h2",
    "h3", "h4", "h5", "h6", "head", "header", "hr", "html", "iframe", "legend", "li",
    "link", "main", "menu", "menuitem", "nav", "noframes", "ol", "optgroup", "option", "p",
    "param", "section", "summary", "table", "tbody", "td", "tfoot", "th", "thead", "title",
    "tr", "track", "ul", "script", "style", "pre", "textarea",
];

static INLINE_HTML_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        \A<!--.*?-->
        |\A</?[A-Za-z][A-Za-z0-9-]*
            (?:\s+[a-zA-Z_:][-a-zA-Z0-9_:.]*
                (?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?
            )*
            \s*/?>
        "#,
    )
    .unwrap()
});

static IMAGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A!\[[^\]\n]*\]\([^)\n]*\)").unwrap());

static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A\[([^\]\n]*)\]\([^)\n]*\)").unwrap());

static AUTOLINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\A<(?:[a-zA-Z][a-zA-Z0-9+.\-]{1,31}:[^\s<>]*|[^\s<>@]+@[^\s<>]+)>").unwrap()
});

static BARE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A[a-zA-Z][a-zA-Z0-9+.\-]*://[^\s<>\)\]]+").unwrap());

static DISPLAY_MATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\A\$\$.*?\$\$").unwrap());

static INLINE_MATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A\$[^$\n]+\$").unwrap());

/// Masks protected regions in `md` and returns the masked document plus
/// the spans every later stage is allowed to rewrite.
pub fn prepare(md: &str) -> Result<PreparedDocument, AdapterError> {
    let mut mask_table = MaskTable::new();
    let mut spans = Vec::new();
    let mut result = String::with_capacity(md.len());
    let mut span_start: Option<usize> = None;

    let mut pos = 0usize;
    let len = md.len();

    while pos < len {
        if let Some(region) = try_protected_region(md, pos)? {
            if let Some(start) = span_start.take() {
                push_span_if_nonempty(&mut spans, start, result.len());
            }
            match region {
                ProtectedMatch::Whole { end } => {
                    let token = mask_table.push(&md[pos..end]);
                    result.push_str(&token);
                    pos = end;
                }
                ProtectedMatch::Link { text_end, url_end } => {
                    // `[text]` (brackets included) is visible, editable
                    // text; only the `(url ...)` tail is masked. The
                    // inner text (excluding the brackets themselves)
                    // becomes a span.
                    let bracket_open_start = result.len();
                    result.push_str(&md[pos..text_end]);
                    push_span_if_nonempty(&mut spans, bracket_open_start + 1, result.len() - 1);
                    let token = mask_table.push(&md[text_end..url_end]);
                    result.push_str(&token);
                    pos = url_end;
                }
            }
            continue;
        }

        if span_start.is_none() {
            span_start = Some(result.len());
        }
        let ch = md[pos..].chars().next().expect("pos < len");
        result.push(ch);
        pos += ch.len_utf8();
    }

    if let Some(start) = span_start.take() {
        push_span_if_nonempty(&mut spans, start, result.len());
    }

    Ok(PreparedDocument {
        masked: result,
        mask_table,
        spans,
    })
}

fn push_span_if_nonempty(spans: &mut Vec<TextSpan>, start: usize, end: usize) {
    if start < end {
        spans.push(TextSpan::new(start, end));
    }
}

enum ProtectedMatch {
    /// The whole `[pos, end)` range in the source becomes a single mask
    /// token.
    Whole { end: usize },
    /// A link: `[text]` (ending at `text_end`, exclusive of the
    /// following `(`) stays editable; `(url ...)` through `url_end` is
    /// masked as one token.
    Link { text_end: usize, url_end: usize },
}

/// Tries every Protected Region Kind at `pos`, in the fixed priority
/// order of the data model: fenced code, inline code, raw HTML block,
/// inline HTML, image, link, autolink, bare URL, display math, inline
/// math. The first kind that matches at this exact position wins.
fn try_protected_region(md: &str, pos: usize) -> Result<Option<ProtectedMatch>, AdapterError> {
    if let Some(end) = try_fence(md, pos)? {
        return Ok(Some(ProtectedMatch::Whole { end }));
    }
    if let Some(end) = try_inline_code(md, pos)? {
        return Ok(Some(ProtectedMatch::Whole { end }));
    }
    if let Some(end) = try_raw_html_block(md, pos) {
        return Ok(Some(ProtectedMatch::Whole { end }));
    }
    if let Some(m) = INLINE_HTML_RE.find(&md[pos..]) {
        return Ok(Some(ProtectedMatch::Whole {
            end: pos + m.end(),
        }));
    }
    if let Some(m) = IMAGE_RE.find(&md[pos..]) {
        return Ok(Some(ProtectedMatch::Whole {
            end: pos + m.end(),
        }));
    }
    if let Some(caps) = LINK_RE.captures(&md[pos..]) {
        let whole = caps.get(0).unwrap();
        let text_group = caps.get(1).unwrap();
        let text_end = pos + text_group.end() + 1; // include the `]`
        let url_end = pos + whole.end();
        return Ok(Some(ProtectedMatch::Link { text_end, url_end }));
    }
    if let Some(m) = AUTOLINK_RE.find(&md[pos..]) {
        return Ok(Some(ProtectedMatch::Whole {
            end: pos + m.end(),
        }));
    }
    if let Some(m) = BARE_URL_RE.find(&md[pos..]) {
        return Ok(Some(ProtectedMatch::Whole {
            end: pos + m.end(),
        }));
    }
    if let Some(m) = DISPLAY_MATH_RE.find(&md[pos..]) {
        return Ok(Some(ProtectedMatch::Whole {
            end: pos + m.end(),
        }));
    }
    if let Some(m) = INLINE_MATH_RE.find(&md[pos..]) {
        return Ok(Some(ProtectedMatch::Whole {
            end: pos + m.end(),
        }));
    }
    Ok(None)
}

fn is_line_start(md: &str, pos: usize) -> bool {
    pos == 0 || md.as_bytes()[pos - 1] == b'\n'
}

/// Matches a fenced code block (` ``` ` or `~~~`) starting at `pos`,
/// inclusive of both the opening and closing fence lines. Fails with
/// [`AdapterError::UnterminatedFence`] if no closing fence is found.
fn try_fence(md: &str, pos: usize) -> Result<Option<usize>, AdapterError> {
    if !is_line_start(md, pos) {
        return Ok(None);
    }
    let bytes = md.as_bytes();
    let fence_char = match bytes.get(pos) {
        Some(b @ b'`') | Some(b @ b'~') => *b,
        _ => return Ok(None),
    };
    let mut run_end = pos;
    while run_end < bytes.len() && bytes[run_end] == fence_char {
        run_end += 1;
    }
    let fence_len = run_end - pos;
    if fence_len < 3 {
        return Ok(None);
    }
    // Consume the rest of the opening fence line (the info string).
    let opening_line_end = match md[run_end..].find('\n') {
        Some(i) => run_end + i + 1,
        None => md.len(),
    };
    let info_string = md[run_end..opening_line_end].trim();
    if fence_char == b'`' && info_string.contains('`') {
        // Not a valid fence: a backtick fence's info string may not
        // itself contain a backtick (CommonMark). Treat as ordinary text
        // so e.g. an inline triple-backtick code span at line start is
        // not mistaken for an unterminated fence.
        return Ok(None);
    }

    let mut search_from = opening_line_end;
    loop {
        if search_from >= md.len() {
            return Err(AdapterError::UnterminatedFence { at: pos });
        }
        let line_end = match md[search_from..].find('\n') {
            Some(i) => search_from + i,
            None => md.len(),
        };
        let line = &md[search_from..line_end];
        let trimmed = line.trim_end();
        if trimmed.chars().all(|c| c == fence_char as char) && trimmed.len() >= fence_len {
            let end = if line_end < md.len() { line_end + 1 } else { md.len() };
            return Ok(Some(end));
        }
        if line_end >= md.len() {
            return Err(AdapterError::UnterminatedFence { at: pos });
        }
        search_from = line_end + 1;
    }
}

/// Matches a backtick-delimited inline code run, with balanced backtick
/// counts (CommonMark semantics: the closing run must have exactly the
/// same length as the opening run). Fails with
/// [`AdapterError::UnbalancedInlineCode`] if no matching closing run is
/// found before the end of the document.
fn try_inline_code(md: &str, pos: usize) -> Result<Option<usize>, AdapterError> {
    let bytes = md.as_bytes();
    if bytes.get(pos) != Some(&b'`') {
        return Ok(None);
    }
    let mut open_end = pos;
    while open_end < bytes.len() && bytes[open_end] == b'`' {
        open_end += 1;
    }
    let open_len = open_end - pos;

    let mut i = open_end;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let run_start = i;
            let mut run_end = i;
            while run_end < bytes.len() && bytes[run_end] == b'`' {
                run_end += 1;
            }
            if run_end - run_start == open_len {
                return Ok(Some(run_end));
            }
            i = run_end;
        } else {
            i += 1;
        }
    }
    Err(AdapterError::UnbalancedInlineCode { at: pos })
}

/// Matches a raw HTML block per the simplified subset this adapter
/// supports: an HTML comment, processing instruction, CDATA section,
/// declaration, or a line starting with a recognized block-level tag.
/// Blocks end at a blank line or end of document; there is no failure
/// mode for these (an unterminated block simply extends to EOF).
fn try_raw_html_block(md: &str, pos: usize) -> Option<usize> {
    if !is_line_start(md, pos) || md.as_bytes().get(pos) != Some(&b'<') {
        return None;
    }
    let rest = &md[pos..];
    if rest.starts_with("<!--") {
        return Some(end_at_marker_then_blank_line(md, pos, "-->"));
    }
    if rest.starts_with("<?") {
        return Some(end_at_marker_then_blank_line(md, pos, "?>"));
    }
    if rest.starts_with("<![CDATA[") {
        return Some(end_at_marker_then_blank_line(md, pos, "]]>"));
    }
    if rest.starts_with("<!") {
        return Some(end_at_marker_then_blank_line(md, pos, ">"));
    }

    let tag_start = pos + 1;
    let tag_start = if md.as_bytes().get(tag_start) == Some(&b'/') {
        tag_start + 1
    } else {
        tag_start
    };
    let tag_end = md[tag_start..]
        .find(|c: char| !(c.is_ascii_alphanumeric()))
        .map(|i| tag_start + i)
        .unwrap_or(md.len());
    let tag_name = md[tag_start..tag_end].to_ascii_lowercase();
    if BLOCK_TAGS.contains(&tag_name.as_str()) {
        return Some(end_at_blank_line(md, pos));
    }
    None
}

fn end_at_marker_then_blank_line(md: &str, pos: usize, marker: &str) -> usize {
    let search_from = pos + marker.len().min(1);
    let marker_pos = md[search_from..].find(marker);
    let after_marker = match marker_pos {
        Some(i) => search_from + i + marker.len(),
        None => return md.len(),
    };
    let line_end = md[after_marker..]
        .find('\n')
        .map(|i| after_marker + i + 1)
        .unwrap_or(md.len());
    line_end
}

fn end_at_blank_line(md: &str, pos: usize) -> usize {
    let mut search_from = pos;
    loop {
        let line_end = match md[search_from..].find('\n') {
            Some(i) => search_from + i + 1,
            None => return md.len(),
        };
        if line_end >= md.len() {
            return md.len();
        }
        let next_line_end = md[line_end..]
            .find('\n')
            .map(|i| line_end + i)
            .unwrap_or(md.len());
        let next_line = &md[line_end..next_line_end];
        if next_line.trim().is_empty() {
            return line_end;
        }
        search_from = line_end;
    }
}
