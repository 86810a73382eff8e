//! Embedded-mode fragment rendering and self-referential URLs.
//!
//! An embedded success renders a hyperlink-wrapped image reference pointing
//! back at the direct-fetch route for the same (group, filename) pair; the
//! byte-serving endpoint behind that URL re-enforces the permission gate.
//! Display hints are emitted only when the caller supplied them: zero
//! width/height and empty alt/title are omitted outright, never written as
//! empty attributes. Everything interpolated into markup is escaped here.

use std::fmt::Write as _;

/// Route the self-referential URL points at; must match the router.
pub const FILES_ROUTE: &str = "/files";

/// Optional presentation attributes for an embedded image reference.
#[derive(Debug, Clone, Default)]
pub struct DisplayHints {
    pub width: u32,
    pub height: u32,
    pub alt: String,
    pub title: String,
}

/// Direct-fetch URL for a (group, filename) pair, query-encoded.
pub fn self_url(group: &str, filename: &str) -> String {
    format!(
        "{}?g={}&f={}",
        FILES_ROUTE,
        urlencoding::encode(group),
        urlencoding::encode(filename)
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `<a href="url"><img .../></a>` with the populated hints and the source URL.
pub fn image_fragment(url: &str, hints: &DisplayHints) -> String {
    let mut attrs = String::new();
    if hints.width > 0 {
        let _ = write!(attrs, " width=\"{}\"", hints.width);
    }
    if hints.height > 0 {
        let _ = write!(attrs, " height=\"{}\"", hints.height);
    }
    if !hints.alt.is_empty() {
        let _ = write!(attrs, " alt=\"{}\"", escape_html(&hints.alt));
    }
    if !hints.title.is_empty() {
        let _ = write!(attrs, " title=\"{}\"", escape_html(&hints.title));
    }
    let url = escape_html(url);
    format!("<a href=\"{}\"><img{} src=\"{}\"/></a>", url, attrs, url)
}

/// Inline error notice for embedded-mode failures. The message text passes
/// through the escaper even though the catalog texts are trusted; override
/// files are operator input.
pub fn error_fragment(message: &str) -> String {
    format!("<div class=\"errorbox\">{}</div>", escape_html(message))
}
