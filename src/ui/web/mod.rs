use axum::{
    http::header,
    response::{Html, IntoResponse},
};

use crate::common::format_size;
use crate::send::ShareEntry;

//-- HELPER FUNCS
const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; script-src 'self' 'unsafe-inline'; style-src 'self' 'unsafe-inline'; img-src 'self' data:; connect-src 'self'; object-src 'none'; base-uri 'none'; frame-ancestors 'none'";

const INDEX_TEMPLATE: &str = include_str!("index.html");
const ROWS_PLACEHOLDER: &str = "{{rows}}";

fn hardening_headers() -> [(header::HeaderName, &'static str); 4] {
    [
        (header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::REFERRER_POLICY, "no-referrer"),
    ]
}

fn typed_hardening_headers(content_type: &'static str) -> [(header::HeaderName, &'static str); 5] {
    [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::REFERRER_POLICY, "no-referrer"),
    ]
}

/// Escape text for use inside HTML element content and quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the listing page for one snapshot.
pub fn render_index(entries: &[ShareEntry]) -> String {
    let rows = if entries.is_empty() {
        r#"<tr><td colspan="3" class="empty">No files are being shared right now.</td></tr>"#
            .to_string()
    } else {
        entries
            .iter()
            .map(|entry| {
                format!(
                    r#"<tr><td>{name}</td><td class="size">{size}</td><td><a href="/download/{id}">Download</a></td></tr>"#,
                    name = escape_html(&entry.name),
                    size = format_size(entry.size_bytes),
                    id = entry.id,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    INDEX_TEMPLATE.replace(ROWS_PLACEHOLDER, &rows)
}

//-- LISTING PAGE
pub fn serve_index(entries: &[ShareEntry]) -> impl IntoResponse {
    (hardening_headers(), Html(render_index(entries)))
}

//-- STATIC ASSETS
pub fn serve_favicon() -> impl IntoResponse {
    (
        typed_hardening_headers("image/svg+xml"),
        include_str!("favicon.svg"),
    )
}
