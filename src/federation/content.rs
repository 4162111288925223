//! Plain-text extraction from inbound HTML content

use std::collections::HashSet;

/// Elements whose boundaries separate words
const BLOCK_TAGS: [&str; 3] = ["p", "div", "br"];

/// Strip markup from remote content, returning collapsed plain text.
///
/// Script and style bodies are dropped entirely, entities are decoded, and
/// block-level boundaries become spaces.
pub fn strip_html(html: &str) -> String {
    let spaced = space_block_boundaries(html);

    let text_only = ammonia::Builder::empty()
        .clean_content_tags(HashSet::from(["script", "style"]))
        .clean(&spaced)
        .to_string();

    let decoded = html_escape::decode_html_entities(&text_only);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render stored plain text as the HTML `content` of an outbound Note.
///
/// Blank lines separate paragraphs; single newlines become `<br>`.
pub fn text_to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .map(|paragraph| {
            let lines: Vec<String> = paragraph
                .lines()
                .map(|line| html_escape::encode_text(line).into_owned())
                .collect();
            format!("<p>{}</p>", lines.join("<br>"))
        })
        .collect()
}

/// Insert a space before every opening or closing block tag.
fn space_block_boundaries(html: &str) -> String {
    let mut out = String::with_capacity(html.len() + 16);
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let tag = &rest[start + 1..];
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if BLOCK_TAGS.contains(&name.as_str()) {
            out.push(' ');
        }
        out.push('<');
        rest = tag;
    }
    out.push_str(rest);
    out
}
