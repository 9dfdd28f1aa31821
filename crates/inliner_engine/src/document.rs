use crate::serialize::{escape_attribute, escape_text};

const STYLE: &str = "img { display: block; margin-left: auto; margin-right: auto; max-width: 100%; }";

/// Wraps rewritten article HTML into a standalone document.
pub fn build_html_document(title: Option<&str>, byline: Option<&str>, body_html: &str) -> String {
    let mut title_text = String::new();
    escape_text(title.unwrap_or("untitled"), &mut title_text);

    let mut doc = String::with_capacity(body_html.len() + 256);
    doc.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    doc.push_str(&format!("<title>{title_text}</title>\n"));
    if let Some(author) = byline {
        let mut author_attr = String::new();
        escape_attribute(author, &mut author_attr);
        doc.push_str(&format!("<meta name=\"author\" content=\"{author_attr}\">\n"));
    }
    doc.push_str(&format!("<style>{STYLE}</style>\n</head>\n<body>\n"));
    doc.push_str(body_html);
    doc.push_str("\n</body>\n</html>\n");
    doc
}
