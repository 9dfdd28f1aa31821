use scraper::{ElementRef, Html, Selector};

/// Readable content pulled out of a full page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub byline: Option<String>,
    pub content_html: String,
}

/// Narrows a page down to its article content before images are inlined.
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str) -> ExtractedContent;
}

/// Lightweight stand-in for a readability pass:
/// - `<title>` text, else the first `<h1>`
/// - byline from `<meta name="author">`
/// - `<article>` inner HTML, else `<main>`, else `<body>`, else the whole document
#[derive(Debug, Default)]
pub struct ReadabilityLikeExtractor;

impl Extractor for ReadabilityLikeExtractor {
    fn extract(&self, html: &str) -> ExtractedContent {
        let doc = Html::parse_document(html);

        let title = first_text(&doc, "title").or_else(|| first_text(&doc, "h1"));
        let byline = first_match(&doc, r#"meta[name="author"]"#)
            .and_then(|meta| meta.value().attr("content"))
            .map(|author| author.trim().to_string())
            .filter(|author| !author.is_empty());

        let content_html = ["article", "main", "body"]
            .iter()
            .find_map(|sel| first_match(&doc, sel))
            .map(|node| node.inner_html())
            .unwrap_or_else(|| doc.root_element().html());

        ExtractedContent {
            title,
            byline,
            content_html,
        }
    }
}

fn first_match<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel).next()
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    first_match(doc, selector)
        .map(|node| node.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}
