use crate::models::{ExtractedArticle, FetchedPage};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

/// Block segments shorter than this are captions, bylines or boilerplate,
/// not article paragraphs.
const MIN_SEGMENT_CHARS: usize = 60;
/// Cap on extracted text, sized to the enrichment backend's input limit.
const MAX_TEXT_CHARS: usize = 4000;

/// Containers whose text is navigation chrome rather than article content.
const CLUTTER_TAGS: &[&str] = &["script", "style", "nav", "footer", "header", "aside"];

static PARAGRAPH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("paragraph selector"));
static OG_IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).expect("og:image selector"));

/// Produce a best-effort structured article from a fetched page.
///
/// Never fails: an absent body, unparseable markup, or a page with no
/// usable paragraphs all degrade to empty text and no image.
#[instrument(level = "debug", skip_all, fields(url = %page.final_url))]
pub fn extract(page: &FetchedPage) -> ExtractedArticle {
    let Some(body) = page.body.as_deref() else {
        return ExtractedArticle::default();
    };

    let document = Html::parse_document(body);

    let mut segments = Vec::new();
    for element in document.select(&PARAGRAPH_SELECTOR) {
        if in_clutter(&element) {
            continue;
        }
        let text = element.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.chars().count() > MIN_SEGMENT_CHARS {
            segments.push(text);
        }
    }
    let text = cap_chars(&segments.join(" "), MAX_TEXT_CHARS);

    let image = document
        .select(&OG_IMAGE_SELECTOR)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .and_then(|content| resolve_image_url(&page.final_url, content));

    debug!(
        chars = text.chars().count(),
        has_image = image.is_some(),
        "Extracted article content"
    );
    ExtractedArticle { text, image }
}

/// True when any ancestor of the element is a clutter container.
fn in_clutter(element: &ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(|node| node.value().as_element().map(|e| e.name()))
        .any(|name| CLUTTER_TAGS.contains(&name))
}

/// Resolve a possibly-relative social-preview image against the page URL.
fn resolve_image_url(base: &str, content: &str) -> Option<String> {
    match Url::parse(base) {
        Ok(base_url) => base_url.join(content).ok().map(|u| u.to_string()),
        // Unparseable base: keep the reference only if it is already absolute.
        Err(_) => Url::parse(content).ok().map(|u| u.to_string()),
    }
}

fn cap_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> FetchedPage {
        FetchedPage {
            final_url: "https://example.com/world/story".to_string(),
            body: Some(body.to_string()),
        }
    }

    const LONG_A: &str = "This opening paragraph carries enough substance to clear the minimum segment threshold easily.";
    const LONG_B: &str = "A second substantial paragraph follows with further reporting details about the unfolding event.";

    #[test]
    fn test_absent_body_degrades_to_empty() {
        let article = extract(&FetchedPage {
            final_url: "https://example.com".to_string(),
            body: None,
        });
        assert_eq!(article.text, "");
        assert!(article.image.is_none());
    }

    #[test]
    fn test_extracts_paragraphs_and_skips_clutter() {
        let html = format!(
            r#"<html><head><style>p {{ color: red }}</style></head><body>
            <nav><p>Menu entry that is long enough to pass the threshold but sits in navigation.</p></nav>
            <p>{LONG_A}</p>
            <p>short caption</p>
            <p>{LONG_B}</p>
            <footer><p>About us, careers, advertising, contact and other boilerplate links galore.</p></footer>
            </body></html>"#
        );
        let article = extract(&page(&html));
        assert_eq!(article.text, format!("{LONG_A} {LONG_B}"));
    }

    #[test]
    fn test_truncates_to_cap() {
        let paragraph = "x".repeat(1500);
        let html = format!(
            "<body><p>{p}</p><p>{p}</p><p>{p}</p><p>{p}</p></body>",
            p = paragraph
        );
        let article = extract(&page(&html));
        assert_eq!(article.text.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn test_og_image_resolved_against_page_url() {
        let html = r#"<html><head>
            <meta property="og:image" content="/img/lead.jpg">
            </head><body></body></html>"#;
        let article = extract(&page(html));
        assert_eq!(
            article.image.as_deref(),
            Some("https://example.com/img/lead.jpg")
        );
    }

    #[test]
    fn test_og_image_absolute_kept_as_is() {
        let html = r#"<head><meta property="og:image" content="https://cdn.example.com/a.png"></head>"#;
        let article = extract(&page(html));
        assert_eq!(
            article.image.as_deref(),
            Some("https://cdn.example.com/a.png")
        );
    }

    #[test]
    fn test_no_usable_text_is_not_an_error() {
        let article = extract(&page("<body><div>nothing paragraph-shaped</div></body>"));
        assert_eq!(article.text, "");
        assert!(article.image.is_none());
    }
}
