//! HTML parsing and data extraction for perfume pages
//!
//! Recovers the two enrichment fields from a fetched page. Rules are tried in
//! order and the first hit wins, independently per field:
//!
//! - image: `img[itemprop=image]` (`src`, then `data-src`), then `og:image`;
//!   thumbnail paths are rewritten to the full-size path
//! - description: `og:description` (entity-unescaped), then
//!   `div[itemprop=description]`, then the `.pgridCell p` text block
//!
//! A selector miss is never an error; the field is simply `None`.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::infrastructure::config::ExtractorConfig;

/// Fields recovered from one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPage {
    pub image_url: Option<String>,
    pub description: Option<String>,
}

/// Compiled selectors; a selector that fails to parse disables its rule
struct CompiledSelectors {
    image: Option<Selector>,
    og_image: Option<Selector>,
    og_description: Option<Selector>,
    description: Option<Selector>,
    fallback_description: Option<Selector>,
}

fn compile(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            debug!("Ignoring invalid selector '{}': {:?}", selector, e);
            None
        }
    }
}

/// Page extractor for perfume detail pages
pub struct PerfumePageExtractor {
    config: ExtractorConfig,
    selectors: CompiledSelectors,
}

impl PerfumePageExtractor {
    /// Create a new extractor with default configuration
    pub fn new() -> Self {
        Self::with_config(ExtractorConfig::default())
    }

    /// Create a new extractor with custom configuration
    pub fn with_config(config: ExtractorConfig) -> Self {
        let selectors = CompiledSelectors {
            image: compile(&config.image_selector),
            og_image: compile(&config.og_image_selector),
            og_description: compile(&config.og_description_selector),
            description: compile(&config.description_selector),
            fallback_description: compile(&config.fallback_description_selector),
        };
        Self { config, selectors }
    }

    /// Parse `html` and extract both fields
    pub fn extract(&self, html: &str) -> ExtractedPage {
        let document = Html::parse_document(html);
        self.extract_from_document(&document)
    }

    pub fn extract_from_document(&self, document: &Html) -> ExtractedPage {
        let image_url = self.extract_image_url(document).map(|url| self.upgrade_image_url(&url));
        let description = self.extract_description(document);
        debug!(
            "Extracted image: {}, description: {}",
            image_url.is_some(),
            description.is_some()
        );
        ExtractedPage { image_url, description }
    }

    fn extract_image_url(&self, document: &Html) -> Option<String> {
        let from_img = first(document, self.selectors.image.as_ref()).and_then(|img| {
            non_blank_attr(&img, "src").or_else(|| non_blank_attr(&img, "data-src"))
        });

        from_img.or_else(|| {
            first(document, self.selectors.og_image.as_ref())
                .and_then(|meta| non_blank_attr(&meta, "content"))
        })
    }

    /// Rewrite a thumbnail URL to its full-size counterpart
    pub fn upgrade_image_url(&self, url: &str) -> String {
        if !self.config.low_res_segment.is_empty() && url.contains(&self.config.low_res_segment) {
            url.replace(&self.config.low_res_segment, &self.config.high_res_segment)
        } else {
            url.to_string()
        }
    }

    fn extract_description(&self, document: &Html) -> Option<String> {
        let from_og = first(document, self.selectors.og_description.as_ref())
            .and_then(|meta| non_blank_attr(&meta, "content"))
            .map(|content| unescape_basic_entities(&content))
            .filter(|d| !d.is_empty());

        from_og
            .or_else(|| first(document, self.selectors.description.as_ref()).and_then(|e| element_text(&e)))
            .or_else(|| {
                first(document, self.selectors.fallback_description.as_ref()).and_then(|e| element_text(&e))
            })
    }
}

impl Default for PerfumePageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn first<'a>(document: &'a Html, selector: Option<&Selector>) -> Option<ElementRef<'a>> {
    selector.and_then(|s| document.select(s).next())
}

fn non_blank_attr(element: &ElementRef, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Element text with each fragment trimmed and blank fragments dropped
fn element_text(element: &ElementRef) -> Option<String> {
    let text = element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

/// Pages double-escape some entities inside `content`; the parser resolves one
/// level, this resolves what remains for `&` and `"`
fn unescape_basic_entities(raw: &str) -> String {
    raw.replace("&amp;", "&").replace("&quot;", "\"").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FIXTURE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta property="og:image" content="https://fimgs.net/mdimg/perfume-thumbs/375x500.9828.jpg">
  <meta property="og:description" content="Aventus by Creed is a Chypre Fruity fragrance for men. Pineapple &amp;amp; birch &amp;quot;smoke&amp;quot;.">
</head>
<body>
  <div itemprop="description"><p>Ignored because og wins</p></div>
</body>
</html>"#;

    #[test]
    fn fixture_rewrites_thumbnail_and_unescapes_description() {
        let page = PerfumePageExtractor::new().extract(FIXTURE);
        assert_eq!(
            page.image_url.as_deref(),
            Some("https://fimgs.net/mdimg/perfume/375x500.9828.jpg")
        );
        assert_eq!(
            page.description.as_deref(),
            Some(r#"Aventus by Creed is a Chypre Fruity fragrance for men. Pineapple & birch "smoke"."#)
        );
    }

    #[test]
    fn itemprop_image_beats_og_image() {
        let html = r#"<html><head><meta property="og:image" content="https://x/og.jpg"></head>
            <body><img itemprop="image" src="https://x/main.jpg"></body></html>"#;
        let page = PerfumePageExtractor::new().extract(html);
        assert_eq!(page.image_url.as_deref(), Some("https://x/main.jpg"));
    }

    #[test]
    fn data_src_used_when_src_is_blank() {
        let html = r#"<body><img itemprop="image" src="" data-src="https://x/lazy.jpg"></body>"#;
        let page = PerfumePageExtractor::new().extract(html);
        assert_eq!(page.image_url.as_deref(), Some("https://x/lazy.jpg"));
    }

    #[test]
    fn image_tag_without_source_falls_back_to_og() {
        let html = r#"<html><head><meta property="og:image" content="https://x/og.jpg"></head>
            <body><img itemprop="image"></body></html>"#;
        let page = PerfumePageExtractor::new().extract(html);
        assert_eq!(page.image_url.as_deref(), Some("https://x/og.jpg"));
    }

    #[rstest]
    #[case::itemprop_div(
        r#"<div itemprop="description"> <p>Fresh</p> <p>and <b>woody</b></p> </div>"#,
        Some("Fresh and woody")
    )]
    #[case::grid_cell(r#"<div class="pgridCell"><p>  Grid text </p></div>"#, Some("Grid text"))]
    #[case::blank_og_falls_through(
        r#"<meta property="og:description" content="   "><div class="pgridCell"><p>Grid</p></div>"#,
        Some("Grid")
    )]
    #[case::nothing(r#"<div>unrelated</div>"#, None)]
    #[case::empty_itemprop(r#"<div itemprop="description">   </div>"#, None)]
    fn description_fallback_chain(#[case] body: &str, #[case] expected: Option<&str>) {
        let html = format!("<html><head></head><body>{body}</body></html>");
        let page = PerfumePageExtractor::new().extract(&html);
        assert_eq!(page.description.as_deref(), expected);
    }

    #[test]
    fn fields_miss_independently() {
        let only_image = PerfumePageExtractor::new()
            .extract(r#"<meta property="og:image" content="https://x/a.jpg">"#);
        assert!(only_image.image_url.is_some());
        assert!(only_image.description.is_none());

        let nothing = PerfumePageExtractor::new().extract("");
        assert_eq!(nothing, ExtractedPage::default());
    }

    #[test]
    fn invalid_selector_degrades_to_none() {
        let config = ExtractorConfig {
            image_selector: "img[[[".to_string(),
            ..ExtractorConfig::default()
        };
        let page = PerfumePageExtractor::with_config(config)
            .extract(r#"<img itemprop="image" src="https://x/a.jpg">"#);
        assert_eq!(page.image_url, None);
    }

    #[rstest]
    #[case("https://x/perfume-thumbs/1.jpg", "https://x/perfume/1.jpg")]
    #[case("https://x/perfume/1.jpg", "https://x/perfume/1.jpg")]
    #[case("https://x/other/1.jpg", "https://x/other/1.jpg")]
    fn thumbnail_rewrite(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(PerfumePageExtractor::new().upgrade_image_url(input), expected);
    }
}
