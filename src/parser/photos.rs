use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::text_of;
use crate::catalog;

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static A: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static SELECT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("select").unwrap());
static PANEL_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.panel-heading").unwrap());
static PANEL_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p.panel-title").unwrap());

static KENN_NR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"kenn_nr=(\d+)").unwrap());
static SOURCE_BELOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)quote the source as indicated below[:\s]*['"]([^'"]+)['"]"#).unwrap()
});
static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"['"]([^'"]{30,})['"]"#).unwrap());
static WINDOW_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)window\.open\(['"]([^'"]+)['"]"#).unwrap());
static FOTO_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]([^'"]*fotoverweise[^'"]*)['"]"#).unwrap());
static POPUP_SOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)quote the source as indicated below:\s*(.+?)(?:Download|$)").unwrap()
});

/// Attribution text on photo pages always names an institute; used to tell
/// source strings apart from other quoted onclick payloads.
const SOURCE_KEYWORDS: &[&str] = &[
    "Institut",
    "Institute",
    "Research",
    "Centre",
    "Center",
    "Breeding",
    "JKI",
    "Geilweilerhof",
];

/// One row of the photo listing. `source` and `popup_url` come from the
/// thumbnail link's onclick payload when present; the popup page is only
/// fetched when the source is missing here.
#[derive(Debug, Clone)]
pub struct PhotoListingRow {
    pub vivc_id: String,
    pub photo_url: Option<String>,
    pub source: Option<String>,
    pub popup_url: Option<String>,
}

/// Parse a photo listing page. Column layout: prime name, color, variety
/// number, utilization, country, species, photo, part of plant. The header
/// row and the inline filter row (the one carrying `<select>` widgets) are
/// skipped.
pub fn parse_photo_listing(html: &str) -> Vec<PhotoListingRow> {
    let doc = Html::parse_document(html);
    let mut rows = Vec::new();

    let Some(table) = doc.select(&TABLE).next() else {
        return rows;
    };

    for tr in table.select(&TR).skip(1) {
        if tr.select(&SELECT).next().is_some() {
            continue;
        }
        let cells: Vec<_> = tr.select(&TD).collect();
        if cells.len() < 7 {
            continue;
        }
        let Some(vivc_id) = extract_row_id(&cells[2]) else {
            continue;
        };

        let photo_cell = &cells[6];
        let mut photo_url = photo_cell
            .select(&IMG)
            .next()
            .and_then(|img| img.value().attr("src"))
            .filter(|src| is_real_href(src))
            .map(catalog::absolutize);

        let mut source = None;
        let mut popup_url = None;
        if let Some(link) = photo_cell.select(&A).next() {
            let attrs = link.value();
            popup_url = attrs
                .attr("data-url")
                .or_else(|| attrs.attr("data-href"))
                .map(catalog::absolutize);

            if let Some(onclick) = attrs.attr("onclick") {
                source = source_from_onclick(onclick);
                if popup_url.is_none() {
                    popup_url = popup_from_onclick(onclick);
                }
            }
            if photo_url.is_none() {
                photo_url = attrs
                    .attr("href")
                    .filter(|href| is_real_href(href))
                    .map(catalog::absolutize);
            }
        }

        rows.push(PhotoListingRow {
            vivc_id,
            photo_url,
            source,
            popup_url,
        });
    }

    rows
}

/// Whether the listing has a further page (the catalogue renders a `»` link
/// in its pagination widget).
pub fn has_next_page(html: &str) -> bool {
    let doc = Html::parse_document(html);
    doc.select(&A).any(|a| text_of(&a) == "»")
}

/// Pull the attribution text out of a photo popup page. The popup wraps it
/// in a panel heading that opens with a "Please note … quote the source"
/// paragraph, followed by the source itself.
pub fn parse_popup_source(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    for heading in doc.select(&PANEL_HEADING) {
        let heading_text = text_of(&heading);
        if !heading_text.contains("Please note")
            || !heading_text.to_lowercase().contains("quote the source")
        {
            continue;
        }
        for p in heading.select(&PANEL_TITLE) {
            let t = text_of(&p);
            if t.contains("Please note") {
                continue;
            }
            if t.len() > 30 {
                return Some(t);
            }
        }
        // Markup variant without panel-title paragraphs.
        if let Some(caps) = POPUP_SOURCE_RE.captures(&heading_text) {
            let source = collapse(&caps[1]);
            if source.len() > 20 {
                return Some(source);
            }
        }
    }
    None
}

/// Variety number cell: a link with `kenn_nr=` in its href, a link whose
/// text is the bare number, or the number as plain cell text.
fn extract_row_id(cell: &ElementRef<'_>) -> Option<String> {
    if let Some(link) = cell.select(&A).next() {
        if let Some(href) = link.value().attr("href") {
            if let Some(caps) = KENN_NR_RE.captures(href) {
                return Some(caps[1].to_string());
            }
        }
        let text = text_of(&link);
        if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
            return Some(text);
        }
    }
    let text = text_of(cell).replace(char::is_whitespace, "");
    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        Some(text)
    } else {
        None
    }
}

fn source_from_onclick(onclick: &str) -> Option<String> {
    if let Some(caps) = SOURCE_BELOW_RE.captures(onclick) {
        let cleaned = clean_source(&caps[1]);
        if cleaned.len() > 20 {
            return Some(cleaned);
        }
    }
    // Fallback: longest quoted string that names an attribution keyword.
    let mut candidates: Vec<String> = QUOTED_RE
        .captures_iter(onclick)
        .map(|c| clean_source(&c[1]))
        .filter(|s| SOURCE_KEYWORDS.iter().any(|k| s.contains(k)))
        .collect();
    candidates.sort_by_key(|s| std::cmp::Reverse(s.len()));
    candidates.into_iter().next()
}

fn popup_from_onclick(onclick: &str) -> Option<String> {
    let url = WINDOW_OPEN_RE
        .captures(onclick)
        .or_else(|| FOTO_URL_RE.captures(onclick))
        .map(|c| c[1].to_string())?;
    Some(catalog::absolutize(&url))
}

fn clean_source(raw: &str) -> String {
    let unescaped = raw
        .replace("\\n", " ")
        .replace("\\r", " ")
        .replace("\\t", " ")
        .replace("\\\"", "\"")
        .replace("\\'", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    collapse(&unescaped)
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_real_href(href: &str) -> bool {
    !href.is_empty() && href != "#" && !href.starts_with("javascript:")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/photos.html").unwrap()
    }

    #[test]
    fn photo_rows_extracted() {
        let rows = parse_photo_listing(&fixture());
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].vivc_id, "132");
        assert_eq!(
            rows[0].photo_url.as_deref(),
            Some("https://www.vivc.de/images/foto/132_1.jpg")
        );
    }

    #[test]
    fn source_pulled_from_onclick() {
        let rows = parse_photo_listing(&fixture());
        let source = rows[0].source.as_deref().unwrap();
        assert!(source.contains("Julius Kühn-Institut"));
    }

    #[test]
    fn popup_url_from_onclick() {
        let rows = parse_photo_listing(&fixture());
        assert_eq!(
            rows[1].popup_url.as_deref(),
            Some("https://www.vivc.de/index.php?r=fotoverweise%2Fview&kenn_nr=245")
        );
        // Second row has no inline source; the popup has to supply it.
        assert_eq!(rows[1].source, None);
    }

    #[test]
    fn filter_row_skipped() {
        // The fixture carries a filter row with <select> widgets; it must not
        // surface as a photo row.
        let rows = parse_photo_listing(&fixture());
        assert!(rows.iter().all(|r| !r.vivc_id.is_empty()));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn pagination_marker() {
        assert!(has_next_page(&fixture()));
        assert!(!has_next_page("<html><body><a href=\"x\">1</a></body></html>"));
    }

    #[test]
    fn popup_source_extracted() {
        let html = std::fs::read_to_string("tests/fixtures/photo_popup.html").unwrap();
        let source = parse_popup_source(&html).unwrap();
        assert!(source.contains("Geilweilerhof"));
        assert!(!source.contains("Please note"));
    }

    #[test]
    fn popup_without_panel_yields_none() {
        assert_eq!(parse_popup_source("<html><body><p>nothing</p></body></html>"), None);
    }
}
