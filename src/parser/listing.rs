use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::text_of;
use crate::catalog;

static TBODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static A: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// One grape row from a country listing page. `species` and `color` are raw
/// catalogue strings; the normalizer owns their vocabulary.
#[derive(Debug, Clone)]
pub struct ListingRow {
    pub name: String,
    pub url: String,
    pub species: Option<String>,
    pub color: Option<String>,
}

/// Parse one page of the per-country species listing.
///
/// Column layout: prime name (link), cultivar number, species, color of
/// berry skin (link). Rows without a name link or with too few cells are
/// skipped; an absent color link degrades to `None` rather than failing.
pub fn parse_listing(html: &str) -> Vec<ListingRow> {
    let doc = Html::parse_document(html);
    let mut rows = Vec::new();

    let Some(tbody) = doc.select(&TBODY).next() else {
        return rows;
    };

    for tr in tbody.select(&TR) {
        let cells: Vec<_> = tr.select(&TD).collect();
        if cells.len() < 4 {
            continue;
        }
        let Some(link) = cells[0].select(&A).next() else {
            continue;
        };
        let name = text_of(&link);
        if name.is_empty() {
            continue;
        }
        let url = catalog::absolutize(link.value().attr("href").unwrap_or(""));
        let species = Some(text_of(&cells[2])).filter(|s| !s.is_empty());
        let color = cells[3]
            .select(&A)
            .next()
            .map(|a| text_of(&a))
            .filter(|s| !s.is_empty());

        rows.push(ListingRow {
            name,
            url,
            species,
            color,
        });
    }

    rows
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/listing.html").unwrap()
    }

    #[test]
    fn listing_rows_extracted() {
        let rows = parse_listing(&fixture());
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].name, "ADISI");
        assert!(rows[0].url.ends_with("r=passport%2Fview&id=132"));
        assert_eq!(rows[0].species.as_deref(), Some("VITIS VINIFERA LINNÉ SUBSP. VINIFERA"));
        assert_eq!(rows[0].color.as_deref(), Some("NOIR"));
    }

    #[test]
    fn missing_color_degrades_to_none() {
        let rows = parse_listing(&fixture());
        let areni = rows.iter().find(|r| r.name == "ARENI").unwrap();
        assert_eq!(areni.color, None);
    }

    #[test]
    fn page_without_tbody_is_empty() {
        assert!(parse_listing("<html><body><p>No results</p></body></html>").is_empty());
    }
}
