use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::{text_of, vivc_id_from_url};

static TBODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static A: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// One offspring row from a pedigree search: the crossing plus both parents
/// as printed by the catalogue.
#[derive(Debug, Clone)]
pub struct ChildRow {
    pub name: String,
    pub vivc_id: Option<String>,
    pub parent1: String,
    pub parent2: String,
}

/// Parse a pedigree search result page, keeping only rows where the queried
/// variety is actually named as parent 1 or parent 2. The search matches
/// loosely on substrings, so "GAMAY" would otherwise drag in every
/// "GAMAY TEINTURIER" crossing too.
pub fn parse_children(html: &str, parent_name: &str) -> Vec<ChildRow> {
    let doc = Html::parse_document(html);
    let mut children = Vec::new();

    let Some(tbody) = doc.select(&TBODY).next() else {
        return children;
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
        let vivc_id = link.value().attr("href").and_then(vivc_id_from_url);
        let parent1 = link_or_cell_text(&cells[2]);
        let parent2 = link_or_cell_text(&cells[3]);

        if parent_name.eq_ignore_ascii_case(&parent1) || parent_name.eq_ignore_ascii_case(&parent2)
        {
            children.push(ChildRow {
                name,
                vivc_id,
                parent1,
                parent2,
            });
        }
    }

    children
}

fn link_or_cell_text(cell: &ElementRef<'_>) -> String {
    cell.select(&A)
        .next()
        .map(|a| text_of(&a))
        .unwrap_or_else(|| text_of(cell))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/pedigree.html").unwrap()
    }

    #[test]
    fn exact_parent_matches_kept() {
        let children = parse_children(&fixture(), "Adisi");
        assert_eq!(children.len(), 2);
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"NERKARAT"));
        assert!(names.contains(&"KARMRAHYUT"));
    }

    #[test]
    fn loose_matches_filtered_out() {
        // "ADISI MUSCAT" is a substring hit, not a parent named ADISI.
        let children = parse_children(&fixture(), "Adisi");
        assert!(children.iter().all(|c| c.name != "TOZOT"));
    }

    #[test]
    fn child_ids_resolved() {
        let children = parse_children(&fixture(), "Adisi");
        let nerkarat = children.iter().find(|c| c.name == "NERKARAT").unwrap();
        assert_eq!(nerkarat.vivc_id.as_deref(), Some("8353"));
        assert_eq!(nerkarat.parent1, "ADISI");
    }

    #[test]
    fn no_results_page() {
        assert!(parse_children("<html><body></body></html>", "Adisi").is_empty());
    }
}
