use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::{text_of, vivc_id_from_url};

static ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.passport-view table tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());
static A: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// A parent reference on a passport page, resolved from the parent link.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentRef {
    pub vivc_id: String,
    pub name: String,
}

/// Structured view of a grape passport (variety detail) page. Every field
/// the markup fails to yield is simply absent.
#[derive(Debug, Clone, Default)]
pub struct Passport {
    pub prime_name: Option<String>,
    pub year_of_crossing: Option<String>,
    pub breeder: Option<String>,
    pub country_of_origin: Option<String>,
    pub full_pedigree: bool,
    /// 0–2 entries, in parent-1/parent-2 order.
    pub parents: Vec<ParentRef>,
}

/// Parse a passport page. The page is a key/value table; keys are matched
/// loosely because the catalogue has reworded them over the years.
pub fn parse_passport(html: &str) -> Passport {
    let doc = Html::parse_document(html);
    let mut passport = Passport::default();

    for row in doc.select(&ROW) {
        let cells: Vec<_> = row.select(&CELL).collect();
        if cells.len() < 2 {
            continue;
        }
        let key = text_of(&cells[0]).to_lowercase();
        let value = &cells[1];

        if key.contains("prime name of parent") {
            if let Some(parent) = parent_ref(value) {
                if passport.parents.len() < 2
                    && !passport.parents.iter().any(|p| p.vivc_id == parent.vivc_id)
                {
                    passport.parents.push(parent);
                }
            }
        } else if key.contains("prime name") {
            set_once(&mut passport.prime_name, text_of(value));
        } else if key.contains("full pedigree") {
            passport.full_pedigree = text_of(value).eq_ignore_ascii_case("yes");
        } else if key.contains("year of crossing") || key.contains("crossing year") {
            set_once(&mut passport.year_of_crossing, text_of(value));
        } else if key.contains("breeder") && !key.contains("parent") {
            // "Breeder" comes before "Breeder contact"; first hit wins.
            set_once(&mut passport.breeder, text_of(value));
        } else if key.contains("country or region of origin") {
            set_once(&mut passport.country_of_origin, text_of(value));
        }
    }

    passport
}

fn parent_ref(cell: &ElementRef<'_>) -> Option<ParentRef> {
    let link = cell.select(&A).next()?;
    let vivc_id = vivc_id_from_url(link.value().attr("href")?)?;
    let name = text_of(&link);
    Some(ParentRef { vivc_id, name })
}

fn set_once(slot: &mut Option<String>, value: String) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value);
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/passport.html").unwrap()
    }

    #[test]
    fn passport_fields_extracted() {
        let p = parse_passport(&fixture());
        assert_eq!(p.prime_name.as_deref(), Some("ADISI"));
        assert_eq!(p.year_of_crossing.as_deref(), Some("1988"));
        assert_eq!(
            p.breeder.as_deref(),
            Some("ARMENIAN RESEARCH INSTITUTE OF VITICULTURE")
        );
        assert_eq!(p.country_of_origin.as_deref(), Some("ARMENIA"));
        assert!(p.full_pedigree);
    }

    #[test]
    fn both_parents_resolved() {
        let p = parse_passport(&fixture());
        assert_eq!(p.parents.len(), 2);
        assert_eq!(p.parents[0].vivc_id, "456");
        assert_eq!(p.parents[0].name, "ARARATI");
        assert_eq!(p.parents[1].vivc_id, "789");
    }

    #[test]
    fn unknown_markup_degrades_to_empty() {
        let p = parse_passport("<html><body><table><tr><td>x</td></tr></table></body></html>");
        assert_eq!(p.prime_name, None);
        assert!(p.parents.is_empty());
        assert!(!p.full_pedigree);
    }
}
