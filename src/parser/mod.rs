pub mod listing;
pub mod passport;
pub mod pedigree;
pub mod photos;

use scraper::ElementRef;

/// Joined, whitespace-collapsed text content of an element. Catalogue cells
/// are littered with newlines and padding.
pub(crate) fn text_of(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the catalogue id from a passport-style href ("…&id=1234").
pub fn vivc_id_from_url(url: &str) -> Option<String> {
    if !url.contains("id=") {
        return None;
    }
    let tail = url.split("id=").last()?;
    let id = tail.split(['&', '#']).next().unwrap_or("");
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_from_passport_href() {
        assert_eq!(
            vivc_id_from_url("index.php?r=passport%2Fview&id=4419"),
            Some("4419".to_string())
        );
        assert_eq!(
            vivc_id_from_url("https://www.vivc.de/index.php?r=passport%2Fview&id=12&x=1"),
            Some("12".to_string())
        );
    }

    #[test]
    fn id_missing() {
        assert_eq!(vivc_id_from_url("index.php?r=species%2Fcountry"), None);
        assert_eq!(vivc_id_from_url(""), None);
        assert_eq!(vivc_id_from_url("index.php?id="), None);
    }
}
