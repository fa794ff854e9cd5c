//! Canonicalization of free-text catalogue fields.

use std::fmt;

/// Berry skin color, reduced to the fixed site vocabulary.
///
/// The catalogue mixes French color terms ("NOIR", "BLANC") with free text;
/// anything unrecognized collapses to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BerryColor {
    Red,
    Black,
    Pink,
    White,
    Unknown,
}

impl BerryColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            BerryColor::Red => "Red",
            BerryColor::Black => "Black",
            BerryColor::Pink => "Pink",
            BerryColor::White => "White",
            BerryColor::Unknown => "Unknown",
        }
    }

    /// Parse a stored canonical value. Unlike [`normalize_color`] this only
    /// accepts the five canonical strings.
    pub fn parse(s: &str) -> BerryColor {
        match s {
            "Red" => BerryColor::Red,
            "Black" => BerryColor::Black,
            "Pink" => BerryColor::Pink,
            "White" => BerryColor::White,
            _ => BerryColor::Unknown,
        }
    }
}

impl fmt::Display for BerryColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const COLOR_MAP: &[(&str, BerryColor)] = &[
    ("rouge", BerryColor::Red),
    ("red", BerryColor::Red),
    ("noir", BerryColor::Black),
    ("black", BerryColor::Black),
    ("rose", BerryColor::Pink),
    ("pink", BerryColor::Pink),
    ("blanc", BerryColor::White),
    ("white", BerryColor::White),
];

/// Map a raw catalogue color string onto the five-value vocabulary.
/// Case-insensitive; surrounding whitespace ignored; exact matches are tried
/// before substring matches ("rouge fonce" still maps to Red).
pub fn normalize_color(raw: &str) -> BerryColor {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() || lower.starts_with("not specified") || lower.starts_with("not_specified")
    {
        return BerryColor::Unknown;
    }

    for (key, color) in COLOR_MAP {
        if lower == *key {
            return *color;
        }
    }
    for (key, color) in COLOR_MAP {
        if lower.contains(key) {
            return *color;
        }
    }
    BerryColor::Unknown
}

/// Normalize a grape or country name: the catalogue shouts everything in
/// ALL CAPS, which we fold to Title Case. Names that already carry mixed
/// case are left untouched.
pub fn normalize_name(raw: &str) -> String {
    let letters: Vec<char> = raw.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return raw.to_string();
    }

    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    let all_caps = letters.iter().all(|c| c.is_uppercase());
    let mostly_caps = upper as f64 / letters.len() as f64 > 0.7;

    if all_caps || mostly_caps {
        title_case(raw)
    } else {
        raw.to_string()
    }
}

/// Capitalize the letter after every non-letter boundary, lowercase the rest.
/// "GAMAY DE BOUZE" → "Gamay De Bouze", "SAINT-MACAIRE" → "Saint-Macaire".
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_boundary = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_boundary {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_boundary = false;
        } else {
            out.push(c);
            at_boundary = true;
        }
    }
    out
}

/// Display form of a catalogue-map country name ("bosnia and herzegovina" →
/// "Bosnia And Herzegovina"). Always title-cased so spelling variants from
/// different imports collapse onto one row.
pub fn country_display_name(raw: &str) -> String {
    title_case(raw.trim())
}

/// Canonical form of a photo URL for duplicate detection: query string,
/// fragment, and trailing slash stripped.
pub fn canonical_photo_url(url: &str) -> String {
    let base = url.split(['?', '#']).next().unwrap_or(url);
    base.trim_end_matches('/').to_string()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn french_colors_map() {
        assert_eq!(normalize_color("NOIR"), BerryColor::Black);
        assert_eq!(normalize_color("blanc"), BerryColor::White);
        assert_eq!(normalize_color("Rouge"), BerryColor::Red);
        assert_eq!(normalize_color("ROSE"), BerryColor::Pink);
    }

    #[test]
    fn mixed_case_and_whitespace() {
        // "Red " with trailing space and mixed case still lands on Red.
        assert_eq!(normalize_color("Red "), BerryColor::Red);
        assert_eq!(normalize_color("  rouge fonce "), BerryColor::Red);
    }

    #[test]
    fn unrecognized_is_unknown() {
        assert_eq!(normalize_color("gris"), BerryColor::Unknown);
        assert_eq!(normalize_color(""), BerryColor::Unknown);
        assert_eq!(normalize_color("NOT SPECIFIED"), BerryColor::Unknown);
        assert_eq!(normalize_color("not_specified"), BerryColor::Unknown);
    }

    #[test]
    fn all_caps_names_fold_to_title_case() {
        assert_eq!(normalize_name("ADISI"), "Adisi");
        assert_eq!(normalize_name("GAMAY DE BOUZE"), "Gamay De Bouze");
        assert_eq!(normalize_name("SAINT-MACAIRE"), "Saint-Macaire");
    }

    #[test]
    fn mixed_case_names_kept() {
        assert_eq!(normalize_name("Pinot Noir"), "Pinot Noir");
        assert_eq!(normalize_name("McIntosh"), "McIntosh");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn country_display_names_title_cased() {
        assert_eq!(country_display_name("armenia"), "Armenia");
        assert_eq!(
            country_display_name("bosnia and herzegovina"),
            "Bosnia And Herzegovina"
        );
    }

    #[test]
    fn canonical_url_strips_query_and_slash() {
        assert_eq!(
            canonical_photo_url("https://x.de/images/1.jpg?size=big#top"),
            "https://x.de/images/1.jpg"
        );
        assert_eq!(canonical_photo_url("https://x.de/images/1.jpg/"), "https://x.de/images/1.jpg");
    }

    #[test]
    fn canonical_color_roundtrip() {
        for c in ["Red", "Black", "Pink", "White", "Unknown"] {
            assert_eq!(BerryColor::parse(c).as_str(), c);
        }
        assert_eq!(BerryColor::parse("chartreuse"), BerryColor::Unknown);
    }
}
