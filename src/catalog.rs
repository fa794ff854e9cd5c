//! URL builders and the country table for the VIVC catalogue.

pub const BASE_URL: &str = "https://www.vivc.de";

/// Max rows the catalogue serves per listing page.
pub const LISTING_PER_PAGE: usize = 500;

/// European country name → ISO 3166-1 alpha-3 code, as used by the
/// catalogue's country search form.
pub const COUNTRIES: &[(&str, &str)] = &[
    ("albania", "ALB"),
    ("andorra", "AND"),
    ("armenia", "ARM"),
    ("austria", "AUT"),
    ("azerbaijan", "AZE"),
    ("belarus", "BLR"),
    ("belgium", "BEL"),
    ("bosnia and herzegovina", "BIH"),
    ("bulgaria", "BGR"),
    ("croatia", "HRV"),
    ("cyprus", "CYP"),
    ("czechia", "CZE"),
    ("denmark", "DNK"),
    ("estonia", "EST"),
    ("finland", "FIN"),
    ("france", "FRA"),
    ("georgia", "GEO"),
    ("germany", "DEU"),
    ("greece", "GRC"),
    ("hungary", "HUN"),
    ("iceland", "ISL"),
    ("ireland", "IRL"),
    ("italy", "ITA"),
    ("kazakhstan", "KAZ"),
    ("kosovo", "XKX"),
    ("latvia", "LVA"),
    ("liechtenstein", "LIE"),
    ("lithuania", "LTU"),
    ("luxembourg", "LUX"),
    ("malta", "MLT"),
    ("moldova", "MDA"),
    ("monaco", "MCO"),
    ("montenegro", "MNE"),
    ("netherlands", "NLD"),
    ("north macedonia", "MKD"),
    ("norway", "NOR"),
    ("poland", "POL"),
    ("portugal", "PRT"),
    ("romania", "ROU"),
    ("russia", "RUS"),
    ("san marino", "SMR"),
    ("serbia", "SRB"),
    ("slovakia", "SVK"),
    ("slovenia", "SVN"),
    ("spain", "ESP"),
    ("sweden", "SWE"),
    ("switzerland", "CHE"),
    ("turkey", "TUR"),
    ("ukraine", "UKR"),
    ("united kingdom", "GBR"),
    ("vatican city", "VAT"),
];

pub fn iso_for_name(name: &str) -> Option<&'static str> {
    let wanted = name.trim().to_lowercase();
    COUNTRIES
        .iter()
        .find(|(n, _)| *n == wanted)
        .map(|(_, iso)| *iso)
}

/// Paginated country listing (species/country search).
pub fn listing_url(iso: &str, page: usize) -> String {
    format!(
        "{BASE_URL}/index.php?per-page={LISTING_PER_PAGE}&page={page}\
         &SpeciesSearch[landescode22]={iso}&r=species%2Fcountry"
    )
}

/// The search URL stored on a country row.
pub fn country_search_url(iso: &str) -> String {
    format!("{BASE_URL}/index.php?r=species%2Fcountry&SpeciesSearch[landescode22]={iso}")
}

/// Passport (variety detail) page for a catalogue id.
pub fn passport_url(vivc_id: &str) -> String {
    format!("{BASE_URL}/index.php?r=passport%2Fview&id={vivc_id}")
}

/// Pedigree search listing all crossings that name this variety as a parent.
pub fn pedigree_search_url(grape_name: &str) -> String {
    format!(
        "{BASE_URL}/index.php?r=pedigree%2Findex&PedigreeSearch%5Btext%5D={}",
        grape_name.trim().replace(' ', "+")
    )
}

/// Photo listing filtered by part-of-plant search term.
pub fn photo_listing_url(search_param: &str, page: usize) -> String {
    format!(
        "{BASE_URL}/index.php?r=fotoverweise%2Fresult\
         &FotoverweiseSearch%5Bpartplant%5D={search_param}&page={page}"
    )
}

/// Resolve a relative catalogue href against the base URL.
pub fn absolutize(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{BASE_URL}{href}")
    } else {
        format!("{BASE_URL}/{href}")
    }
}

// ── Tests ──
