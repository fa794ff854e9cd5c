use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::normalize::BerryColor;

const DB_PATH: &str = "data/grapes.sqlite";

const GRAPE_COLS: &str =
    "grape.vivc_id, grape.name, grape.url, grape.berry_color, grape.species, grape.year_of_crossing, grape.breeder, grape.country_code, grape.last_crawled";

pub fn connect() -> Result<Connection> {
    if let Some(dir) = std::path::Path::new(DB_PATH).parent() {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS country (
            iso_code   TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            search_url TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS grape (
            vivc_id          TEXT PRIMARY KEY,
            name             TEXT NOT NULL,
            url              TEXT NOT NULL,
            berry_color      TEXT NOT NULL DEFAULT 'Unknown'
                             CHECK(berry_color IN ('Red','Black','Pink','White','Unknown')),
            species          TEXT,
            year_of_crossing TEXT,
            breeder          TEXT,
            country_code     TEXT REFERENCES country(iso_code),
            last_crawled     TEXT,
            created_at       TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_grape_name ON grape(name);
        CREATE INDEX IF NOT EXISTS idx_grape_country ON grape(country_code);

        CREATE TABLE IF NOT EXISTS grape_parent (
            vivc_id   TEXT NOT NULL REFERENCES grape(vivc_id),
            parent_id TEXT NOT NULL REFERENCES grape(vivc_id),
            UNIQUE(vivc_id, parent_id)
        );
        CREATE INDEX IF NOT EXISTS idx_parent_reverse ON grape_parent(parent_id);

        CREATE TABLE IF NOT EXISTS grape_photo (
            id         INTEGER PRIMARY KEY,
            vivc_id    TEXT NOT NULL REFERENCES grape(vivc_id),
            url        TEXT NOT NULL,
            photo_type TEXT NOT NULL CHECK(photo_type IN ('field','laboratory')),
            source     TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(vivc_id, url)
        );
        CREATE INDEX IF NOT EXISTS idx_photo_grape ON grape_photo(vivc_id);
        ",
    )?;
    Ok(())
}

// ── Row types ──

#[derive(Debug, Clone, PartialEq)]
pub struct CountryRow {
    pub iso_code: String,
    pub name: String,
    pub search_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrapeRow {
    pub vivc_id: String,
    pub name: String,
    pub url: String,
    pub berry_color: BerryColor,
    pub species: Option<String>,
    pub year_of_crossing: Option<String>,
    pub breeder: Option<String>,
    pub country_code: Option<String>,
    pub last_crawled: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoKind {
    Field,
    Laboratory,
}

impl PhotoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoKind::Field => "field",
            PhotoKind::Laboratory => "laboratory",
        }
    }

    fn parse(s: &str) -> PhotoKind {
        match s {
            "laboratory" => PhotoKind::Laboratory,
            _ => PhotoKind::Field,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhotoRow {
    pub vivc_id: String,
    pub url: String,
    pub photo_type: PhotoKind,
    pub source: String,
}

/// What an upsert did, so batch summaries can count precisely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
    Unchanged,
}

fn grape_from_row(row: &Row<'_>) -> rusqlite::Result<GrapeRow> {
    Ok(GrapeRow {
        vivc_id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        berry_color: BerryColor::parse(&row.get::<_, String>(3)?),
        species: row.get(4)?,
        year_of_crossing: row.get(5)?,
        breeder: row.get(6)?,
        country_code: row.get(7)?,
        last_crawled: row.get(8)?,
    })
}

// ── Countries ──

/// Upsert by ISO code (the natural key). Existing rows only ever have their
/// name or search URL corrected; re-running with identical data is a no-op.
pub fn upsert_country(conn: &Connection, country: &CountryRow) -> Result<Upsert> {
    match get_country(conn, &country.iso_code)? {
        None => {
            conn.execute(
                "INSERT INTO country (iso_code, name, search_url) VALUES (?1, ?2, ?3)",
                params![country.iso_code, country.name, country.search_url],
            )?;
            Ok(Upsert::Created)
        }
        Some(existing)
            if existing.name == country.name && existing.search_url == country.search_url =>
        {
            Ok(Upsert::Unchanged)
        }
        Some(_) => {
            conn.execute(
                "UPDATE country SET name = ?2, search_url = ?3 WHERE iso_code = ?1",
                params![country.iso_code, country.name, country.search_url],
            )?;
            Ok(Upsert::Updated)
        }
    }
}

pub fn get_country(conn: &Connection, iso_code: &str) -> Result<Option<CountryRow>> {
    let row = conn
        .query_row(
            "SELECT iso_code, name, search_url FROM country WHERE iso_code = ?1",
            params![iso_code],
            |row| {
                Ok(CountryRow {
                    iso_code: row.get(0)?,
                    name: row.get(1)?,
                    search_url: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Resolve a user-supplied country by ISO code or display name, both
/// case-insensitively.
pub fn find_country(conn: &Connection, name_or_iso: &str) -> Result<Option<CountryRow>> {
    let row = conn
        .query_row(
            "SELECT iso_code, name, search_url FROM country
             WHERE iso_code = ?1 COLLATE NOCASE OR name = ?1 COLLATE NOCASE",
            params![name_or_iso.trim()],
            |row| {
                Ok(CountryRow {
                    iso_code: row.get(0)?,
                    name: row.get(1)?,
                    search_url: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// All countries with their grape counts, most grapes first.
pub fn list_countries(conn: &Connection) -> Result<Vec<(CountryRow, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT c.iso_code, c.name, c.search_url, COUNT(g.vivc_id) AS n
         FROM country c
         LEFT JOIN grape g ON g.country_code = c.iso_code
         GROUP BY c.iso_code
         ORDER BY n DESC, c.name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                CountryRow {
                    iso_code: row.get(0)?,
                    name: row.get(1)?,
                    search_url: row.get(2)?,
                },
                row.get(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Grapes ──

pub fn get_grape(conn: &Connection, vivc_id: &str) -> Result<Option<GrapeRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {GRAPE_COLS} FROM grape WHERE vivc_id = ?1"),
            params![vivc_id],
            grape_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Upsert by catalogue id. The crawl marker is never touched here, so
/// re-importing a country does not reset relationship progress.
pub fn upsert_grape(conn: &Connection, grape: &GrapeRow) -> Result<Upsert> {
    match get_grape(conn, &grape.vivc_id)? {
        None => {
            conn.execute(
                "INSERT INTO grape
                 (vivc_id, name, url, berry_color, species, year_of_crossing, breeder, country_code)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    grape.vivc_id,
                    grape.name,
                    grape.url,
                    grape.berry_color.as_str(),
                    grape.species,
                    grape.year_of_crossing,
                    grape.breeder,
                    grape.country_code,
                ],
            )?;
            Ok(Upsert::Created)
        }
        Some(existing) => {
            let changed = existing.name != grape.name
                || existing.url != grape.url
                || existing.berry_color != grape.berry_color
                || existing.species != grape.species
                || existing.year_of_crossing != grape.year_of_crossing
                || existing.breeder != grape.breeder
                || existing.country_code != grape.country_code;
            if !changed {
                return Ok(Upsert::Unchanged);
            }
            update_grape(conn, grape)?;
            Ok(Upsert::Updated)
        }
    }
}

/// Rewrite the content fields of an existing grape (not the crawl marker).
pub fn update_grape(conn: &Connection, grape: &GrapeRow) -> Result<()> {
    conn.execute(
        "UPDATE grape SET name = ?2, url = ?3, berry_color = ?4, species = ?5,
                          year_of_crossing = ?6, breeder = ?7, country_code = ?8,
                          updated_at = datetime('now')
         WHERE vivc_id = ?1",
        params![
            grape.vivc_id,
            grape.name,
            grape.url,
            grape.berry_color.as_str(),
            grape.species,
            grape.year_of_crossing,
            grape.breeder,
            grape.country_code,
        ],
    )?;
    Ok(())
}

/// Case-insensitive substring search on name.
pub fn search_grapes(conn: &Connection, query: &str) -> Result<Vec<GrapeRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GRAPE_COLS} FROM grape WHERE name LIKE '%' || ?1 || '%' ORDER BY name"
    ))?;
    let rows = stmt
        .query_map(params![query.trim()], grape_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn grapes_for_country(conn: &Connection, iso_code: &str) -> Result<Vec<GrapeRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GRAPE_COLS} FROM grape WHERE country_code = ?1 ORDER BY name"
    ))?;
    let rows = stmt
        .query_map(params![iso_code], grape_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// All grapes, optionally restricted to one country and/or capped, in
/// catalogue-id order so batch runs are stable across invocations.
pub fn all_grapes(
    conn: &Connection,
    country_code: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<GrapeRow>> {
    let mut sql = format!("SELECT {GRAPE_COLS} FROM grape");
    if country_code.is_some() {
        sql.push_str(" WHERE country_code = ?1");
    }
    sql.push_str(" ORDER BY CAST(vivc_id AS INTEGER)");
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {n}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = match country_code {
        Some(code) => stmt.query_map(params![code], grape_from_row)?,
        None => stmt.query_map([], grape_from_row)?,
    }
    .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn color_counts_for_country(conn: &Connection, iso_code: &str) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT berry_color, COUNT(*) AS n FROM grape
         WHERE country_code = ?1 GROUP BY berry_color ORDER BY n DESC, berry_color",
    )?;
    let rows = stmt
        .query_map(params![iso_code], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// (name, vivc_id) pairs for the autocomplete index, name order.
pub fn name_index(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT name, vivc_id FROM grape ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Relationships ──

fn grape_exists(conn: &Connection, vivc_id: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM grape WHERE vivc_id = ?1)",
        params![vivc_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Record `parent_id` as a parent of `vivc_id`. Returns false without
/// writing when either grape is missing, the pair already exists, or the
/// link would be self-referential.
pub fn add_parent(conn: &Connection, vivc_id: &str, parent_id: &str) -> Result<bool> {
    if vivc_id == parent_id {
        return Ok(false);
    }
    if !grape_exists(conn, vivc_id)? || !grape_exists(conn, parent_id)? {
        return Ok(false);
    }
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO grape_parent (vivc_id, parent_id) VALUES (?1, ?2)",
        params![vivc_id, parent_id],
    )?;
    Ok(inserted > 0)
}

pub fn has_parents(conn: &Connection, vivc_id: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM grape_parent WHERE vivc_id = ?1)",
        params![vivc_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn parents_of(conn: &Connection, vivc_id: &str) -> Result<Vec<GrapeRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GRAPE_COLS} FROM grape
         JOIN grape_parent gp ON gp.parent_id = grape.vivc_id
         WHERE gp.vivc_id = ?1 ORDER BY grape.name"
    ))?;
    let rows = stmt
        .query_map(params![vivc_id], grape_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Children are derived: every grape whose parent set names this id.
pub fn children_of(conn: &Connection, vivc_id: &str) -> Result<Vec<GrapeRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GRAPE_COLS} FROM grape
         JOIN grape_parent gp ON gp.vivc_id = grape.vivc_id
         WHERE gp.parent_id = ?1 ORDER BY grape.name"
    ))?;
    let rows = stmt
        .query_map(params![vivc_id], grape_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_crawled(conn: &Connection, vivc_id: &str, timestamp: &str) -> Result<()> {
    conn.execute(
        "UPDATE grape SET last_crawled = ?2 WHERE vivc_id = ?1",
        params![vivc_id, timestamp],
    )?;
    Ok(())
}

/// Grapes whose parents are recorded but which were never marked crawled —
/// the backfill set for resumable relationship imports.
pub fn grapes_with_parents_uncrawled(conn: &Connection) -> Result<Vec<GrapeRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GRAPE_COLS} FROM grape
         WHERE last_crawled IS NULL
           AND EXISTS(SELECT 1 FROM grape_parent gp WHERE gp.vivc_id = grape.vivc_id)
         ORDER BY name"
    ))?;
    let rows = stmt
        .query_map([], grape_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Photos ──

/// Insert a photo, ignoring exact (grape, url) duplicates. Canonical-URL
/// duplicate checks happen in the import pipeline before calling this.
pub fn insert_photo(conn: &Connection, photo: &PhotoRow) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO grape_photo (vivc_id, url, photo_type, source)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            photo.vivc_id,
            photo.url,
            photo.photo_type.as_str(),
            photo.source
        ],
    )?;
    Ok(inserted > 0)
}

/// All stored (id, url, source) triples for one grape, insertion order.
pub fn photos_of(conn: &Connection, vivc_id: &str) -> Result<Vec<(i64, String, String)>> {
    let mut stmt =
        conn.prepare("SELECT id, url, source FROM grape_photo WHERE vivc_id = ?1 ORDER BY id")?;
    let rows = stmt
        .query_map(params![vivc_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_photo_source(conn: &Connection, photo_id: i64, source: &str) -> Result<()> {
    conn.execute(
        "UPDATE grape_photo SET source = ?2 WHERE id = ?1",
        params![photo_id, source],
    )?;
    Ok(())
}

pub fn has_photo_of_type(conn: &Connection, vivc_id: &str, kind: PhotoKind) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM grape_photo WHERE vivc_id = ?1 AND photo_type = ?2)",
        params![vivc_id, kind.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// The photo surfaced on a grape profile: field over laboratory, earliest
/// insertion within the type ('field' happens to sort before 'laboratory').
pub fn preferred_photo(conn: &Connection, vivc_id: &str) -> Result<Option<PhotoRow>> {
    let row = conn
        .query_row(
            "SELECT vivc_id, url, photo_type, source FROM grape_photo
             WHERE vivc_id = ?1 ORDER BY photo_type, id LIMIT 1",
            params![vivc_id],
            |row| {
                Ok(PhotoRow {
                    vivc_id: row.get(0)?,
                    url: row.get(1)?,
                    photo_type: PhotoKind::parse(&row.get::<_, String>(2)?),
                    source: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

// ── Stats ──

pub struct Stats {
    pub countries: usize,
    pub grapes: usize,
    pub crawled: usize,
    pub parent_links: usize,
    pub photos: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let countries = conn.query_row("SELECT COUNT(*) FROM country", [], |r| r.get(0))?;
    let grapes = conn.query_row("SELECT COUNT(*) FROM grape", [], |r| r.get(0))?;
    let crawled = conn.query_row(
        "SELECT COUNT(*) FROM grape WHERE last_crawled IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let parent_links = conn.query_row("SELECT COUNT(*) FROM grape_parent", [], |r| r.get(0))?;
    let photos = conn.query_row("SELECT COUNT(*) FROM grape_photo", [], |r| r.get(0))?;
    Ok(Stats {
        countries,
        grapes,
        crawled,
        parent_links,
        photos,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn armenia() -> CountryRow {
        CountryRow {
            iso_code: "ARM".into(),
            name: "Armenia".into(),
            search_url: "https://www.vivc.de/?r=species%2Fcountry".into(),
        }
    }

    fn grape(id: &str, name: &str) -> GrapeRow {
        GrapeRow {
            vivc_id: id.into(),
            name: name.into(),
            url: format!("https://www.vivc.de/index.php?r=passport%2Fview&id={id}"),
            berry_color: BerryColor::Black,
            species: None,
            year_of_crossing: None,
            breeder: None,
            country_code: Some("ARM".into()),
            last_crawled: None,
        }
    }

    #[test]
    fn country_upsert_is_idempotent() {
        let conn = test_conn();
        assert_eq!(upsert_country(&conn, &armenia()).unwrap(), Upsert::Created);
        assert_eq!(upsert_country(&conn, &armenia()).unwrap(), Upsert::Unchanged);

        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM country", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn country_name_fix_is_an_update() {
        let conn = test_conn();
        upsert_country(&conn, &armenia()).unwrap();
        let renamed = CountryRow {
            name: "Republic Of Armenia".into(),
            ..armenia()
        };
        assert_eq!(upsert_country(&conn, &renamed).unwrap(), Upsert::Updated);
        assert_eq!(
            get_country(&conn, "ARM").unwrap().unwrap().name,
            "Republic Of Armenia"
        );
    }

    #[test]
    fn grape_upsert_is_idempotent() {
        let conn = test_conn();
        upsert_country(&conn, &armenia()).unwrap();
        let g = grape("132", "Adisi");
        assert_eq!(upsert_grape(&conn, &g).unwrap(), Upsert::Created);
        assert_eq!(upsert_grape(&conn, &g).unwrap(), Upsert::Unchanged);

        let mut changed = g.clone();
        changed.breeder = Some("Armenian Research Institute".into());
        assert_eq!(upsert_grape(&conn, &changed).unwrap(), Upsert::Updated);
        assert_eq!(upsert_grape(&conn, &changed).unwrap(), Upsert::Unchanged);
    }

    #[test]
    fn upsert_preserves_crawl_marker() {
        let conn = test_conn();
        upsert_country(&conn, &armenia()).unwrap();
        let g = grape("132", "Adisi");
        upsert_grape(&conn, &g).unwrap();
        mark_crawled(&conn, "132", "2024-05-01T00:00:00Z").unwrap();

        let mut changed = g.clone();
        changed.name = "Adisi Noir".into();
        upsert_grape(&conn, &changed).unwrap();
        assert!(get_grape(&conn, "132")
            .unwrap()
            .unwrap()
            .last_crawled
            .is_some());
    }

    #[test]
    fn child_with_two_parents_listed_once_under_each() {
        let conn = test_conn();
        upsert_country(&conn, &armenia()).unwrap();
        upsert_grape(&conn, &grape("1", "Parent One")).unwrap();
        upsert_grape(&conn, &grape("2", "Parent Two")).unwrap();
        upsert_grape(&conn, &grape("3", "Child")).unwrap();

        assert!(add_parent(&conn, "3", "1").unwrap());
        assert!(add_parent(&conn, "3", "2").unwrap());
        // Re-adding is silently absorbed.
        assert!(!add_parent(&conn, "3", "1").unwrap());

        for parent in ["1", "2"] {
            let children = children_of(&conn, parent).unwrap();
            assert_eq!(children.len(), 1);
            assert_eq!(children[0].vivc_id, "3");
        }
        assert_eq!(parents_of(&conn, "3").unwrap().len(), 2);
    }

    #[test]
    fn parent_link_requires_both_rows() {
        let conn = test_conn();
        upsert_country(&conn, &armenia()).unwrap();
        upsert_grape(&conn, &grape("1", "Lonely")).unwrap();
        assert!(!add_parent(&conn, "1", "999").unwrap());
        assert!(!add_parent(&conn, "999", "1").unwrap());
        assert!(!add_parent(&conn, "1", "1").unwrap());
        assert!(!has_parents(&conn, "1").unwrap());
    }

    #[test]
    fn duplicate_photo_url_not_reinserted() {
        let conn = test_conn();
        upsert_country(&conn, &armenia()).unwrap();
        upsert_grape(&conn, &grape("132", "Adisi")).unwrap();

        let photo = PhotoRow {
            vivc_id: "132".into(),
            url: "https://www.vivc.de/images/foto/132_1.jpg".into(),
            photo_type: PhotoKind::Field,
            source: "JKI".into(),
        };
        assert!(insert_photo(&conn, &photo).unwrap());
        assert!(!insert_photo(&conn, &photo).unwrap());
        assert_eq!(photos_of(&conn, "132").unwrap().len(), 1);
    }

    #[test]
    fn field_photo_preferred_over_laboratory() {
        let conn = test_conn();
        upsert_country(&conn, &armenia()).unwrap();
        upsert_grape(&conn, &grape("132", "Adisi")).unwrap();

        let lab = PhotoRow {
            vivc_id: "132".into(),
            url: "https://x.de/lab.jpg".into(),
            photo_type: PhotoKind::Laboratory,
            source: String::new(),
        };
        let field_a = PhotoRow {
            vivc_id: "132".into(),
            url: "https://x.de/field_a.jpg".into(),
            photo_type: PhotoKind::Field,
            source: String::new(),
        };
        let field_b = PhotoRow {
            vivc_id: "132".into(),
            url: "https://x.de/field_b.jpg".into(),
            photo_type: PhotoKind::Field,
            source: String::new(),
        };

        // Laboratory arrives first but field still wins; within the field
        // type the first-seen photo is kept.
        insert_photo(&conn, &lab).unwrap();
        assert_eq!(
            preferred_photo(&conn, "132").unwrap().unwrap().photo_type,
            PhotoKind::Laboratory
        );
        insert_photo(&conn, &field_a).unwrap();
        insert_photo(&conn, &field_b).unwrap();
        let preferred = preferred_photo(&conn, "132").unwrap().unwrap();
        assert_eq!(preferred.photo_type, PhotoKind::Field);
        assert_eq!(preferred.url, "https://x.de/field_a.jpg");
    }

    #[test]
    fn search_is_case_insensitive_partial() {
        let conn = test_conn();
        upsert_country(&conn, &armenia()).unwrap();
        upsert_grape(&conn, &grape("132", "Adisi")).unwrap();
        upsert_grape(&conn, &grape("133", "Areni")).unwrap();

        let hits = search_grapes(&conn, "adi").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Adisi");
        assert_eq!(search_grapes(&conn, "A").unwrap().len(), 2);
        assert!(search_grapes(&conn, "zzz").unwrap().is_empty());
    }

    #[test]
    fn crawl_backfill_scan() {
        let conn = test_conn();
        upsert_country(&conn, &armenia()).unwrap();
        upsert_grape(&conn, &grape("1", "Parent")).unwrap();
        upsert_grape(&conn, &grape("2", "Child")).unwrap();
        add_parent(&conn, "2", "1").unwrap();

        let pending = grapes_with_parents_uncrawled(&conn).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].vivc_id, "2");

        mark_crawled(&conn, "2", "2024-05-01T00:00:00Z").unwrap();
        assert!(grapes_with_parents_uncrawled(&conn).unwrap().is_empty());
    }

    #[test]
    fn stats_counts() {
        let conn = test_conn();
        upsert_country(&conn, &armenia()).unwrap();
        upsert_grape(&conn, &grape("1", "A")).unwrap();
        upsert_grape(&conn, &grape("2", "B")).unwrap();
        add_parent(&conn, "2", "1").unwrap();
        mark_crawled(&conn, "2", "2024-05-01T00:00:00Z").unwrap();

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.countries, 1);
        assert_eq!(stats.grapes, 2);
        assert_eq!(stats.crawled, 1);
        assert_eq!(stats.parent_links, 1);
        assert_eq!(stats.photos, 0);
    }
}
