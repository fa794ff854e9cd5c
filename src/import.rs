//! Batch import pipelines: fetch → parse → normalize → store, one item at a
//! time. Per-item failures are logged and counted, never fatal to the batch.

use anyhow::{bail, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::catalog;
use crate::db::{self, CountryRow, GrapeRow, PhotoKind, PhotoRow, Upsert};
use crate::fetch::{FetchOutcome, Fetcher};
use crate::normalize::{canonical_photo_url, country_display_name, normalize_color, normalize_name};
use crate::parser::listing::ListingRow;
use crate::parser::passport::Passport;
use crate::parser::photos::PhotoListingRow;
use crate::parser::{listing, passport, pedigree, photos, vivc_id_from_url};

// ── Field subsets ──

/// Which grape fields a partial import (`--fields name,breeder`) touches.
/// In partial mode missing grapes are never created and relationships are
/// never crawled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldMask {
    pub name: bool,
    pub berry_color: bool,
    pub species: bool,
    pub year_of_crossing: bool,
    pub breeder: bool,
}

impl FieldMask {
    pub fn parse(arg: &str) -> Result<FieldMask> {
        let mut mask = FieldMask::default();
        for field in arg.split(',') {
            match field.trim().to_lowercase().as_str() {
                "name" => mask.name = true,
                "berry_color" => mask.berry_color = true,
                "species" => mask.species = true,
                "year_of_crossing" => mask.year_of_crossing = true,
                "breeder" => mask.breeder = true,
                "" => {}
                other => bail!(
                    "unknown field {other:?}; valid fields: \
                     name, berry_color, species, year_of_crossing, breeder"
                ),
            }
        }
        if mask == FieldMask::default() {
            bail!("--fields given but names no valid field");
        }
        Ok(mask)
    }

    /// Year of crossing and breeder only appear on passport pages; the rest
    /// comes off the listing.
    fn needs_passport(&self) -> bool {
        self.year_of_crossing || self.breeder
    }
}

// ── Grape import ──

#[derive(Debug, Default)]
pub struct ImportCounts {
    pub imported: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub errors: usize,
}

impl ImportCounts {
    pub fn merge(&mut self, other: &ImportCounts) {
        self.imported += other.imported;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.not_found += other.not_found;
        self.errors += other.errors;
    }

    pub fn print(&self) {
        println!(
            "  Imported: {} new, updated: {}, unchanged: {}, skipped: {}",
            self.imported, self.updated, self.unchanged, self.skipped
        );
        if self.not_found > 0 {
            println!("  Not in store (partial mode): {}", self.not_found);
        }
        if self.errors > 0 {
            println!("  Errors: {}", self.errors);
        }
    }
}

/// Import every grape the catalogue lists for one country. Full mode creates
/// the country row and missing grapes; a [`FieldMask`] restricts the run to
/// updating the named fields on grapes already in the store.
pub async fn import_country(
    conn: &Connection,
    fetcher: &Fetcher,
    country_name: &str,
    fields: Option<FieldMask>,
    skip_relationships: bool,
) -> Result<ImportCounts> {
    let Some(iso) = catalog::iso_for_name(country_name) else {
        bail!("country {country_name:?} is not in the catalogue map");
    };

    let country = if fields.is_some() {
        match db::get_country(conn, iso)? {
            Some(row) => row,
            None => {
                warn!("country {iso} not in store, skipped (run a full import first)");
                return Ok(ImportCounts::default());
            }
        }
    } else {
        let row = CountryRow {
            iso_code: iso.to_string(),
            name: country_display_name(country_name),
            search_url: catalog::country_search_url(iso),
        };
        if db::upsert_country(conn, &row)? == Upsert::Created {
            info!("created country {} ({})", row.name, row.iso_code);
        }
        row
    };

    // Walk the paginated listing until a short page signals the end.
    let mut rows = Vec::new();
    let mut page = 1;
    loop {
        let url = catalog::listing_url(iso, page);
        let html = match fetcher.get(&url).await? {
            FetchOutcome::Page(html) => html,
            FetchOutcome::NotFound => break,
        };
        let page_rows = listing::parse_listing(&html);
        let page_len = page_rows.len();
        rows.extend(page_rows);
        if page_len < catalog::LISTING_PER_PAGE {
            break;
        }
        page += 1;
    }
    info!("{}: {} grapes listed", country.name, rows.len());

    let mut counts = ImportCounts::default();
    let pb = progress_bar(rows.len())?;

    for row in &rows {
        pb.inc(1);
        let Some(vivc_id) = vivc_id_from_url(&row.url) else {
            counts.skipped += 1;
            continue;
        };

        match fields {
            Some(mask) => match import_one_partial(conn, fetcher, &vivc_id, row, mask).await {
                Ok(None) => counts.not_found += 1,
                Ok(Some(Upsert::Updated)) => counts.updated += 1,
                Ok(Some(_)) => counts.unchanged += 1,
                Err(e) => {
                    warn!("{}: {:#}", row.name, e);
                    counts.errors += 1;
                }
            },
            None => match import_one_full(conn, fetcher, iso, &vivc_id, row).await {
                Ok((outcome, passport)) => {
                    match outcome {
                        Upsert::Created => counts.imported += 1,
                        Upsert::Updated => counts.updated += 1,
                        Upsert::Unchanged => counts.unchanged += 1,
                    }
                    if !skip_relationships {
                        let name = normalize_name(&row.name);
                        if let Err(e) =
                            link_relationships(conn, fetcher, &vivc_id, &name, &passport.parents)
                                .await
                        {
                            // Relationship failures never abort the grape import.
                            warn!("relationships for {}: {:#}", name, e);
                        }
                    }
                }
                Err(e) => {
                    warn!("{}: {:#}", row.name, e);
                    counts.errors += 1;
                }
            },
        }
    }

    pb.finish_and_clear();
    Ok(counts)
}

async fn import_one_full(
    conn: &Connection,
    fetcher: &Fetcher,
    iso: &str,
    vivc_id: &str,
    row: &ListingRow,
) -> Result<(Upsert, Passport)> {
    let passport = match fetcher.get(&catalog::passport_url(vivc_id)).await? {
        FetchOutcome::Page(html) => passport::parse_passport(&html),
        FetchOutcome::NotFound => Passport::default(),
    };
    let grape = grape_row_from_listing(iso, vivc_id, row, Some(&passport));
    let outcome = db::upsert_grape(conn, &grape)?;
    Ok((outcome, passport))
}

async fn import_one_partial(
    conn: &Connection,
    fetcher: &Fetcher,
    vivc_id: &str,
    row: &ListingRow,
    mask: FieldMask,
) -> Result<Option<Upsert>> {
    let Some(existing) = db::get_grape(conn, vivc_id)? else {
        return Ok(None);
    };
    let passport = if mask.needs_passport() {
        match fetcher.get(&catalog::passport_url(vivc_id)).await? {
            FetchOutcome::Page(html) => Some(passport::parse_passport(&html)),
            FetchOutcome::NotFound => None,
        }
    } else {
        None
    };

    let mut updated = existing.clone();
    apply_mask(&mut updated, mask, row, passport.as_ref());
    if updated == existing {
        return Ok(Some(Upsert::Unchanged));
    }
    db::update_grape(conn, &updated)?;
    Ok(Some(Upsert::Updated))
}

/// Build the normalized store row from a listing row plus (optionally) its
/// passport page.
fn grape_row_from_listing(
    iso: &str,
    vivc_id: &str,
    row: &ListingRow,
    passport: Option<&Passport>,
) -> GrapeRow {
    GrapeRow {
        vivc_id: vivc_id.to_string(),
        name: normalize_name(&row.name),
        url: row.url.clone(),
        berry_color: normalize_color(row.color.as_deref().unwrap_or("")),
        species: normalized_opt(row.species.as_deref()),
        year_of_crossing: normalized_opt(passport.and_then(|p| p.year_of_crossing.as_deref())),
        breeder: normalized_opt(passport.and_then(|p| p.breeder.as_deref())),
        country_code: Some(iso.to_string()),
        last_crawled: None,
    }
}

fn apply_mask(grape: &mut GrapeRow, mask: FieldMask, row: &ListingRow, passport: Option<&Passport>) {
    if mask.name {
        grape.name = normalize_name(&row.name);
    }
    if mask.berry_color {
        grape.berry_color = normalize_color(row.color.as_deref().unwrap_or(""));
    }
    if mask.species {
        grape.species = normalized_opt(row.species.as_deref());
    }
    // Passport fields keep their stored value when the page was unavailable.
    if let Some(p) = passport {
        if mask.year_of_crossing {
            grape.year_of_crossing = normalized_opt(p.year_of_crossing.as_deref());
        }
        if mask.breeder {
            grape.breeder = normalized_opt(p.breeder.as_deref());
        }
    }
}

fn normalized_opt(raw: Option<&str>) -> Option<String> {
    raw.map(normalize_name).filter(|s| !s.is_empty())
}

// ── Relationships ──

#[derive(Debug, Default)]
pub struct RelationshipCounts {
    pub processed: usize,
    pub skipped: usize,
    pub links_added: usize,
    pub errors: usize,
}

impl RelationshipCounts {
    pub fn print(&self) {
        println!(
            "  Processed: {}, skipped (already complete): {}, links added: {}",
            self.processed, self.skipped, self.links_added
        );
        if self.errors > 0 {
            println!("  Errors: {}", self.errors);
        }
    }
}

/// Crawl parent/child links for stored grapes, skipping grapes already
/// crawled or already carrying parents (unless forced). Each finished grape
/// is stamped so interrupted runs resume where they stopped.
pub async fn import_relationships(
    conn: &Connection,
    fetcher: &Fetcher,
    country: Option<&str>,
    force: bool,
    limit: Option<usize>,
) -> Result<RelationshipCounts> {
    let country_code = match country {
        Some(name) => {
            let Some(row) = db::find_country(conn, name)? else {
                bail!("country {name:?} not found in store; import grapes first");
            };
            Some(row.iso_code)
        }
        None => None,
    };

    let grapes = db::all_grapes(conn, country_code.as_deref(), limit)?;
    info!("processing relationships for {} grapes", grapes.len());

    let mut counts = RelationshipCounts::default();
    let pb = progress_bar(grapes.len())?;

    for grape in &grapes {
        pb.inc(1);
        if !force && grape.last_crawled.is_some() {
            counts.skipped += 1;
            continue;
        }
        if !force && db::has_parents(conn, &grape.vivc_id)? {
            // Children were already searched for this grape; make the skip
            // durable so the next run doesn't re-check.
            counts.skipped += 1;
            if grape.last_crawled.is_none() {
                db::mark_crawled(conn, &grape.vivc_id, &Utc::now().to_rfc3339())?;
            }
            continue;
        }

        counts.processed += 1;
        match crawl_relationships(conn, fetcher, grape).await {
            Ok(added) => {
                counts.links_added += added;
                db::mark_crawled(conn, &grape.vivc_id, &Utc::now().to_rfc3339())?;
            }
            Err(e) => {
                warn!("{} ({}): {:#}", grape.name, grape.vivc_id, e);
                counts.errors += 1;
            }
        }
    }

    pb.finish_and_clear();
    Ok(counts)
}

async fn crawl_relationships(
    conn: &Connection,
    fetcher: &Fetcher,
    grape: &GrapeRow,
) -> Result<usize> {
    let parents = match fetcher.get(&catalog::passport_url(&grape.vivc_id)).await? {
        FetchOutcome::Page(html) => passport::parse_passport(&html).parents,
        FetchOutcome::NotFound => Vec::new(),
    };
    link_relationships(conn, fetcher, &grape.vivc_id, &grape.name, &parents).await
}

/// Record parent links for a grape and, via the pedigree search, links from
/// its offspring back to it. Links to grapes not yet in the store are
/// silently dropped — a later pass picks them up once both ends exist.
async fn link_relationships(
    conn: &Connection,
    fetcher: &Fetcher,
    vivc_id: &str,
    name: &str,
    parents: &[passport::ParentRef],
) -> Result<usize> {
    let mut added = 0;
    for parent in parents {
        if db::add_parent(conn, vivc_id, &parent.vivc_id)? {
            added += 1;
        }
    }

    if let FetchOutcome::Page(html) = fetcher.get(&catalog::pedigree_search_url(name)).await? {
        for child in pedigree::parse_children(&html, name) {
            if let Some(child_id) = &child.vivc_id {
                if db::add_parent(conn, child_id, vivc_id)? {
                    added += 1;
                }
            }
        }
    }
    Ok(added)
}

// ── Photos ──

#[derive(Debug, Default)]
pub struct PhotoCounts {
    pub imported: usize,
    pub skipped: usize,
    pub not_in_store: usize,
    pub errors: usize,
}

impl PhotoCounts {
    pub fn print(&self) {
        println!(
            "  Photos imported: {}, skipped (already stored): {}",
            self.imported, self.skipped
        );
        if self.not_in_store > 0 {
            println!("  On photo pages but not in store: {}", self.not_in_store);
        }
        if self.errors > 0 {
            println!("  Errors: {}", self.errors);
        }
    }
}

/// Import cluster photos from the paginated photo listings. Field shots are
/// the preferred type, so they are crawled first and laboratory shots only
/// backfill grapes that still have no field photo.
pub async fn import_photos(
    conn: &Connection,
    fetcher: &Fetcher,
    kinds: &[PhotoKind],
    limit_pages: Option<usize>,
) -> Result<PhotoCounts> {
    let mut counts = PhotoCounts::default();
    for kind in kinds {
        info!("processing {} photos", kind.as_str());
        import_photo_kind(conn, fetcher, *kind, limit_pages, &mut counts).await;
    }
    Ok(counts)
}

fn photo_search_param(kind: PhotoKind) -> &'static str {
    match kind {
        PhotoKind::Field => "Cluster+in+the+field",
        PhotoKind::Laboratory => "Cluster+in+the+laboratory",
    }
}

async fn import_photo_kind(
    conn: &Connection,
    fetcher: &Fetcher,
    kind: PhotoKind,
    limit_pages: Option<usize>,
    counts: &mut PhotoCounts,
) {
    let mut page = 1;
    let mut pages_processed = 0;
    loop {
        if limit_pages.is_some_and(|cap| pages_processed >= cap) {
            break;
        }
        let url = catalog::photo_listing_url(photo_search_param(kind), page);
        let html = match fetcher.get(&url).await {
            Ok(FetchOutcome::Page(html)) => html,
            Ok(FetchOutcome::NotFound) => break,
            Err(e) => {
                warn!("photo page {page}: {e:#}");
                counts.errors += 1;
                break;
            }
        };

        let rows = photos::parse_photo_listing(&html);
        if rows.is_empty() {
            break;
        }
        for row in &rows {
            if let Err(e) = import_photo_row(conn, fetcher, kind, row, counts).await {
                warn!("photo for {}: {:#}", row.vivc_id, e);
                counts.errors += 1;
            }
        }

        pages_processed += 1;
        if !photos::has_next_page(&html) {
            break;
        }
        page += 1;
    }
}

async fn import_photo_row(
    conn: &Connection,
    fetcher: &Fetcher,
    kind: PhotoKind,
    row: &PhotoListingRow,
    counts: &mut PhotoCounts,
) -> Result<()> {
    if db::get_grape(conn, &row.vivc_id)?.is_none() {
        counts.not_in_store += 1;
        return Ok(());
    }
    if kind == PhotoKind::Laboratory && db::has_photo_of_type(conn, &row.vivc_id, PhotoKind::Field)?
    {
        counts.skipped += 1;
        return Ok(());
    }
    let Some(photo_url) = &row.photo_url else {
        counts.skipped += 1;
        return Ok(());
    };

    // Duplicate check is on canonical URLs so querystring variants of the
    // same image don't produce extra rows.
    let canonical = canonical_photo_url(photo_url);
    let existing = db::photos_of(conn, &row.vivc_id)?
        .into_iter()
        .find(|(_, url, _)| canonical_photo_url(url) == canonical);

    if let Some((photo_id, _, stored_source)) = existing {
        if !stored_source.trim().is_empty() {
            counts.skipped += 1;
            return Ok(());
        }
        // Stored without attribution; the popup may supply it now.
        let source = match &row.source {
            Some(s) => Some(s.clone()),
            None => fetch_popup_source(fetcher, row).await,
        };
        match source {
            Some(s) => {
                db::update_photo_source(conn, photo_id, &s)?;
                counts.imported += 1;
            }
            None => counts.skipped += 1,
        }
        return Ok(());
    }

    let source = match &row.source {
        Some(s) => Some(s.clone()),
        None => fetch_popup_source(fetcher, row).await,
    };
    let inserted = db::insert_photo(
        conn,
        &PhotoRow {
            vivc_id: row.vivc_id.clone(),
            url: photo_url.clone(),
            photo_type: kind,
            source: source.unwrap_or_default(),
        },
    )?;
    if inserted {
        counts.imported += 1;
    } else {
        counts.skipped += 1;
    }
    Ok(())
}

async fn fetch_popup_source(fetcher: &Fetcher, row: &PhotoListingRow) -> Option<String> {
    let popup_url = row.popup_url.as_ref()?;
    match fetcher.get(popup_url).await {
        Ok(FetchOutcome::Page(html)) => photos::parse_popup_source(&html),
        Ok(FetchOutcome::NotFound) => None,
        Err(e) => {
            warn!("popup {popup_url}: {e:#}");
            None
        }
    }
}

// ── Maintenance passes ──

#[derive(Debug, Default)]
pub struct NormalizeCounts {
    pub grape_names: usize,
    pub country_names: usize,
}

/// Re-run name normalization over stored rows. Colors need no pass: they are
/// normalized on import and the schema constrains them to the vocabulary.
pub fn normalize_existing(conn: &Connection, dry_run: bool) -> Result<NormalizeCounts> {
    let mut counts = NormalizeCounts::default();

    for grape in db::all_grapes(conn, None, None)? {
        let name = normalize_name(&grape.name);
        if name != grape.name {
            info!("grape {:?} -> {:?}", grape.name, name);
            if !dry_run {
                db::update_grape(conn, &GrapeRow { name: name.clone(), ..grape.clone() })?;
            }
            counts.grape_names += 1;
        }
    }

    for (country, _) in db::list_countries(conn)? {
        let name = normalize_name(&country.name);
        if name != country.name {
            info!("country {:?} -> {:?}", country.name, name);
            if !dry_run {
                db::upsert_country(conn, &CountryRow { name: name.clone(), ..country.clone() })?;
            }
            counts.country_names += 1;
        }
    }

    Ok(counts)
}

/// Stamp grapes that already carry parents as crawled, so relationship runs
/// stop re-checking them. Returns how many grapes were (or would be) marked.
pub fn mark_crawled_backfill(conn: &Connection, dry_run: bool) -> Result<usize> {
    let pending = db::grapes_with_parents_uncrawled(conn)?;
    let now = Utc::now().to_rfc3339();
    for grape in &pending {
        info!("marking {} ({})", grape.name, grape.vivc_id);
        if !dry_run {
            db::mark_crawled(conn, &grape.vivc_id, &now)?;
        }
    }
    Ok(pending.len())
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::BerryColor;
    use crate::parser::passport::ParentRef;

    fn listing_row() -> ListingRow {
        ListingRow {
            name: "ADISI".into(),
            url: "https://www.vivc.de/index.php?r=passport%2Fview&id=132".into(),
            species: Some("VITIS VINIFERA".into()),
            color: Some("NOIR".into()),
        }
    }

    fn passport() -> Passport {
        Passport {
            prime_name: Some("ADISI".into()),
            year_of_crossing: Some("1988".into()),
            breeder: Some("ARMENIAN RESEARCH INSTITUTE".into()),
            country_of_origin: Some("ARMENIA".into()),
            full_pedigree: true,
            parents: vec![ParentRef {
                vivc_id: "456".into(),
                name: "ARARATI".into(),
            }],
        }
    }

    #[test]
    fn field_mask_parses_and_validates() {
        let mask = FieldMask::parse("name, berry_color").unwrap();
        assert!(mask.name && mask.berry_color);
        assert!(!mask.breeder);
        assert!(!mask.needs_passport());
        assert!(FieldMask::parse("breeder").unwrap().needs_passport());
        assert!(FieldMask::parse("vintage").is_err());
        assert!(FieldMask::parse("").is_err());
    }

    #[test]
    fn listing_row_is_normalized_on_the_way_in() {
        let g = grape_row_from_listing("ARM", "132", &listing_row(), Some(&passport()));
        assert_eq!(g.name, "Adisi");
        assert_eq!(g.berry_color, BerryColor::Black);
        assert_eq!(g.species.as_deref(), Some("Vitis Vinifera"));
        assert_eq!(g.year_of_crossing.as_deref(), Some("1988"));
        assert_eq!(g.breeder.as_deref(), Some("Armenian Research Institute"));
        assert_eq!(g.country_code.as_deref(), Some("ARM"));
        assert_eq!(g.last_crawled, None);
    }

    #[test]
    fn listing_without_passport_leaves_detail_fields_empty() {
        let g = grape_row_from_listing("ARM", "132", &listing_row(), None);
        assert_eq!(g.year_of_crossing, None);
        assert_eq!(g.breeder, None);
    }

    #[test]
    fn mask_only_touches_named_fields() {
        let mut g = grape_row_from_listing("ARM", "132", &listing_row(), Some(&passport()));
        g.name = "Stale Name".into();
        g.breeder = Some("Stale Breeder".into());

        let mask = FieldMask::parse("name").unwrap();
        apply_mask(&mut g, mask, &listing_row(), None);
        assert_eq!(g.name, "Adisi");
        assert_eq!(g.breeder.as_deref(), Some("Stale Breeder"));
    }

    #[test]
    fn mask_passport_fields_survive_missing_page() {
        let mut g = grape_row_from_listing("ARM", "132", &listing_row(), Some(&passport()));
        let mask = FieldMask::parse("breeder").unwrap();
        // Passport unavailable: the stored breeder must not be wiped.
        apply_mask(&mut g, mask, &listing_row(), None);
        assert_eq!(g.breeder.as_deref(), Some("Armenian Research Institute"));
    }
}
