mod catalog;
mod db;
mod export;
mod fetch;
mod import;
mod normalize;
mod parser;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};

use db::PhotoKind;
use fetch::Fetcher;

#[derive(Parser)]
#[command(name = "vivc_scraper", about = "Wine grape catalogue scraper for VIVC")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and seed the country table
    Init,
    /// Import grapes for one country (default: every catalogue country)
    Import {
        /// Country name, e.g. "armenia"
        #[arg(short, long)]
        country: Option<String>,
        /// Only update these fields on existing grapes (comma-separated:
        /// name, berry_color, species, year_of_crossing, breeder)
        #[arg(long)]
        fields: Option<String>,
        /// Skip parent/child relationship crawling (faster)
        #[arg(long)]
        skip_relationships: bool,
    },
    /// Import parent/child relationships, skipping already-crawled grapes
    Relationships {
        /// Restrict to one country (name or ISO code)
        #[arg(short, long)]
        country: Option<String>,
        /// Re-crawl grapes even if already marked crawled
        #[arg(long)]
        force: bool,
        /// Max grapes to process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Import cluster photos
    Photos {
        /// Which photo listings to crawl
        #[arg(long, value_enum, default_value = "both")]
        kind: PhotoTypeArg,
        /// Max listing pages per photo type
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Re-normalize stored grape and country names
    Normalize {
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Stamp grapes that already have parents as crawled
    MarkCrawled {
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Export the grape name index for autocomplete
    Export {
        /// Output path for the JSON index
        #[arg(short, long, default_value = "data/grapes.json")]
        out: PathBuf,
    },
    /// Grape profile: passport fields, parents, children, preferred photo
    Show {
        /// Catalogue (VIVC) id
        vivc_id: String,
    },
    /// Grapes and color breakdown for one country
    Country {
        /// Country name or ISO code
        name: String,
    },
    /// Case-insensitive name search
    Search { query: String },
    /// All countries with grape counts
    Countries,
    /// Store statistics
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum PhotoTypeArg {
    Field,
    Laboratory,
    Both,
}

impl PhotoTypeArg {
    /// Field first: it is the preferred type, and laboratory shots only
    /// backfill grapes with no field photo.
    fn kinds(self) -> Vec<PhotoKind> {
        match self {
            PhotoTypeArg::Field => vec![PhotoKind::Field],
            PhotoTypeArg::Laboratory => vec![PhotoKind::Laboratory],
            PhotoTypeArg::Both => vec![PhotoKind::Field, PhotoKind::Laboratory],
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let mut created = 0;
            for (name, iso) in catalog::COUNTRIES {
                let row = db::CountryRow {
                    iso_code: iso.to_string(),
                    name: normalize::country_display_name(name),
                    search_url: catalog::country_search_url(iso),
                };
                if db::upsert_country(&conn, &row)? == db::Upsert::Created {
                    created += 1;
                }
            }
            println!(
                "Schema ready. {} countries seeded ({} new).",
                catalog::COUNTRIES.len(),
                created
            );
            Ok(())
        }
        Commands::Import {
            country,
            fields,
            skip_relationships,
        } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let fetcher = Fetcher::new()?;
            let mask = fields.as_deref().map(import::FieldMask::parse).transpose()?;

            let countries: Vec<&str> = match &country {
                Some(name) => vec![name.as_str()],
                None => catalog::COUNTRIES.iter().map(|(n, _)| *n).collect(),
            };

            let total = countries.len();
            let mut totals = import::ImportCounts::default();
            for (idx, name) in countries.iter().enumerate() {
                println!("[{}/{}] Importing {}...", idx + 1, total, name);
                let counts =
                    import::import_country(&conn, &fetcher, name, mask, skip_relationships)
                        .await?;
                counts.print();
                totals.merge(&counts);
            }
            if total > 1 {
                println!("\nAll countries:");
                totals.print();
            }
            Ok(())
        }
        Commands::Relationships {
            country,
            force,
            limit,
        } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let fetcher = Fetcher::new()?;
            let counts =
                import::import_relationships(&conn, &fetcher, country.as_deref(), force, limit)
                    .await?;
            println!("Done.");
            counts.print();
            Ok(())
        }
        Commands::Photos { kind, limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let fetcher = Fetcher::new()?;
            let counts = import::import_photos(&conn, &fetcher, &kind.kinds(), limit).await?;
            println!("Done.");
            counts.print();
            Ok(())
        }
        Commands::Normalize { dry_run } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            if dry_run {
                println!("Dry run: nothing will be written.");
            }
            let counts = import::normalize_existing(&conn, dry_run)?;
            println!(
                "Normalized {} grape names and {} country names.",
                counts.grape_names, counts.country_names
            );
            Ok(())
        }
        Commands::MarkCrawled { dry_run } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            if dry_run {
                println!("Dry run: nothing will be written.");
            }
            let marked = import::mark_crawled_backfill(&conn, dry_run)?;
            if marked == 0 {
                println!("Nothing to mark: all grapes with parents are already stamped.");
            } else if dry_run {
                println!("Would mark {marked} grapes as crawled.");
            } else {
                println!("Marked {marked} grapes as crawled.");
            }
            Ok(())
        }
        Commands::Export { out } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let written = export::write_name_index(&conn, &out)?;
            println!("Wrote {} grapes to {}", written, out.display());
            Ok(())
        }
        Commands::Show { vivc_id } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            show_grape(&conn, &vivc_id)
        }
        Commands::Country { name } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            show_country(&conn, &name)
        }
        Commands::Search { query } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let grapes = db::search_grapes(&conn, &query)?;
            if grapes.is_empty() {
                println!("No grapes match {query:?}.");
                return Ok(());
            }
            print_grape_table(&conn, &grapes)?;
            println!("\n{} grapes", grapes.len());
            Ok(())
        }
        Commands::Countries => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let countries = db::list_countries(&conn)?;
            if countries.is_empty() {
                println!("No countries stored. Run 'init' first.");
                return Ok(());
            }
            println!("{:<30} | {:<4} | {:>6}", "Country", "ISO", "Grapes");
            println!("{}", "-".repeat(46));
            for (country, count) in &countries {
                println!(
                    "{:<30} | {:<4} | {:>6}",
                    truncate(&country.name, 30),
                    country.iso_code,
                    count
                );
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Countries:    {}", s.countries);
            println!("Grapes:       {}", s.grapes);
            println!("Crawled:      {}", s.crawled);
            println!("Parent links: {}", s.parent_links);
            println!("Photos:       {}", s.photos);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

// ── Console views ──

fn show_grape(conn: &rusqlite::Connection, vivc_id: &str) -> anyhow::Result<()> {
    let Some(grape) = db::get_grape(conn, vivc_id)? else {
        println!("No grape with VIVC id {vivc_id}.");
        return Ok(());
    };

    println!("{} (VIVC {})", grape.name, grape.vivc_id);
    println!("  Color:   {}", grape.berry_color);
    if let Some(species) = &grape.species {
        println!("  Species: {species}");
    }
    if let Some(year) = &grape.year_of_crossing {
        println!("  Year of crossing: {year}");
    }
    if let Some(breeder) = &grape.breeder {
        println!("  Breeder: {breeder}");
    }
    if let Some(code) = &grape.country_code {
        let name = db::get_country(conn, code)?
            .map(|c| c.name)
            .unwrap_or_else(|| code.clone());
        println!("  Country: {name} ({code})");
    }
    if let Some(crawled) = &grape.last_crawled {
        println!("  Relationships crawled: {crawled}");
    }

    let parents = db::parents_of(conn, vivc_id)?;
    if !parents.is_empty() {
        println!("  Parents:");
        for parent in &parents {
            println!("    {} (VIVC {})", parent.name, parent.vivc_id);
        }
    }

    let children = db::children_of(conn, vivc_id)?;
    if !children.is_empty() {
        println!("  Children:");
        for child in &children {
            // The crossing partner is the child's parent that isn't us.
            let other = db::parents_of(conn, &child.vivc_id)?
                .into_iter()
                .find(|p| p.vivc_id != grape.vivc_id);
            match other {
                Some(other) => {
                    println!("    {} (VIVC {}) × {}", child.name, child.vivc_id, other.name)
                }
                None => println!("    {} (VIVC {})", child.name, child.vivc_id),
            }
        }
    }

    if let Some(photo) = db::preferred_photo(conn, vivc_id)? {
        println!("  Photo [{}]: {}", photo.photo_type.as_str(), photo.url);
        if !photo.source.is_empty() {
            println!("  Photo source: {}", photo.source);
        }
    }
    Ok(())
}

fn show_country(conn: &rusqlite::Connection, name: &str) -> anyhow::Result<()> {
    let Some(country) = db::find_country(conn, name)? else {
        println!("No country named {name:?} in the store.");
        return Ok(());
    };

    let grapes = db::grapes_for_country(conn, &country.iso_code)?;
    println!("{} ({}) — {} grapes", country.name, country.iso_code, grapes.len());

    let colors = db::color_counts_for_country(conn, &country.iso_code)?;
    if !colors.is_empty() {
        let breakdown: Vec<String> =
            colors.iter().map(|(color, n)| format!("{color}: {n}")).collect();
        println!("  {}", breakdown.join(", "));
    }
    if grapes.is_empty() {
        return Ok(());
    }

    println!();
    print_grape_table(conn, &grapes)?;
    Ok(())
}

fn print_grape_table(conn: &rusqlite::Connection, grapes: &[db::GrapeRow]) -> anyhow::Result<()> {
    println!(
        "{:>3} | {:<28} | {:>6} | {:<8} | {:<20}",
        "#", "Name", "VIVC", "Color", "Country"
    );
    println!("{}", "-".repeat(76));
    for (i, grape) in grapes.iter().enumerate() {
        let country = match &grape.country_code {
            Some(code) => db::get_country(conn, code)?
                .map(|c| c.name)
                .unwrap_or_else(|| code.clone()),
            None => String::new(),
        };
        println!(
            "{:>3} | {:<28} | {:>6} | {:<8} | {:<20}",
            i + 1,
            truncate(&grape.name, 28),
            grape.vivc_id,
            grape.berry_color.as_str(),
            truncate(&country, 20),
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
