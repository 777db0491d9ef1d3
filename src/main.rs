use clap::Parser;
use skolmap::dataset::{self, DEFAULT_SKIP_ROWS};
use skolmap::pipeline::{PipelineConfig, ResolutionPipeline, RunStats};
use skolmap::resolve::{
    AddressResolver, CacheStore, GeocodeResolver, Geocoder, GoogleGeocoder, NominatimGeocoder,
    UtbildningsguidenSource,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Skolmap — enrich the Skolverket merit export with addresses and coordinates.
///
/// Reads the semicolon-separated merit-value CSV, scrapes each school
/// unit's street address, geocodes it, and writes the enriched table for
/// the map renderer. All lookups are cached on disk, so re-runs only
/// touch the network for schools not seen before.
///
/// Examples:
///   skolmap betyg.csv
///   skolmap betyg.csv --provider nominatim --top 100
///   skolmap betyg.csv --cache-only
#[derive(Parser)]
#[command(name = "skolmap", version, about, long_about = None)]
struct Cli {
    /// The Skolverket merit-value CSV export.
    input: PathBuf,

    /// Enriched output CSV.
    #[arg(long, default_value = "schools_with_coordinates.csv")]
    output: PathBuf,

    /// Geocoding backend: "google" (API key required) or "nominatim".
    #[arg(long, default_value = "google", value_parser = parse_provider)]
    provider: Provider,

    /// File holding the Google Maps API key.
    #[arg(long, default_value = "google_maps_api_key.txt")]
    api_key_file: PathBuf,

    /// Directory for the persistent caches. Defaults to ~/.skolmap.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Only process the N schools with the highest merit values.
    #[arg(long)]
    top: Option<usize>,

    /// Preamble lines before the header row in the input.
    #[arg(long, default_value_t = DEFAULT_SKIP_ROWS)]
    skip_rows: usize,

    /// Build the output from the caches alone; never touch the network.
    #[arg(long)]
    cache_only: bool,

    /// Checkpoint both caches every N rows.
    #[arg(long, default_value_t = 100)]
    flush_every: usize,

    /// Sleep this long after each uncached page fetch (milliseconds).
    #[arg(long, default_value_t = 200)]
    rate_limit_ms: u64,

    /// Country appended to every geocoding query.
    #[arg(long, default_value = "Sweden")]
    country: String,
}

#[derive(Clone, Copy, Debug)]
enum Provider {
    Google,
    Nominatim,
}

fn parse_provider(s: &str) -> Result<Provider, String> {
    match s.to_lowercase().as_str() {
        "google" => Ok(Provider::Google),
        "nominatim" | "osm" => Ok(Provider::Nominatim),
        _ => Err(format!(
            "Unknown provider '{}'. Use 'google' or 'nominatim'.",
            s
        )),
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".skolmap")
}

fn main() {
    let cli = Cli::parse();
    let started = Instant::now();

    eprintln!("{}", "=".repeat(60));
    eprintln!("SKOLMAP - MERIT VALUE ENRICHMENT");
    eprintln!("{}", "=".repeat(60));

    // ── Read the dataset ────────────────────────────────────────

    eprintln!("\n[1/4] Reading school data from {}...", cli.input.display());
    let records = dataset::read_dataset(&cli.input, cli.skip_rows, cli.top).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    if records.is_empty() {
        eprintln!("Error: no rows with a unit code and a merit value in the input.");
        std::process::exit(1);
    }
    eprintln!("      {} schools with merit values", records.len());
    eprintln!(
        "      Merit range: {:.1} - {:.1}",
        records.last().map(|r| r.merit).unwrap_or(0.0),
        records.first().map(|r| r.merit).unwrap_or(0.0),
    );

    // ── Load caches ─────────────────────────────────────────────

    let cache_dir = cli.cache_dir.clone().unwrap_or_else(default_cache_dir);
    eprintln!("\n[2/4] Loading caches from {}...", cache_dir.display());
    let address_cache: CacheStore<String> =
        CacheStore::load_from(cache_dir.join("address_cache.json"));
    let coord_cache: CacheStore<[f64; 2]> =
        CacheStore::load_from(cache_dir.join("coord_cache.json"));
    eprintln!(
        "      {} cached addresses, {} cached coordinates",
        address_cache.len(),
        coord_cache.resolved_len(),
    );

    // ── Assemble the pipeline ───────────────────────────────────

    let provider: Box<dyn Geocoder> = match (cli.provider, cli.cache_only) {
        (Provider::Google, false) => Box::new(
            GoogleGeocoder::from_key_file(&cli.api_key_file).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }),
        ),
        // cache-only mode never queries, so no key is required
        (Provider::Google, true) => Box::new(GoogleGeocoder::new(String::new())),
        (Provider::Nominatim, _) => Box::new(NominatimGeocoder),
    };

    let addresses = AddressResolver::new(Box::new(UtbildningsguidenSource::new()), address_cache);
    let geocoder = GeocodeResolver::new(provider, coord_cache, cli.country.clone());
    let mut pipeline = ResolutionPipeline::new(
        addresses,
        geocoder,
        PipelineConfig {
            flush_every: cli.flush_every,
            rate_limit: Duration::from_millis(cli.rate_limit_ms),
            progress: true,
        },
    );

    // ── Run ─────────────────────────────────────────────────────

    let (enriched, stats) = if cli.cache_only {
        eprintln!("\n[3/4] Building records from cache only...");
        (pipeline.run_cached(&records), None)
    } else {
        eprintln!("\n[3/4] Resolving {} schools...", records.len());
        let (enriched, stats) = pipeline.run(&records);
        (enriched, Some(stats))
    };

    // ── Write output ────────────────────────────────────────────

    eprintln!("\n[4/4] Writing {}...", cli.output.display());
    dataset::write_enriched(&cli.output, &enriched).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    print_summary(
        &cli,
        &cache_dir,
        records.len(),
        enriched.len(),
        stats.as_ref(),
        started,
    );
}

fn print_summary(
    cli: &Cli,
    cache_dir: &std::path::Path,
    processed: usize,
    mapped: usize,
    stats: Option<&RunStats>,
    started: Instant,
) {
    let elapsed = started.elapsed().as_secs_f64();

    eprintln!("\n{}", "=".repeat(60));
    eprintln!("ENRICHMENT COMPLETE");
    eprintln!("{}", "=".repeat(60));
    eprintln!(
        "Total time: {:.1} minutes ({:.1} seconds)",
        elapsed / 60.0,
        elapsed
    );
    eprintln!("Schools processed: {}", processed);
    eprintln!("Schools mapped: {}", mapped);
    if processed > 0 {
        eprintln!(
            "Success rate: {:.1}%",
            mapped as f64 / processed as f64 * 100.0
        );
    }
    if let Some(stats) = stats {
        eprintln!("Address cache hits: {}", stats.cache_hits);
        eprintln!("Failed address extractions: {}", stats.failed_addresses);
        eprintln!("Failed geocoding: {}", stats.failed_geocoding);
    }
    eprintln!("\nFiles:");
    eprintln!("- {} (enriched data)", cli.output.display());
    eprintln!(
        "- {} (cached addresses)",
        cache_dir.join("address_cache.json").display()
    );
    eprintln!(
        "- {} (cached coordinates)",
        cache_dir.join("coord_cache.json").display()
    );
}
