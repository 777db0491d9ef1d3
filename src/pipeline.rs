//! Sequential enrichment pipeline over the dataset.
//!
//! One row at a time: address stage, then geocode stage. The geocode
//! stage always runs, address or not, so a municipality-level fallback
//! coordinate can still be produced. A row only makes it downstream when
//! a coordinate came back; everything else is counted and dropped for the
//! rest of the run.

use crate::dataset::{EnrichedRecord, SchoolRecord};
use crate::resolve::{AddressResolver, CacheStore, GeocodeResolver, Lookup};
use std::thread;
use std::time::{Duration, Instant};

pub struct PipelineConfig {
    /// Checkpoint both caches every this many rows.
    pub flush_every: usize,
    /// Pause after each row whose address had to be fetched. Fully cached
    /// re-runs never sleep.
    pub rate_limit: Duration,
    /// Narrate per-row progress on stderr.
    pub progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            flush_every: 100,
            rate_limit: Duration::from_millis(200),
            progress: true,
        }
    }
}

/// Observational counters; not part of correctness.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub processed: usize,
    pub enriched: usize,
    pub cache_hits: usize,
    pub failed_addresses: usize,
    pub failed_geocoding: usize,
}

pub struct ResolutionPipeline {
    addresses: AddressResolver,
    geocoder: GeocodeResolver,
    config: PipelineConfig,
}

impl ResolutionPipeline {
    pub fn new(
        addresses: AddressResolver,
        geocoder: GeocodeResolver,
        config: PipelineConfig,
    ) -> Self {
        Self {
            addresses,
            geocoder,
            config,
        }
    }

    /// Enrich every record the caches and the network allow. Flushes both
    /// caches every `flush_every` rows and once more at the end.
    pub fn run(&mut self, records: &[SchoolRecord]) -> (Vec<EnrichedRecord>, RunStats) {
        let started = Instant::now();
        let mut stats = RunStats::default();
        let mut enriched = Vec::new();

        for (idx, record) in records.iter().enumerate() {
            stats.processed += 1;

            if self.config.progress {
                report_progress(idx, records.len(), started);
                eprintln!(
                    "      {:4}. {:<50} (ID: {})",
                    idx + 1,
                    truncate(&record.name, 50),
                    record.id
                );
            }

            let was_cached = !matches!(self.addresses.peek(&record.id), Lookup::Miss);
            if was_cached {
                stats.cache_hits += 1;
            }

            let address = self.addresses.resolve(&record.id);
            if self.config.progress {
                match &address {
                    Some(a) => eprintln!(
                        "            Address: {} {}",
                        a,
                        if was_cached { "[CACHED]" } else { "[NEW]" }
                    ),
                    None => eprintln!(
                        "            Address: not found {}",
                        if was_cached { "[CACHED]" } else { "[FAILED]" }
                    ),
                }
            }
            if address.is_none() {
                stats.failed_addresses += 1;
            }

            // even with no address, a municipality-level coordinate is
            // better than no marker at all
            let coords = self.geocoder.resolve(address.as_deref(), &record.municipality);

            match coords {
                Some((lat, lng)) => {
                    if self.config.progress {
                        eprintln!("            Coords: {:.4}, {:.4} [OK]", lat, lng);
                    }
                    enriched.push(EnrichedRecord {
                        id: record.id.clone(),
                        name: record.name.clone(),
                        municipality: record.municipality.clone(),
                        address: address
                            .clone()
                            .unwrap_or_else(|| record.municipality.clone()),
                        merit: record.merit,
                        latitude: lat,
                        longitude: lng,
                    });
                    stats.enriched += 1;
                }
                None => {
                    if self.config.progress {
                        eprintln!("            Coords: failed to geocode [FAIL]");
                    }
                    stats.failed_geocoding += 1;
                }
            }

            if self.config.flush_every > 0 && idx % self.config.flush_every == 0 {
                self.checkpoint();
            }

            if !was_cached && !self.config.rate_limit.is_zero() {
                thread::sleep(self.config.rate_limit);
            }
        }

        self.checkpoint();
        (enriched, stats)
    }

    /// Build enriched records from the caches alone. No network, no cache
    /// writes; rows missing either cache entry are skipped.
    pub fn run_cached(&self, records: &[SchoolRecord]) -> Vec<EnrichedRecord> {
        let mut enriched = Vec::new();
        for record in records {
            let Lookup::Hit(address) = self.addresses.peek(&record.id) else {
                continue;
            };
            let Lookup::Hit([lat, lng]) = self.geocoder.peek(Some(&address), &record.municipality)
            else {
                continue;
            };
            enriched.push(EnrichedRecord {
                id: record.id.clone(),
                name: record.name.clone(),
                municipality: record.municipality.clone(),
                address,
                merit: record.merit,
                latitude: lat,
                longitude: lng,
            });
        }
        enriched
    }

    pub fn address_cache(&self) -> &CacheStore<String> {
        self.addresses.cache()
    }

    pub fn coordinate_cache(&self) -> &CacheStore<[f64; 2]> {
        self.geocoder.cache()
    }

    fn checkpoint(&self) {
        if let Err(e) = self.addresses.flush() {
            eprintln!("      Warning: address cache flush failed: {}", e);
        }
        if let Err(e) = self.geocoder.flush() {
            eprintln!("      Warning: coordinate cache flush failed: {}", e);
        }
    }
}

fn report_progress(idx: usize, total: usize, started: Instant) {
    if idx % 100 != 0 && idx >= 10 {
        return;
    }
    let elapsed = started.elapsed().as_secs_f64();
    let pct = if total > 0 {
        idx as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    let eta = if idx > 0 {
        elapsed / idx as f64 * (total - idx) as f64
    } else {
        0.0
    };
    eprintln!(
        "\n      Progress: {}/{} ({:.1}%) - {:.1}s elapsed, ETA: {:.1}s",
        idx + 1,
        total,
        pct,
        elapsed,
        eta
    );
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{AddressSource, Geocoder, ResolveError};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use tempfile::TempDir;

    struct PageSource {
        pages: HashMap<String, String>,
    }

    impl AddressSource for PageSource {
        fn fetch(&self, id: &str) -> Result<String, ResolveError> {
            self.pages
                .get(id)
                .cloned()
                .ok_or_else(|| ResolveError::Network("404".into()))
        }
    }

    struct ScriptedGeocoder {
        answers: HashMap<String, (f64, f64)>,
        queries: Rc<RefCell<Vec<String>>>,
    }

    impl Geocoder for ScriptedGeocoder {
        fn geocode(&self, query: &str) -> Result<Vec<(f64, f64)>, ResolveError> {
            self.queries.borrow_mut().push(query.to_string());
            Ok(self.answers.get(query).map(|&c| vec![c]).unwrap_or_default())
        }

        fn name(&self) -> &'static str {
            "Scripted"
        }
    }

    fn record(id: &str, name: &str, municipality: &str, merit: f64) -> SchoolRecord {
        SchoolRecord {
            id: id.into(),
            name: name.into(),
            municipality: municipality.into(),
            merit,
        }
    }

    fn quiet_config() -> PipelineConfig {
        PipelineConfig {
            flush_every: 100,
            rate_limit: Duration::ZERO,
            progress: false,
        }
    }

    fn pipeline(
        dir: &TempDir,
        pages: &[(&str, &str)],
        answers: &[(&str, (f64, f64))],
    ) -> (ResolutionPipeline, Rc<RefCell<Vec<String>>>) {
        let source = PageSource {
            pages: pages
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        let queries = Rc::new(RefCell::new(Vec::new()));
        let geocoder = ScriptedGeocoder {
            answers: answers
                .iter()
                .map(|(q, c)| (q.to_string(), *c))
                .collect(),
            queries: queries.clone(),
        };
        let addresses = AddressResolver::new(
            Box::new(source),
            CacheStore::load_from(dir.path().join("address_cache.json")),
        );
        let coords = GeocodeResolver::new(
            Box::new(geocoder),
            CacheStore::load_from(dir.path().join("coord_cache.json")),
            "Sweden",
        );
        (
            ResolutionPipeline::new(addresses, coords, quiet_config()),
            queries,
        )
    }

    #[test]
    fn test_end_to_end_enrichment() {
        let dir = TempDir::new().unwrap();
        let page = "<html><body><p>Adress</p><p>Kungsgatan 10</p></body></html>";
        let (mut pipeline, _) = pipeline(
            &dir,
            &[("12345", page)],
            &[("Kungsgatan 10, Uppsala, Sweden", (59.86, 17.64))],
        );

        let records = [record("12345", "Test School", "Uppsala", 280.5)];
        let (enriched, stats) = pipeline.run(&records);

        assert_eq!(
            enriched,
            vec![EnrichedRecord {
                id: "12345".into(),
                name: "Test School".into(),
                municipality: "Uppsala".into(),
                address: "Kungsgatan 10".into(),
                merit: 280.5,
                latitude: 59.86,
                longitude: 17.64,
            }]
        );
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.enriched, 1);
        assert_eq!(stats.cache_hits, 0);
        assert_eq!(stats.failed_addresses, 0);
        assert_eq!(stats.failed_geocoding, 0);

        // both caches gained exactly one entry
        assert_eq!(pipeline.address_cache().len(), 1);
        assert_eq!(pipeline.coordinate_cache().len(), 1);
    }

    #[test]
    fn test_dropped_row_counts_both_failures() {
        // page 404s, municipality fallback finds nothing either
        let dir = TempDir::new().unwrap();
        let (mut pipeline, queries) = pipeline(&dir, &[], &[]);

        let records = [record("99999", "Ghost School", "Atlantis", 150.0)];
        let (enriched, stats) = pipeline.run(&records);

        assert!(enriched.is_empty());
        assert_eq!(stats.failed_addresses, 1);
        assert_eq!(stats.failed_geocoding, 1);
        // the municipality fallback was still attempted
        assert_eq!(*queries.borrow(), vec!["Atlantis, Sweden".to_string()]);
    }

    #[test]
    fn test_no_address_but_municipality_coordinate_enriches() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, _) = pipeline(
            &dir,
            &[],
            &[("Uppsala, Sweden", (59.8586, 17.6389))],
        );

        let records = [record("11111", "Unlisted School", "Uppsala", 210.0)];
        let (enriched, stats) = pipeline.run(&records);

        assert_eq!(enriched.len(), 1);
        // address falls back to the municipality name in the output
        assert_eq!(enriched[0].address, "Uppsala");
        assert_eq!(stats.failed_addresses, 1);
        assert_eq!(stats.failed_geocoding, 0);
    }

    #[test]
    fn test_second_run_is_fully_cached() {
        let dir = TempDir::new().unwrap();
        let page = "Adress\nKungsgatan 10";
        let records = [record("12345", "Test School", "Uppsala", 280.5)];

        {
            let (mut first, _) = pipeline(
                &dir,
                &[("12345", page)],
                &[("Kungsgatan 10, Uppsala, Sweden", (59.86, 17.64))],
            );
            first.run(&records);
        }

        // new pipeline over the same cache dir, with backends that know
        // nothing: everything must come from the caches
        let (mut second, queries) = pipeline(&dir, &[], &[]);
        let (enriched, stats) = second.run(&records);

        assert_eq!(enriched.len(), 1);
        assert_eq!(stats.cache_hits, 1);
        assert!(queries.borrow().is_empty());
    }

    #[test]
    fn test_caches_flushed_at_end_of_run() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, _) = pipeline(&dir, &[], &[]);
        pipeline.run(&[record("1", "A", "B", 100.0)]);

        assert!(dir.path().join("address_cache.json").exists());
        assert!(dir.path().join("coord_cache.json").exists());
    }

    #[test]
    fn test_run_cached_uses_only_caches() {
        let dir = TempDir::new().unwrap();

        let mut address_cache: CacheStore<String> =
            CacheStore::load_from(dir.path().join("address_cache.json"));
        address_cache.put("12345", Some("Kungsgatan 10".to_string()));
        address_cache.put("22222", None);
        let mut coord_cache: CacheStore<[f64; 2]> =
            CacheStore::load_from(dir.path().join("coord_cache.json"));
        coord_cache.put("Kungsgatan 10|Uppsala", Some([59.86, 17.64]));

        struct NoSource;
        impl AddressSource for NoSource {
            fn fetch(&self, _: &str) -> Result<String, ResolveError> {
                panic!("cache-only mode must not fetch");
            }
        }
        struct NoGeocoder;
        impl Geocoder for NoGeocoder {
            fn geocode(&self, _: &str) -> Result<Vec<(f64, f64)>, ResolveError> {
                panic!("cache-only mode must not geocode");
            }
            fn name(&self) -> &'static str {
                "None"
            }
        }

        let pipeline = ResolutionPipeline::new(
            AddressResolver::new(Box::new(NoSource), address_cache),
            GeocodeResolver::new(Box::new(NoGeocoder), coord_cache, "Sweden"),
            quiet_config(),
        );

        let records = [
            record("12345", "Test School", "Uppsala", 280.5),
            record("22222", "Negative School", "Lund", 230.0),
            record("33333", "Unseen School", "Umeå", 220.0),
        ];
        let enriched = pipeline.run_cached(&records);

        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].id, "12345");
        assert_eq!(enriched[0].latitude, 59.86);
    }

    #[test]
    fn test_periodic_checkpoint_writes_files() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, _) = pipeline(
            &dir,
            &[],
            &[("Uppsala, Sweden", (59.85, 17.63))],
        );
        pipeline.config.flush_every = 1;

        pipeline.run(&[
            record("1", "A", "Uppsala", 100.0),
            record("2", "B", "Uppsala", 110.0),
        ]);

        assert!(dir.path().join("address_cache.json").exists());
        assert!(dir.path().join("coord_cache.json").exists());
    }
}
