//! Coordinate resolution: the candidate cascade behind the coordinate cache.
//!
//! Queries go from most to least specific and the first one with any
//! result ends the search, so a match is as precise as the data allows.
//! Total failure is cached under the same composite key as success and is
//! never retried in a later run.

use super::cache::{CacheStore, Lookup};
use super::types::Geocoder;
use std::io;
use std::thread;

/// Placeholder for "no address" in the composite cache key.
const NO_ADDRESS: &str = "None";

pub struct GeocodeResolver {
    provider: Box<dyn Geocoder>,
    cache: CacheStore<[f64; 2]>,
    country: String,
}

impl GeocodeResolver {
    pub fn new(
        provider: Box<dyn Geocoder>,
        cache: CacheStore<[f64; 2]>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            cache,
            country: country.into(),
        }
    }

    pub fn cache_key(address: Option<&str>, municipality: &str) -> String {
        format!("{}|{}", address.unwrap_or(NO_ADDRESS), municipality)
    }

    /// Non-mutating cache lookup for cache-only mode.
    pub fn peek(&self, address: Option<&str>, municipality: &str) -> Lookup<[f64; 2]> {
        self.cache.get(&Self::cache_key(address, municipality))
    }

    /// Resolve a coordinate for an address (possibly unknown) within a
    /// municipality. Cache hits, cached failures included, issue no
    /// network calls.
    pub fn resolve(&mut self, address: Option<&str>, municipality: &str) -> Option<(f64, f64)> {
        let key = Self::cache_key(address, municipality);
        match self.cache.get(&key) {
            Lookup::Hit([lat, lng]) => return Some((lat, lng)),
            Lookup::NegativeHit => return None,
            Lookup::Miss => {}
        }

        for query in self.candidates(address, municipality) {
            if let Some((lat, lng)) = self.try_candidate(&query) {
                self.cache.put(key, Some([lat, lng]));
                return Some((lat, lng));
            }
        }

        self.cache.put(key, None);
        None
    }

    /// Most specific first. Strict-matching providers get an extra
    /// street-name-only variant before the municipality fallback; with no
    /// address at all the municipality is the only candidate.
    fn candidates(&self, address: Option<&str>, municipality: &str) -> Vec<String> {
        let country = &self.country;
        match address {
            Some(addr) => {
                let mut list = vec![
                    format!("{}, {}, {}", addr, municipality, country),
                    format!("{}, {}", addr, country),
                ];
                if self.provider.strict_matching() {
                    if let Some(street) = addr.split_whitespace().next() {
                        list.push(format!("{}, {}, {}", street, municipality, country));
                    }
                }
                list.push(format!("{}, {}", municipality, country));
                list
            }
            None => vec![format!("{}, {}", municipality, country)],
        }
    }

    /// One candidate, up to `attempts()` tries. Provider errors are
    /// warnings here; the cascade decides what failure means.
    fn try_candidate(&self, query: &str) -> Option<(f64, f64)> {
        for attempt in 0..self.provider.attempts() {
            if attempt > 0 {
                thread::sleep(self.provider.retry_delay());
            }
            match self.provider.geocode(query) {
                Ok(results) => {
                    if let Some(&first) = results.first() {
                        return Some(first);
                    }
                }
                Err(e) => {
                    eprintln!("            {} error: {}", self.provider.name(), e);
                }
            }
        }
        None
    }

    pub fn flush(&self) -> io::Result<()> {
        self.cache.flush()
    }

    pub fn cache(&self) -> &CacheStore<[f64; 2]> {
        &self.cache
    }
}
