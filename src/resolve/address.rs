//! Address resolution: the school page scrape behind the address cache.
//!
//! Cache flow: a present entry, null included, is returned as-is with no
//! network call. Only a missing key fetches, and whatever comes out of the
//! fetch (an address, nothing found, a dead connection) is written back
//! before returning, so no key is ever attempted twice across runs.

use super::cache::{CacheStore, Lookup};
use super::html;
use super::types::AddressSource;
use regex::Regex;
use std::io;
use std::sync::OnceLock;

/// Label preceding the street address in the page text.
const ADDRESS_LABEL: &str = "Adress";

/// Shorter candidates are markup debris, not addresses.
const MIN_ADDRESS_CHARS: usize = 4;

/// Second-chance pattern for when the label and value share a line or the
/// page layout drifted. `\s*` crosses newlines, so a label-on-its-own-line
/// page still matches with the value line captured.
fn fallback_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Adress:?\s*([^\n]+)").expect("valid address pattern"))
}

pub struct AddressResolver {
    source: Box<dyn AddressSource>,
    cache: CacheStore<String>,
}

impl AddressResolver {
    pub fn new(source: Box<dyn AddressSource>, cache: CacheStore<String>) -> Self {
        Self { source, cache }
    }

    /// Non-mutating cache lookup. Cache-only mode and the pipeline's
    /// was-cached accounting go through this.
    pub fn peek(&self, id: &str) -> Lookup<String> {
        self.cache.get(id)
    }

    /// Resolve the street address for a school unit id, or `None` when the
    /// page has none. Cache hits issue no I/O at all.
    pub fn resolve(&mut self, id: &str) -> Option<String> {
        match self.cache.get(id) {
            Lookup::Hit(address) => return Some(address),
            Lookup::NegativeHit => return None,
            Lookup::Miss => {}
        }

        let result = match self.source.fetch(id) {
            Ok(document) => extract_address(&html::visible_text(&document)),
            // transport failure: cached below as a negative result
            Err(_) => None,
        };

        self.cache.put(id, result.clone());
        result
    }

    pub fn flush(&self) -> io::Result<()> {
        self.cache.flush()
    }

    pub fn cache(&self) -> &CacheStore<String> {
        &self.cache
    }
}

/// Two-tier extraction. The exact line scan is the precise strategy; the
/// pattern search only runs when the scan found nothing, to survive minor
/// layout drift without loosening the primary match.
fn extract_address(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if line.trim() == ADDRESS_LABEL {
            if let Some(next) = lines.get(i + 1) {
                let candidate = next.trim();
                if candidate.chars().count() >= MIN_ADDRESS_CHARS {
                    return Some(candidate.to_string());
                }
            }
        }
    }

    fallback_pattern()
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|address| !address.is_empty())
}
