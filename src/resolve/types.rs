//! Shared types for the resolution subsystem.

use std::fmt;
use std::time::Duration;

/// Errors from the external lookup backends. Every one of these is a
/// per-row soft failure: callers swallow it into a cached negative result
/// and move on. Only startup preconditions are fatal, and those are
/// reported by `main`, not raised here.
#[derive(Debug)]
pub enum ResolveError {
    Network(String),
    InvalidResponse(String),
    /// The backend answered but refused the query (bad key, quota, ...).
    Provider(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::InvalidResponse(msg) => write!(f, "Invalid API response: {}", msg),
            Self::Provider(msg) => write!(f, "Provider error: {}", msg),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Where school detail pages come from.
pub trait AddressSource {
    /// Fetch the raw document for a school unit id. Non-200 statuses and
    /// transport problems both surface as errors.
    fn fetch(&self, id: &str) -> Result<String, ResolveError>;
}

/// A geocoding backend. `geocode` returns every match for a free-form
/// query, best first; an empty list is a clean "no results".
pub trait Geocoder {
    fn geocode(&self, query: &str) -> Result<Vec<(f64, f64)>, ResolveError>;

    /// Attempts per candidate query before moving down the cascade.
    fn attempts(&self) -> u32 {
        1
    }

    /// Pause between attempts on the same candidate.
    fn retry_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Strict-matching backends get an extra street-name-only candidate
    /// in the cascade.
    fn strict_matching(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}
