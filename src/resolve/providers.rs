//! Live lookup backends: the Utbildningsguiden school pages and the two
//! geocoders (Google Maps, OSM Nominatim).

use super::types::{AddressSource, Geocoder, ResolveError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Address source ─────────────────────────────────────────────

/// The school site serves the full page to browser agents.
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const SCHOOL_UNIT_URL: &str = "https://utbildningsguiden.skolverket.se/skolenhet";

/// Fetches a school unit's detail page from Utbildningsguiden.
pub struct UtbildningsguidenSource {
    base_url: String,
}

impl UtbildningsguidenSource {
    pub fn new() -> Self {
        Self {
            base_url: SCHOOL_UNIT_URL.to_string(),
        }
    }
}

impl Default for UtbildningsguidenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSource for UtbildningsguidenSource {
    fn fetch(&self, id: &str) -> Result<String, ResolveError> {
        let response = ureq::get(&self.base_url)
            .query("schoolUnitID", id)
            .set("User-Agent", BROWSER_UA)
            .timeout(HTTP_TIMEOUT)
            .call()
            .map_err(|e| ResolveError::Network(e.to_string()))?;
        response
            .into_string()
            .map_err(|e| ResolveError::Network(e.to_string()))
    }
}

// ─── Google Maps geocoder ───────────────────────────────────────

#[derive(Deserialize)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(Deserialize)]
struct GoogleResult {
    geometry: GoogleGeometry,
}

#[derive(Deserialize)]
struct GoogleGeometry {
    location: GoogleLocation,
}

#[derive(Deserialize)]
struct GoogleLocation {
    lat: f64,
    lng: f64,
}

/// The paid path. One attempt per candidate; the API itself retries
/// nothing and answers quickly.
pub struct GoogleGeocoder {
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    /// Read the API key from a local file. A missing or empty file is a
    /// fatal startup condition; the caller reports it and exits.
    pub fn from_key_file(path: &Path) -> Result<Self, ResolveError> {
        let key = fs::read_to_string(path).map_err(|_| {
            ResolveError::Provider(format!(
                "Google Maps API key not found. Create '{}' with your API key.",
                path.display()
            ))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ResolveError::Provider(format!(
                "API key file '{}' is empty.",
                path.display()
            )));
        }
        Ok(Self::new(key))
    }
}

fn parse_google(body: &str) -> Result<Vec<(f64, f64)>, ResolveError> {
    let parsed: GoogleResponse =
        serde_json::from_str(body).map_err(|e| ResolveError::InvalidResponse(e.to_string()))?;
    match parsed.status.as_str() {
        "OK" => Ok(parsed
            .results
            .iter()
            .map(|r| (r.geometry.location.lat, r.geometry.location.lng))
            .collect()),
        "ZERO_RESULTS" => Ok(Vec::new()),
        other => Err(ResolveError::Provider(other.to_string())),
    }
}

impl Geocoder for GoogleGeocoder {
    fn geocode(&self, query: &str) -> Result<Vec<(f64, f64)>, ResolveError> {
        let response = ureq::get("https://maps.googleapis.com/maps/api/geocode/json")
            .query("address", query)
            .query("key", &self.api_key)
            .timeout(HTTP_TIMEOUT)
            .call()
            .map_err(|e| ResolveError::Network(e.to_string()))?;
        let body = response
            .into_string()
            .map_err(|e| ResolveError::Network(e.to_string()))?;
        parse_google(&body)
    }

    fn name(&self) -> &'static str {
        "Google Maps"
    }
}

// ─── Nominatim geocoder ─────────────────────────────────────────

/// Nominatim's usage policy wants an identifying agent, not a browser one.
const NOMINATIM_UA: &str = "skolmap/0.4 (school-merit-mapper)";

#[derive(Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
}

/// The public rate-limited path. Matching is strict, so the cascade gets
/// the street-token candidate, and each candidate is tried twice with a
/// pause in between.
pub struct NominatimGeocoder;

fn parse_nominatim(body: &str) -> Result<Vec<(f64, f64)>, ResolveError> {
    let hits: Vec<NominatimHit> =
        serde_json::from_str(body).map_err(|e| ResolveError::InvalidResponse(e.to_string()))?;
    let mut coords = Vec::with_capacity(hits.len());
    for hit in hits {
        let lat = hit
            .lat
            .parse()
            .map_err(|_| ResolveError::InvalidResponse(format!("bad lat '{}'", hit.lat)))?;
        let lon = hit
            .lon
            .parse()
            .map_err(|_| ResolveError::InvalidResponse(format!("bad lon '{}'", hit.lon)))?;
        coords.push((lat, lon));
    }
    Ok(coords)
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, query: &str) -> Result<Vec<(f64, f64)>, ResolveError> {
        let response = ureq::get("https://nominatim.openstreetmap.org/search")
            .query("q", query)
            .query("format", "json")
            .query("limit", "1")
            .set("User-Agent", NOMINATIM_UA)
            .timeout(Duration::from_secs(15))
            .call()
            .map_err(|e| ResolveError::Network(e.to_string()))?;
        let body = response
            .into_string()
            .map_err(|e| ResolveError::Network(e.to_string()))?;
        parse_nominatim(&body)
    }

    fn attempts(&self) -> u32 {
        2
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn strict_matching(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "Nominatim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_google_ok() {
        let body = r#"{
            "status": "OK",
            "results": [
                {"geometry": {"location": {"lat": 59.8586, "lng": 17.6389}}},
                {"geometry": {"location": {"lat": 59.0, "lng": 18.0}}}
            ]
        }"#;
        let coords = parse_google(body).unwrap();
        assert_eq!(coords.len(), 2);
        assert_relative_eq!(coords[0].0, 59.8586);
        assert_relative_eq!(coords[0].1, 17.6389);
    }

    #[test]
    fn test_parse_google_zero_results_is_empty_not_error() {
        let body = r#"{"status": "ZERO_RESULTS", "results": []}"#;
        assert!(parse_google(body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_google_error_status() {
        let body = r#"{"status": "REQUEST_DENIED", "results": []}"#;
        match parse_google(body) {
            Err(ResolveError::Provider(status)) => assert_eq!(status, "REQUEST_DENIED"),
            other => panic!("expected provider error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_parse_google_garbage() {
        assert!(matches!(
            parse_google("not json"),
            Err(ResolveError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_nominatim_hit() {
        let body = r#"[{"lat": "59.8586", "lon": "17.6389", "display_name": "Uppsala"}]"#;
        let coords = parse_nominatim(body).unwrap();
        assert_eq!(coords.len(), 1);
        assert_relative_eq!(coords[0].0, 59.8586);
        assert_relative_eq!(coords[0].1, 17.6389);
    }

    #[test]
    fn test_parse_nominatim_empty() {
        assert!(parse_nominatim("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_nominatim_bad_lat() {
        let body = r#"[{"lat": "north", "lon": "17.6"}]"#;
        assert!(matches!(
            parse_nominatim(body),
            Err(ResolveError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_key_file_loaded_and_trimmed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key.txt");
        fs::write(&path, "AIza-test-key\n").unwrap();

        let geocoder = GoogleGeocoder::from_key_file(&path).unwrap();
        assert_eq!(geocoder.api_key, "AIza-test-key");
    }

    #[test]
    fn test_key_file_missing_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(GoogleGeocoder::from_key_file(&dir.path().join("nope.txt")).is_err());
    }

    #[test]
    fn test_key_file_empty_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key.txt");
        fs::write(&path, "  \n").unwrap();
        assert!(GoogleGeocoder::from_key_file(&path).is_err());
    }

    #[test]
    fn test_provider_retry_policies() {
        assert_eq!(NominatimGeocoder.attempts(), 2);
        assert!(NominatimGeocoder.strict_matching());
        assert_eq!(GoogleGeocoder::new("k").attempts(), 1);
        assert!(!GoogleGeocoder::new("k").strict_matching());
    }
}
