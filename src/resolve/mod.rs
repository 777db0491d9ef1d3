//! Resolution subsystem: persistent caches, the address scrape and the
//! geocoding cascade.
//!
//! Both resolvers are cache-first. A present cache entry, negative ones
//! included, is authoritative and issues no I/O; only missing keys reach
//! the network, and every network outcome is written back before it is
//! returned.

pub mod address;
pub mod cache;
pub mod geocode;
pub mod html;
pub mod providers;
pub mod types;

pub use address::AddressResolver;
pub use cache::{CacheStore, Lookup};
pub use geocode::GeocodeResolver;
pub use providers::{GoogleGeocoder, NominatimGeocoder, UtbildningsguidenSource};
pub use types::{AddressSource, Geocoder, ResolveError};
