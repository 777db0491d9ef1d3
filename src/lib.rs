//! Skolmap enriches the Skolverket merit-value export with street
//! addresses scraped from Utbildningsguiden and coordinates from a
//! geocoding backend, then writes the enriched table for a map renderer.
//!
//! Everything network-facing sits behind two persistent caches with
//! negative-result memoization, so a re-run over an already-seen dataset
//! finishes without a single request.

pub mod dataset;
pub mod pipeline;
pub mod resolve;
