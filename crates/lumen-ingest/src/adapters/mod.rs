//! Network-backed enrichment adapters.

pub mod geonames;

pub use geonames::{GeonamesConfig, GeonamesGeocoder};
