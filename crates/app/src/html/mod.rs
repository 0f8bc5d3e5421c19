//! Embedded static HTML served by the map server.
//!
//! Kept as `&'static str` so the page ships inside the binary.

pub mod map;
