//! Cartography: robots.txt discovery, sitemap parsing, sitemap walking and
//! product URL filtering.

pub mod robots;
pub mod sitemap;
pub mod url;
pub mod walker;
