pub mod common;
pub mod rmp;
pub mod scraper;
