pub mod config;
pub mod db;
pub mod record;
pub mod scrape;
