pub mod browser;
pub mod config;
pub mod error;
pub mod models;
pub mod parsers;
pub mod runner;
pub mod scrapers;
pub mod storage;
pub mod utils;
