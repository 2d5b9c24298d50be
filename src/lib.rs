//! giftscout - anonymous product scraping and gift intelligence.
//!
//! Scrapes product listings through a rotating proxy pool, falls back to
//! backup sources when scraping fails, and layers price, sentiment and
//! category analysis on top to enrich gifts mentioned in conversation.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod rate_limit;
pub mod scrapers;
pub mod services;
pub mod store;
