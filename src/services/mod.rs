//! Orchestration on top of the scrapers and analyzers.
//!
//! Services are constructed once and shared through `Arc`s; they can be
//! driven by the CLI or embedded in another application.

pub mod backup;
pub mod enrichment;

pub use backup::{
    BackupConfig, BackupProductResult, BackupProductService, GenerativeSource, ProductSource,
    SerpApiSource, SourceError, WalmartSource,
};
pub use enrichment::{GiftEnrichmentService, GiftProcessingResult};
