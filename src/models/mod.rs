//! Data models for giftscout.

mod gift;
mod product;
mod proxy;
mod result;

pub use gift::{
    AgeRange, Availability, EnrichedGift, EnrichmentOptions, Gift, GiftAnalysis, GiftSuggestion,
};
pub use product::{Review, ScrapedProduct};
pub use proxy::{Proxy, ProxyCredentials, ProxyProtocol, UserAgent};
pub use result::{ErrorCode, GiftProcessingError, ProcessingResult};
