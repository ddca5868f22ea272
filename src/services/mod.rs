//! Service layer modules for external collaborators.
//!
//! Contains the extraction service client, the supplier directory, Redis
//! caching and notification delivery.

pub mod cache;
pub mod directory;
pub mod extraction;
pub mod notifications;

pub use cache::RedisCache;
pub use directory::{PgSupplierDirectory, StaticSupplierDirectory, SupplierDirectory};
pub use extraction::{ExtractionClient, Extractor};
pub use notifications::{LogNotifier, Notifier, WebhookNotifier};
