//! Domain types and DTOs
//!
//! These types define the artifacts persisted by each workflow stage and the
//! request bodies of the stage commands.

pub mod bids;
pub mod commands;
pub mod compliance;
pub mod items;
pub mod records;
pub mod suppliers;
pub mod workflow;

// Re-export commonly used types
pub use bids::*;
pub use compliance::*;
pub use items::*;
pub use records::*;
pub use suppliers::*;
pub use workflow::*;
