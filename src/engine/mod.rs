//! Pure scoring engines used by the stage handlers
//!
//! None of these touch the store or the network; the same input always
//! produces the same artifact apart from timestamps.

pub mod comparator;
pub mod compliance;
pub mod matcher;

pub use comparator::BidComparator;
pub use compliance::ComplianceClassifier;
pub use matcher::{MatchParams, RegionTable, SupplierMatcher};
