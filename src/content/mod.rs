//! Article content model
//!
//! Sections are the narratable segments. Storage of the article itself is
//! external; this module only loads the catalog and derives word counts.

pub mod catalog;

pub use catalog::{Catalog, Section, SegmentId};
