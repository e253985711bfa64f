//! Core data models for the bucket-backed static site.
//!
//! `ObjectInfo` mirrors what the object store reports; `ResolvedEntry` is the
//! file/directory view handed to the HTTP layer.

pub mod entry;
pub mod object;
