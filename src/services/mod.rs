//! Object store clients and the filesystem adapter built on top of them.

pub mod bucket_fs;
pub mod directory;
pub mod fallback;
pub mod file_handle;
pub mod memory_store;
pub mod object_store;
pub mod path_resolver;
pub mod s3_store;
