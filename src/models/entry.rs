//! Filesystem-shaped view over bucket contents.

use super::object::ObjectInfo;
use chrono::{DateTime, Utc};

/// A file or directory as seen by the static file server.
///
/// `File` entries always carry metadata taken from a successful store stat
/// or listing. `VirtualDirectory` entries have no store backing; their
/// modification time is synthesized when the entry is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedEntry {
    File(ObjectInfo),
    VirtualDirectory {
        /// Key prefix with surrounding separators stripped (`""` for the root).
        prefix: String,
        modified: DateTime<Utc>,
    },
}

/// Entries produced by one directory enumeration.
pub type ListingPage = Vec<ResolvedEntry>;

impl ResolvedEntry {
    pub fn directory(prefix: &str) -> Self {
        Self::VirtualDirectory {
            prefix: prefix.trim_matches('/').to_string(),
            modified: Utc::now(),
        }
    }

    /// Last path segment of the key or prefix.
    pub fn name(&self) -> &str {
        let key = match self {
            Self::File(info) => info.key.as_str(),
            Self::VirtualDirectory { prefix, .. } => prefix.as_str(),
        };
        key.rsplit('/').next().unwrap_or(key)
    }

    pub fn size(&self) -> u64 {
        match self {
            Self::File(info) => info.size,
            Self::VirtualDirectory { .. } => 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::VirtualDirectory { .. })
    }

    pub fn modified(&self) -> DateTime<Utc> {
        match self {
            Self::File(info) => info.last_modified,
            Self::VirtualDirectory { modified, .. } => *modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_use_last_segment() {
        let file = ResolvedEntry::File(ObjectInfo::new("a/b.txt", 3, Utc::now()));
        assert_eq!(file.name(), "b.txt");
        assert!(!file.is_dir());
        assert_eq!(file.size(), 3);

        let dir = ResolvedEntry::directory("a/c/");
        assert_eq!(dir.name(), "c");
        assert!(dir.is_dir());
        assert_eq!(dir.size(), 0);
    }

    #[test]
    fn root_directory_has_empty_name() {
        let root = ResolvedEntry::directory("/");
        assert_eq!(root.name(), "");
        assert_eq!(
            root,
            ResolvedEntry::VirtualDirectory {
                prefix: String::new(),
                modified: root.modified()
            }
        );
    }
}
