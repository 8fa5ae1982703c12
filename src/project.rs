//! Project identification.
//!
//! Each host process serves one project; the project's root path is hashed
//! into a short id that names its endpoint. The hash must not depend on
//! which path separator the caller used.

use std::path::Path;

use sha2::{Digest, Sha256};

/// Length of a project hash in hex characters.
pub const PROJECT_HASH_LEN: usize = 8;

/// Normalize a project path for hashing.
///
/// Backslashes become forward slashes, repeated separators collapse and a
/// trailing separator is dropped. Case is preserved.
pub fn normalize_project_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");

    let mut normalized = String::with_capacity(unified.len());
    let mut prev_slash = false;
    for ch in unified.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        normalized.push(ch);
    }

    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Stable 8-character lowercase hex id for a project path.
///
/// ```
/// use cmdwire::project::project_hash;
///
/// assert_eq!(
///     project_hash(r"C:\Users\dev\MyProject\Assets"),
///     project_hash("C:/Users/dev/MyProject/Assets"),
/// );
/// ```
pub fn project_hash(path: &str) -> String {
    let digest = Sha256::digest(normalize_project_path(path).as_bytes());
    digest[..PROJECT_HASH_LEN / 2]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Project hash for a filesystem path.
pub fn project_hash_for(path: &Path) -> String {
    project_hash(&path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separator_independent() {
        let windows = project_hash(r"C:\Users\dev\MyProject\Assets");
        let unix = project_hash("C:/Users/dev/MyProject/Assets");
        assert_eq!(windows, unix);
    }

    #[test]
    fn test_hash_shape() {
        let hash = project_hash("/home/dev/game");
        assert_eq!(hash.len(), PROJECT_HASH_LEN);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_distinct_paths_differ() {
        assert_ne!(project_hash("/home/dev/game"), project_hash("/home/dev/game2"));
        assert_ne!(project_hash("/home/dev/Game"), project_hash("/home/dev/game"));
    }

    #[test]
    fn test_trailing_and_repeated_separators() {
        assert_eq!(project_hash("/home/dev/game/"), project_hash("/home/dev/game"));
        assert_eq!(project_hash(r"C:\\work\\game\"), project_hash("C:/work/game"));
    }

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_project_path("/"), "/");
        assert_eq!(normalize_project_path(r"\\server\share\"), "/server/share");
    }

    #[test]
    fn test_path_variant() {
        let p = Path::new("/home/dev/game");
        assert_eq!(project_hash_for(p), project_hash("/home/dev/game"));
    }
}
