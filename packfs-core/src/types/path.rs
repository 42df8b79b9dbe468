//! Path normalization and path-string utilities.
//!
//! Every path that enters the VFS goes through [`NormalizedPath`] first. The
//! normalizer is total: any string produces a path, malformed input simply
//! degrades to the closest sane reading of it.

use std::fmt;
use std::path::{Path, PathBuf};

/// A canonical, case-preserving path.
///
/// Segments never contain `.` and never contain `..`: a `..` either removes
/// the segment before it or, when there is nothing left to remove, is counted
/// in [`parent_levels`](Self::parent_levels) and rendered as a leading `../`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NormalizedPath {
    segments: Vec<String>,
    rooted: bool,
    parent_levels: usize,
}

impl NormalizedPath {
    /// Normalizes a path string.
    ///
    /// Both `/` and `\` separate segments, empty segments are dropped and a
    /// leading separator marks the path as rooted.
    pub fn new(path: &str) -> Self {
        let rooted = path.starts_with(['/', '\\']);
        let mut segments: Vec<String> = Vec::new();
        let mut parent_levels = 0;

        for part in path.split(['/', '\\']) {
            match part {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        parent_levels += 1;
                    }
                }
                name => segments.push(name.to_string()),
            }
        }

        Self {
            segments,
            rooted,
            parent_levels,
        }
    }

    /// Builds a relative path directly from already-clean segments.
    fn from_parts(segments: Vec<String>, parent_levels: usize) -> Self {
        Self {
            segments,
            rooted: false,
            parent_levels,
        }
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns true if the original path began with a separator.
    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    /// Number of `..` that climbed above the first segment.
    pub fn parent_levels(&self) -> usize {
        self.parent_levels
    }

    /// Returns true if the path names the current directory (or the root).
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.parent_levels == 0
    }

    /// Returns true if the path is absolute on the host.
    pub fn is_full(&self) -> bool {
        self.rooted || self.segments.first().is_some_and(|s| is_drive_segment(s))
    }

    /// Appends another path, resolving its leading `..` against this one.
    pub fn join(&self, rest: &NormalizedPath) -> NormalizedPath {
        let mut joined = self.clone();
        for _ in 0..rest.parent_levels {
            if joined.segments.pop().is_none() {
                joined.parent_levels += 1;
            }
        }
        joined.segments.extend(rest.segments.iter().cloned());
        joined
    }

    /// Appends a path given as a string.
    pub fn join_str(&self, rest: &str) -> NormalizedPath {
        self.join(&NormalizedPath::new(rest))
    }

    /// Returns true if `prefix` covers the leading whole segments of this path.
    pub fn starts_with(&self, prefix: &NormalizedPath) -> bool {
        self.rooted == prefix.rooted
            && self.parent_levels == prefix.parent_levels
            && self.segments.len() >= prefix.segments.len()
            && self.segments.iter().zip(&prefix.segments).all(|(a, b)| a == b)
    }

    /// Strips a whole-segment prefix, returning the relative remainder.
    ///
    /// `a/b` is a prefix of `a/b/c` but not of `a/bc`.
    pub fn strip_prefix(&self, prefix: &NormalizedPath) -> Option<NormalizedPath> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Self::from_parts(
            self.segments[prefix.segments.len()..].to_vec(),
            0,
        ))
    }

    /// Returns the containing directory, or `None` when there are no segments.
    pub fn parent(&self) -> Option<NormalizedPath> {
        if self.segments.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    /// Returns the last segment.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The segments joined by `/`, without root marker or `../` prefix.
    ///
    /// Archive tables and the mount trie key entries this way.
    pub fn relative_key(&self) -> String {
        self.segments.join("/")
    }

    /// Resolves the path to a host path, relative paths against `base`.
    pub fn to_host_path(&self, base: Option<&Path>) -> PathBuf {
        let rendered = self.to_string();
        if self.is_full() {
            return PathBuf::from(rendered);
        }
        match base {
            Some(base) if rendered.is_empty() => base.to_path_buf(),
            Some(base) => base.join(rendered),
            None if rendered.is_empty() => PathBuf::from("."),
            None => PathBuf::from(rendered),
        }
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rooted {
            f.write_str("/")?;
        }
        for _ in 0..self.parent_levels {
            f.write_str("../")?;
        }
        f.write_str(&self.segments.join("/"))
    }
}

impl From<&str> for NormalizedPath {
    fn from(s: &str) -> Self {
        NormalizedPath::new(s)
    }
}

impl From<String> for NormalizedPath {
    fn from(s: String) -> Self {
        NormalizedPath::new(&s)
    }
}

impl From<&Path> for NormalizedPath {
    fn from(path: &Path) -> Self {
        NormalizedPath::new(&path.to_string_lossy())
    }
}

fn is_drive_segment(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Normalizes a path string, see [`NormalizedPath::new`].
pub fn normalize(path: &str) -> String {
    NormalizedPath::new(path).to_string()
}

/// Returns everything before the last separator, or `""` at the top level.
pub fn parent_of(path: &str) -> String {
    match path.rfind(['/', '\\']) {
        Some(index) => path[..index].to_string(),
        None => String::new(),
    }
}

/// Returns everything after the last separator.
pub fn base_name(path: &str) -> String {
    match path.rfind(['/', '\\']) {
        Some(index) => path[index + 1..].to_string(),
        None => path.to_string(),
    }
}

/// Returns true for host-absolute paths: a leading separator or a drive letter.
pub fn is_full_path(path: &str) -> bool {
    if path.starts_with(['/', '\\']) {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Prefixes `cwd` unless the path is already full, then normalizes.
pub fn make_full_path(path: &str, cwd: &str) -> String {
    if is_full_path(path) {
        normalize(path)
    } else {
        NormalizedPath::new(cwd).join_str(path).to_string()
    }
}

/// Expresses `path` relative to `cwd`.
///
/// The longest common segment prefix is removed and each remaining segment of
/// `cwd` becomes a `..`. Paths on a different root or drive are returned in
/// full form since no relative form exists.
pub fn make_relative_path(path: &str, cwd: &str) -> String {
    let full = NormalizedPath::new(&make_full_path(path, cwd));
    let base = NormalizedPath::new(cwd);

    if full.rooted != base.rooted || full.parent_levels != base.parent_levels {
        return full.to_string();
    }

    let first_differs = match (full.segments.first(), base.segments.first()) {
        (Some(a), Some(b)) => is_drive_segment(a) && is_drive_segment(b) && !a.eq_ignore_ascii_case(b),
        _ => false,
    };
    if first_differs {
        return full.to_string();
    }

    let common = full
        .segments
        .iter()
        .zip(&base.segments)
        .take_while(|(a, b)| a == b)
        .count();

    NormalizedPath::from_parts(
        full.segments[common..].to_vec(),
        base.segments.len() - common,
    )
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_dot_segments() {
        assert_eq!(normalize("a/./b/../c"), "a/c");
        assert_eq!(normalize("./a/b/."), "a/b");
        assert_eq!(normalize("a//b///c"), "a/b/c");
    }

    #[test]
    fn test_normalize_climbs_above_start() {
        assert_eq!(normalize("../a"), "../a");
        assert_eq!(normalize("a/../../b"), "../b");
        assert_eq!(normalize("../../x/y/../z"), "../../x/z");
        assert_eq!(normalize(".."), "../");

        let path = NormalizedPath::new("a/../../../b");
        assert_eq!(path.parent_levels(), 2);
        assert_eq!(path.segments(), &["b".to_string()]);
    }

    #[test]
    fn test_normalize_separators_and_root() {
        assert_eq!(normalize("a\\b/c\\d"), "a/b/c/d");
        assert_eq!(normalize("/usr/./lib/../share"), "/usr/share");
        assert_eq!(normalize("\\data\\x"), "/data/x");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_normalize_preserves_case() {
        assert_eq!(normalize("Data/Textures/../Sounds/Boom.WAV"), "Data/Sounds/Boom.WAV");
    }

    #[test]
    fn test_parent_and_base_name() {
        assert_eq!(parent_of("a/b/c.txt"), "a/b");
        assert_eq!(parent_of("c.txt"), "");
        assert_eq!(parent_of("a\\b"), "a");
        assert_eq!(base_name("a/b/c.txt"), "c.txt");
        assert_eq!(base_name("c.txt"), "c.txt");
        assert_eq!(base_name("dir/"), "");
    }

    #[test]
    fn test_is_full_path() {
        assert!(is_full_path("/etc/hosts"));
        assert!(is_full_path("\\share"));
        assert!(is_full_path("C:/Games"));
        assert!(is_full_path("d:\\x"));
        assert!(!is_full_path("assets/x.png"));
        assert!(!is_full_path("1:/x"));
        assert!(!is_full_path(""));
    }

    #[test]
    fn test_make_full_path() {
        assert_eq!(make_full_path("assets/x.png", "/home/kiri/game"), "/home/kiri/game/assets/x.png");
        assert_eq!(make_full_path("../x.png", "/home/kiri/game"), "/home/kiri/x.png");
        assert_eq!(make_full_path("/tmp/./y", "/home/kiri"), "/tmp/y");
        assert_eq!(make_full_path("C:\\a\\b", "/home"), "C:/a/b");
    }

    #[test]
    fn test_make_relative_path() {
        assert_eq!(make_relative_path("/home/kiri/game/assets/x.png", "/home/kiri/game"), "assets/x.png");
        assert_eq!(make_relative_path("/home/kiri/other/y", "/home/kiri/game"), "../other/y");
        assert_eq!(make_relative_path("/etc/hosts", "/home/kiri"), "../../etc/hosts");
        assert_eq!(make_relative_path("/home/kiri", "/home/kiri"), "");
        assert_eq!(make_relative_path("sub/file", "/home/kiri"), "sub/file");
        assert_eq!(make_relative_path("D:/x", "C:/y"), "D:/x");
    }

    #[test]
    fn test_strip_prefix_whole_segments() {
        let path = NormalizedPath::new("a/b/c");
        assert_eq!(path.strip_prefix(&"a/b".into()), Some(NormalizedPath::new("c")));
        assert_eq!(path.strip_prefix(&"a/b/c".into()), Some(NormalizedPath::default()));
        assert_eq!(path.strip_prefix(&"".into()), Some(NormalizedPath::new("a/b/c")));
        assert!(NormalizedPath::new("a/bc").strip_prefix(&"a/b".into()).is_none());
        assert!(NormalizedPath::new("/a/b").strip_prefix(&"a".into()).is_none());
    }

    #[test]
    fn test_join_resolves_parent_levels() {
        let base = NormalizedPath::new("/srv/data");
        assert_eq!(base.join_str("../logs/x").to_string(), "/srv/logs/x");
        assert_eq!(NormalizedPath::new("a").join_str("../../b").to_string(), "../b");
    }

    #[test]
    fn test_parent_and_file_name() {
        let path = NormalizedPath::new("/a/b/c.txt");
        assert_eq!(path.file_name(), Some("c.txt"));
        assert_eq!(path.parent().unwrap().to_string(), "/a/b");
        assert!(NormalizedPath::new("/").parent().is_none());
        assert_eq!(path.relative_key(), "a/b/c.txt");
    }

    #[test]
    fn test_to_host_path() {
        let base = Path::new("/var/game");
        assert_eq!(NormalizedPath::new("x/y").to_host_path(Some(base)), PathBuf::from("/var/game/x/y"));
        assert_eq!(NormalizedPath::new("/abs").to_host_path(Some(base)), PathBuf::from("/abs"));
        assert_eq!(NormalizedPath::new("").to_host_path(Some(base)), PathBuf::from("/var/game"));
        assert_eq!(NormalizedPath::new("").to_host_path(None), PathBuf::from("."));
    }
}
