use crate::types::EntryKind;

/// Represents a single entry in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// The name of the file or directory
    pub name: String,
    /// Whether this is a file or a directory
    pub kind: EntryKind,
}

impl DirectoryEntry {
    /// Creates a new DirectoryEntry.
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Returns the name of the entry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if this entry is a directory.
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// Returns true if this entry is a file.
    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File)
    }

    /// Sorts a vector of directory entries by name (case-insensitive).
    pub fn sort_by_name(entries: &mut [DirectoryEntry]) {
        entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    }

    /// Sorts directories before files, keeping the existing order within each group.
    pub fn sort_by_type(entries: &mut [DirectoryEntry]) {
        entries.sort_by_key(|entry| match entry.kind {
            EntryKind::Directory => 0,
            EntryKind::File => 1,
        });
    }

    /// Filters entries to only include directories.
    pub fn filter_directories(entries: Vec<DirectoryEntry>) -> Vec<DirectoryEntry> {
        entries.into_iter().filter(|e| e.is_directory()).collect()
    }

    /// Filters entries to only include files.
    pub fn filter_files(entries: Vec<DirectoryEntry>) -> Vec<DirectoryEntry> {
        entries.into_iter().filter(|e| e.is_file()).collect()
    }
}

/// Keeps the names whose extension is in `extensions`.
///
/// `extensions` is a comma or space separated list without dots, for example
/// `"png, jpg tga"`. Matching ignores ASCII case. Input order is preserved and
/// consecutive duplicate names are collapsed.
pub fn filter_by_extension<S: AsRef<str>>(extensions: &str, names: &[S]) -> Vec<String> {
    let wanted: Vec<String> = extensions
        .split([',', ' '])
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut kept: Vec<String> = Vec::new();
    for name in names {
        let name = name.as_ref();
        let Some((_, ext)) = name.rsplit_once('.') else {
            continue;
        };
        if !wanted.iter().any(|w| w.eq_ignore_ascii_case(ext)) {
            continue;
        }
        if kept.last().map(String::as_str) != Some(name) {
            kept.push(name.to_string());
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<DirectoryEntry> {
        vec![
            DirectoryEntry::new("b.txt", EntryKind::File),
            DirectoryEntry::new("A.png", EntryKind::File),
            DirectoryEntry::new("dir", EntryKind::Directory),
        ]
    }

    #[test]
    fn test_directory_entry() {
        let entry = DirectoryEntry::new("test.txt", EntryKind::File);
        assert_eq!(entry.name(), "test.txt");
        assert!(entry.is_file());
        assert!(!entry.is_directory());
    }

    #[test]
    fn test_directory_entry_sorting() {
        let mut sorted = sample();
        DirectoryEntry::sort_by_name(&mut sorted);
        assert_eq!(sorted[0].name(), "A.png");
        assert_eq!(sorted[1].name(), "b.txt");
        assert_eq!(sorted[2].name(), "dir");

        let mut sorted = sample();
        DirectoryEntry::sort_by_type(&mut sorted);
        assert_eq!(sorted[0].name(), "dir");
        assert_eq!(sorted[1].name(), "b.txt");
    }

    #[test]
    fn test_directory_entry_filtering() {
        let dirs = DirectoryEntry::filter_directories(sample());
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].name(), "dir");

        let files = DirectoryEntry::filter_files(sample());
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_filter_by_extension() {
        let names = ["a.png", "b.PNG", "b.PNG", "c.jpg", "notes", "d.tga", "a.png"];
        let kept = filter_by_extension("png, tga", &names);
        assert_eq!(kept, vec!["a.png", "b.PNG", "d.tga", "a.png"]);

        assert!(filter_by_extension("", &names).is_empty());
        assert_eq!(filter_by_extension(".JPG", &names), vec!["c.jpg"]);
    }
}
