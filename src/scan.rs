//! Source file discovery
//!
//! Walks a directory for files with the requested extensions, so they can
//! be added to a project or compared against the files it already knows.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::model::Document;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Cannot read {0}: {1}")]
    Walk(PathBuf, String),
}

/// Directory scanner for project source files.
pub struct Scanner {
    extensions: Vec<String>,
    ignore_names: Vec<String>,
}

impl Scanner {
    /// A scanner for the given extensions (without dots, any case).
    ///
    /// Skips version-control and editor metadata, build products, and
    /// bundles the IDE treats as opaque (`.xcodeproj`, `.xcassets`).
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            ignore_names: vec![
                ".git".to_string(),
                ".svn".to_string(),
                ".build".to_string(),
                "build".to_string(),
                "DerivedData".to_string(),
                "Pods".to_string(),
                ".DS_Store".to_string(),
            ],
        }
    }

    /// Files under `root` with a matching extension, as paths relative to
    /// `root` using `/`, sorted.
    pub fn scan(&self, root: &Path) -> Result<Vec<String>, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || self.should_descend(e));

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                ScanError::Walk(path, e.to_string())
            })?;
            if !entry.file_type().is_file() || !self.matches(entry.path()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else { continue };
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            files.push(parts.join("/"));
        }

        tracing::debug!(root = %root.display(), found = files.len(), "scan complete");
        Ok(files)
    }

    fn should_descend(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if self.ignore_names.iter().any(|n| *n == name) {
            return false;
        }
        let bundle = [".xcodeproj", ".xcworkspace", ".xcassets", ".framework"]
            .iter()
            .any(|suffix| name.ends_with(suffix));
        !(entry.file_type().is_dir() && bundle)
    }

    fn matches(&self, path: &Path) -> bool {
        let Some(ext) = path.extension() else { return false };
        let ext = ext.to_string_lossy().to_ascii_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }
}

/// Files from `found` that no file reference in `doc` points at.
///
/// A file counts as referenced when its relative path matches a
/// reference's resolved path, or its raw `path`.
pub fn missing_files(doc: &Document, found: &[String]) -> Vec<String> {
    let mut known: HashSet<&str> = HashSet::new();
    for (id, file) in doc.file_references() {
        known.insert(&file.path);
        known.extend(doc.resolved_path(id));
    }
    found.iter().filter(|f| !known.contains(f.as_str())).cloned().collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::model::ObjectId;
    use crate::parser::parse;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn scan_filters_by_extension_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Core/Camera.swift");
        touch(dir.path(), "App.swift");
        touch(dir.path(), "Shaders/Blur.METAL");
        touch(dir.path(), "README.md");
        let files = Scanner::new(&["swift", ".metal"]).scan(dir.path()).unwrap();
        assert_eq!(files, vec!["App.swift", "Core/Camera.swift", "Shaders/Blur.METAL"]);
    }

    #[test]
    fn scan_skips_metadata_and_bundles() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), ".git/hooks/x.swift");
        touch(dir.path(), "build/Gen.swift");
        touch(dir.path(), "Demo.xcodeproj/Fake.swift");
        touch(dir.path(), "Kept.swift");
        let files = Scanner::new(&["swift"]).scan(dir.path()).unwrap();
        assert_eq!(files, vec!["Kept.swift"]);
    }

    #[test]
    fn scan_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Scanner::new(&["swift"]).scan(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ScanError::PathNotFound(_)));
    }

    const NESTED: &str = "{
\tobjects = {
/* Begin PBXFileReference section */
\t\tF00000000000000000000001 /* Camera.swift */ = {isa = PBXFileReference; path = Camera.swift; sourceTree = \"<group>\"; };
\t\tF00000000000000000000002 /* App.swift */ = {isa = PBXFileReference; path = App.swift; sourceTree = \"<group>\"; };
/* End PBXFileReference section */
/* Begin PBXGroup section */
\t\tD00000000000000000000001 = {isa = PBXGroup; children = (F00000000000000000000002, D00000000000000000000002, ); sourceTree = \"<group>\"; };
\t\tD00000000000000000000002 /* Core */ = {isa = PBXGroup; children = (F00000000000000000000001, ); path = Core; sourceTree = \"<group>\"; };
/* End PBXGroup section */
/* Begin PBXProject section */
\t\tC00000000000000000000000 = {isa = PBXProject; mainGroup = D00000000000000000000001; };
/* End PBXProject section */
\t};
}
";

    #[test]
    fn resolved_path_follows_group_paths() {
        let doc = parse(NESTED).unwrap();
        let path = doc.resolved_path(&ObjectId::from("F00000000000000000000001"));
        assert_eq!(path, Some("Core/Camera.swift"));
        let path = doc.resolved_path(&ObjectId::from("F00000000000000000000002"));
        assert_eq!(path, Some("App.swift"));
    }

    #[test]
    fn missing_files_compares_resolved_paths() {
        let doc = parse(NESTED).unwrap();
        let found = vec![
            "App.swift".to_string(),
            "Core/Camera.swift".to_string(),
            "Core/Lens.swift".to_string(),
            "Camera.swift".to_string(),
        ];
        // the bare `Camera.swift` still matches the reference's raw path
        assert_eq!(missing_files(&doc, &found), vec!["Core/Lens.swift"]);
    }
}
