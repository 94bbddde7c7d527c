use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::edit::{EditError, Editor};
use crate::model::{Bucket, ObjectId};
use crate::report::{AddedFile, Failure, Report};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("cannot read plan {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid plan: {0}")]
    Json(#[from] serde_json::Error),
}

/// One file to register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRequest {
    pub path: String,
    /// Display name; the last path component when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `/`-separated group names below the main group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default = "default_bucket")]
    pub bucket: Bucket,
}

fn default_bucket() -> Bucket {
    Bucket::Sources
}

impl FileRequest {
    pub fn new(path: impl Into<String>) -> Self {
        FileRequest {
            path: path.into(),
            name: None,
            group: None,
            bucket: Bucket::Sources,
        }
    }

    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) => name,
            None => self.path.rsplit('/').next().unwrap_or(&self.path),
        }
    }

    /// A file found by a directory scan at `relative` (below the scan
    /// root), filed in the group mirroring its folder under `base_group`.
    pub fn scanned(relative: &str, base_group: Option<&str>) -> Self {
        let (folder, file) = match relative.rsplit_once('/') {
            Some((folder, file)) => (Some(folder), file),
            None => (None, relative),
        };
        let base = base_group.map(|g| g.trim_matches('/')).filter(|g| !g.is_empty());
        let group = match (base, folder) {
            (Some(base), Some(folder)) => Some(format!("{base}/{folder}")),
            (Some(base), None) => Some(base.to_string()),
            (None, folder) => folder.map(str::to_string),
        };
        FileRequest {
            group,
            ..FileRequest::new(file)
        }
    }

    fn group_segments(&self) -> Vec<&str> {
        self.group
            .as_deref()
            .map(|g| g.split('/').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// A batch of file requests, applied in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub files: Vec<FileRequest>,
}

impl Plan {
    pub fn from_json(text: &str) -> Result<Plan, PlanError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Plan, PlanError> {
        let text = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Plan::from_json(&text)
    }

    /// Applies every request through `editor`. A failed request is
    /// recorded and the rest still run.
    pub fn apply(&self, editor: &mut Editor<'_>, target: Option<&str>) -> Report {
        let mut report = Report::default();
        for request in &self.files {
            match apply_one(editor, request, target) {
                Ok(Some(added)) => report.added.push(added),
                Ok(None) => report.already_present.push(request.path.clone()),
                Err(err) => {
                    tracing::warn!(path = %request.path, code = err.code(), "{err}");
                    report.errors.push(Failure::new(&request.path, &err));
                }
            }
        }
        report.warnings = editor.take_warnings();
        report
    }
}

/// Runs one request. Every lookup that can fail happens before the first
/// group is created, so a failed request leaves the document as it was.
fn apply_one(editor: &mut Editor<'_>, request: &FileRequest, target: Option<&str>) -> Result<Option<AddedFile>, EditError> {
    let before = editor.changes();
    let root: ObjectId = editor.document().root_group().ok_or(EditError::MissingRootGroup)?;
    let phase = editor.resolve_phase(target, request.bucket)?;
    let segments = request.group_segments();
    editor.reserve(segments.len() + 2)?;
    let group = editor.ensure_group_path(&root, &segments)?;
    let added = editor.add_source_file(&request.path, request.display_name(), &group, &phase, request.bucket)?;
    if editor.changes() == before {
        return Ok(None);
    }
    Ok(Some(AddedFile {
        path: request.path.clone(),
        bucket: request.bucket,
        file_ref: added.file_ref,
        build_file: added.build_file,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::serializer::serialize;

    const FIXTURE: &str = include_str!("../tests/fixtures/minimal.pbxproj");

    #[test]
    fn defaults_fill_missing_fields() {
        let plan = Plan::from_json(r#"{"files": [{"path": "Core/Camera.swift"}]}"#).unwrap();
        let request = &plan.files[0];
        assert_eq!(request.display_name(), "Camera.swift");
        assert_eq!(request.bucket, Bucket::Sources);
        assert!(request.group_segments().is_empty());
    }

    #[test]
    fn explicit_fields_are_read() {
        let plan = Plan::from_json(
            r#"{"files": [{"path": "a.png", "name": "Logo", "group": "Art//Icons/", "bucket": "resources"}]}"#,
        )
        .unwrap();
        let request = &plan.files[0];
        assert_eq!(request.display_name(), "Logo");
        assert_eq!(request.bucket, Bucket::Resources);
        assert_eq!(request.group_segments(), vec!["Art", "Icons"]);
    }

    #[test]
    fn bad_bucket_is_a_plan_error() {
        let err = Plan::from_json(r#"{"files": [{"path": "a", "bucket": "nope"}]}"#).unwrap_err();
        assert!(matches!(err, PlanError::Json(_)));
    }

    #[test]
    fn missing_plan_file_is_io_error() {
        let err = Plan::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }

    #[test]
    fn apply_reports_each_outcome() {
        let mut doc = parse(FIXTURE).unwrap();
        let mut editor = Editor::with_rng(&mut doc, fastrand::Rng::with_seed(11));
        let plan = Plan {
            files: vec![
                FileRequest {
                    group: Some("Core/Camera".to_string()),
                    ..FileRequest::new("Camera.swift")
                },
                FileRequest::new("AppDelegate.swift"),
                FileRequest {
                    bucket: Bucket::Resources,
                    ..FileRequest::new("Logo.png")
                },
            ],
        };
        let report = plan.apply(&mut editor, None);
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.added[0].path, "Camera.swift");
        assert_eq!(report.already_present, vec!["AppDelegate.swift"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, "PBX-E006");

        let out = serialize(editor.document());
        assert!(out.contains("/* Camera.swift in Sources */"), "got:\n{out}");
        assert!(out.contains("\t\t\tpath = Core;\n"), "got:\n{out}");
        assert!(!out.contains("Logo.png"), "failed request left records behind:\n{out}");
    }

    #[test]
    fn scanned_files_mirror_their_folders() {
        let nested = FileRequest::scanned("Core/Capture/Camera.swift", None);
        assert_eq!(nested.path, "Camera.swift");
        assert_eq!(nested.group.as_deref(), Some("Core/Capture"));
        let based = FileRequest::scanned("Core/Camera.swift", Some("App/"));
        assert_eq!(based.group.as_deref(), Some("App/Core"));
        let top = FileRequest::scanned("Main.swift", Some("App"));
        assert_eq!((top.path.as_str(), top.group.as_deref()), ("Main.swift", Some("App")));
        assert_eq!(FileRequest::scanned("Main.swift", None).group, None);
    }

    #[test]
    fn failed_request_creates_no_groups() {
        let mut doc = parse(FIXTURE).unwrap();
        let before = serialize(&doc);
        let mut editor = Editor::with_rng(&mut doc, fastrand::Rng::with_seed(13));
        let plan = Plan {
            files: vec![FileRequest {
                group: Some("Art/Icons".to_string()),
                bucket: Bucket::Resources,
                ..FileRequest::new("Logo.png")
            }],
        };
        let report = plan.apply(&mut editor, None);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, "PBX-E006");
        assert_eq!(editor.changes(), 0);
        assert_eq!(serialize(editor.document()), before);
    }

    #[test]
    fn same_name_in_two_folders_stays_two_files() {
        let mut doc = parse(FIXTURE).unwrap();
        let mut editor = Editor::with_rng(&mut doc, fastrand::Rng::with_seed(14));
        let plan = Plan {
            files: vec![
                FileRequest {
                    group: Some("Core".to_string()),
                    ..FileRequest::new("Utils.swift")
                },
                FileRequest {
                    group: Some("UI".to_string()),
                    ..FileRequest::new("Utils.swift")
                },
            ],
        };
        let report = plan.apply(&mut editor, None);
        assert_eq!(report.added.len(), 2);
        assert_ne!(report.added[0].file_ref, report.added[1].file_ref);

        let doc = editor.document();
        let root = doc.root_group().unwrap();
        for (folder, added) in [("Core", &report.added[0]), ("UI", &report.added[1])] {
            let group = doc.child_group(&root, folder).unwrap();
            assert_eq!(doc.record(group).unwrap().members().unwrap(), &[added.file_ref.clone()]);
            assert_eq!(doc.resolved_path(&added.file_ref), Some(format!("{folder}/Utils.swift").as_str()));
        }
        assert!(crate::verify::verify(doc).is_ok());
    }

    #[test]
    fn full_path_request_finds_nested_file() {
        let mut doc = parse(FIXTURE).unwrap();
        let mut editor = Editor::with_rng(&mut doc, fastrand::Rng::with_seed(15));
        let nested = Plan {
            files: vec![FileRequest {
                group: Some("Core".to_string()),
                ..FileRequest::new("Camera.swift")
            }],
        };
        assert_eq!(nested.apply(&mut editor, None).added.len(), 1);
        let once = serialize(editor.document());

        let mut reparsed = parse(&once).unwrap();
        let mut editor = Editor::with_rng(&mut reparsed, fastrand::Rng::with_seed(16));
        let rescan = Plan {
            files: vec![
                FileRequest::new("Core/Camera.swift"),
                FileRequest::scanned("Core/Camera.swift", None),
            ],
        };
        let report = rescan.apply(&mut editor, None);
        assert!(report.added.is_empty(), "added {:?}", report.added);
        assert_eq!(report.already_present.len(), 2);
        assert_eq!(serialize(editor.document()), once);
    }

    #[test]
    fn applying_twice_adds_nothing_more() {
        let mut doc = parse(FIXTURE).unwrap();
        let mut editor = Editor::with_rng(&mut doc, fastrand::Rng::with_seed(12));
        let plan = Plan {
            files: vec![FileRequest::new("A.swift"), FileRequest::new("B.metal")],
        };
        let first = plan.apply(&mut editor, Some("Demo"));
        assert_eq!(first.added.len(), 2);
        let once = serialize(editor.document());
        let second = plan.apply(&mut editor, Some("Demo"));
        assert!(second.added.is_empty());
        assert_eq!(second.already_present.len(), 2);
        assert_eq!(serialize(editor.document()), once);
    }
}
