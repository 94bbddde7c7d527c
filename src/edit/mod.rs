use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("no record with id {id} (expected a {expected})")]
    DanglingReference { id: ObjectId, expected: &'static str },

    #[error("record {id} is a {found}, expected a {expected}")]
    WrongKind {
        id: ObjectId,
        expected: &'static str,
        found: &'static str,
    },

    #[error("build file {build_file} links into {link_bucket}, but phase {phase} holds {phase_bucket}")]
    BucketMismatch {
        build_file: ObjectId,
        link_bucket: Bucket,
        phase: ObjectId,
        phase_bucket: Bucket,
    },

    #[error("placing {child} inside group {group} would make the group tree cyclic")]
    Cycle { group: ObjectId, child: ObjectId },

    #[error("could not allocate a fresh identifier")]
    IdSpaceExhausted,

    #[error("target '{target}' has no {bucket} phase")]
    MissingPhase { target: String, bucket: Bucket },

    #[error("the project has no main group")]
    MissingRootGroup,

    #[error("no target named '{0}'")]
    UnknownTarget(String),

    #[error("moving {record} would point it at '{path}', which {existing} already references")]
    PathConflict {
        record: ObjectId,
        path: String,
        existing: ObjectId,
    },
}

impl EditError {
    pub fn code(&self) -> &'static str {
        match self {
            EditError::DanglingReference { .. } => "PBX-E001",
            EditError::WrongKind { .. } => "PBX-E002",
            EditError::BucketMismatch { .. } => "PBX-E003",
            EditError::Cycle { .. } => "PBX-E004",
            EditError::IdSpaceExhausted => "PBX-E005",
            EditError::MissingPhase { .. } => "PBX-E006",
            EditError::MissingRootGroup => "PBX-E007",
            EditError::UnknownTarget(_) => "PBX-E008",
            EditError::PathConflict { .. } => "PBX-E009",
        }
    }
}

type Result<T> = std::result::Result<T, EditError>;

/// Something an operation noticed but did not treat as a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub code: &'static str,
    pub id: ObjectId,
    pub message: String,
}

/// Result of a composite add.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Added {
    pub file_ref: ObjectId,
    pub build_file: ObjectId,
    /// False when every step found its entry already in place.
    pub changed: bool,
}

/// One editing session over a document.
///
/// Every operation checks all of its preconditions before touching the
/// document, so a failed call leaves it as it was. Every `ensure_*` call is
/// idempotent.
pub struct Editor<'d> {
    doc: &'d mut Document,
    ids: IdAllocator,
    /// Identifiers set aside by [`Editor::reserve`], handed out first.
    pending: VecDeque<ObjectId>,
    warnings: Vec<Warning>,
    changes: usize,
}

impl<'d> Editor<'d> {
    pub fn new(doc: &'d mut Document) -> Self {
        Self::with_rng(doc, fastrand::Rng::new())
    }

    /// An editor whose identifier salt comes from `rng`; used for
    /// reproducible output.
    pub fn with_rng(doc: &'d mut Document, rng: fastrand::Rng) -> Self {
        let ids = IdAllocator::seeded_from(doc.ids(), rng);
        Editor {
            doc,
            ids,
            pending: VecDeque::new(),
            warnings: Vec::new(),
            changes: 0,
        }
    }

    pub fn document(&self) -> &Document {
        self.doc
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Number of mutations applied so far in this session.
    pub fn changes(&self) -> usize {
        self.changes
    }

    fn allocate(&mut self) -> Result<ObjectId> {
        while let Some(id) = self.pending.pop_front() {
            if !self.doc.is_taken(&id) {
                return Ok(id);
            }
        }
        self.draw()
    }

    fn draw(&mut self) -> Result<ObjectId> {
        let (doc, pending) = (&*self.doc, &self.pending);
        let id = self
            .ids
            .allocate(|id| doc.is_taken(id) || pending.contains(id))
            .ok_or(EditError::IdSpaceExhausted)?;
        tracing::debug!(%id, "allocated identifier");
        Ok(id)
    }

    /// Sets aside `count` fresh identifiers, so a composite edit that
    /// passed its checks cannot run out of them halfway.
    pub fn reserve(&mut self, count: usize) -> Result<()> {
        while self.pending.len() < count {
            let id = self.draw()?;
            self.pending.push_back(id);
        }
        Ok(())
    }

    fn insert(&mut self, record: Record) {
        self.doc.insert_record(record);
        self.changes += 1;
    }

    fn expect_record(&self, id: &ObjectId, expected: &'static str) -> Result<&Record> {
        self.doc.record(id).ok_or_else(|| EditError::DanglingReference {
            id: id.clone(),
            expected,
        })
    }

    fn expect_group(&self, id: &ObjectId) -> Result<&Group> {
        let record = self.expect_record(id, "group")?;
        record.as_group().ok_or_else(|| EditError::WrongKind {
            id: id.clone(),
            expected: "group",
            found: record.kind.describe(),
        })
    }

    // ---- File references ----

    /// Returns the file reference for the project-relative `path`, creating
    /// it when missing. The new record is not placed in any group.
    pub fn ensure_file_reference(&mut self, path: &str, display_name: &str) -> Result<ObjectId> {
        self.ensure_file_reference_with(FileReference::source(path, display_name))
    }

    /// Like [`Editor::ensure_file_reference`] for a fully described file.
    pub fn ensure_file_reference_with(&mut self, file: FileReference) -> Result<ObjectId> {
        self.ensure_file_reference_in(None, file)
    }

    /// Looks `file` up as if it sat in `group`, so equal names in folders
    /// with different paths stay different files.
    fn ensure_file_reference_in(&mut self, group: Option<&ObjectId>, file: FileReference) -> Result<ObjectId> {
        if let Some(existing) = self.doc.find_file_at(group, &file).cloned() {
            let current = self
                .doc
                .record(&existing)
                .and_then(Record::as_file_reference)
                .map(|f| f.display_name.as_str());
            if let Some(current) = current.filter(|name| *name != file.display_name) {
                let message = format!(
                    "'{}' is already referenced as '{}'; keeping that name instead of '{}'",
                    file.path, current, file.display_name
                );
                tracing::warn!(id = %existing, "{message}");
                self.warnings.push(Warning {
                    code: "PBX-W001",
                    id: existing.clone(),
                    message,
                });
            }
            return Ok(existing);
        }

        let id = self.allocate()?;
        tracing::debug!(%id, path = %file.path, "new file reference");
        let annotation = Some(file.display_name.clone());
        self.insert(Record::new(id.clone(), annotation, RecordKind::FileReference(file)));
        Ok(id)
    }

    // ---- Build files ----

    /// Returns the link of `file_ref` into `bucket`, creating it when missing.
    pub fn ensure_build_file(&mut self, file_ref: &ObjectId, bucket: Bucket) -> Result<ObjectId> {
        let record = self.expect_record(file_ref, "file reference")?;
        let Some(file) = record.as_file_reference() else {
            return Err(EditError::WrongKind {
                id: file_ref.clone(),
                expected: "file reference",
                found: record.kind.describe(),
            });
        };
        if let Some(existing) = self.doc.find_build_file(file_ref, bucket) {
            return Ok(existing.clone());
        }
        let name = record.annotation.clone().unwrap_or_else(|| file.display_name.clone());
        let annotation = format!("{name} in {}", bucket.title());

        let id = self.allocate()?;
        tracing::debug!(%id, file_ref = %file_ref, %bucket, "new build file");
        let link = BuildFile {
            file_ref: file_ref.clone(),
            bucket,
        };
        self.insert(Record::new(id.clone(), Some(annotation), RecordKind::BuildFile(link)));
        Ok(id)
    }

    // ---- Phases ----

    /// Appends `build_file` to the end of `phase` unless it is already there.
    /// Returns whether the phase changed.
    pub fn ensure_phase_membership(&mut self, phase: &ObjectId, build_file: &ObjectId) -> Result<bool> {
        let phase_record = self.expect_record(phase, "build phase")?;
        let Some(phase_data) = phase_record.as_build_phase() else {
            return Err(EditError::WrongKind {
                id: phase.clone(),
                expected: "build phase",
                found: phase_record.kind.describe(),
            });
        };
        let link_record = self.expect_record(build_file, "build file")?;
        let Some(link) = link_record.as_build_file() else {
            return Err(EditError::WrongKind {
                id: build_file.clone(),
                expected: "build file",
                found: link_record.kind.describe(),
            });
        };
        if link.bucket != phase_data.bucket {
            return Err(EditError::BucketMismatch {
                build_file: build_file.clone(),
                link_bucket: link.bucket,
                phase: phase.clone(),
                phase_bucket: phase_data.bucket,
            });
        }
        if phase_data.files.contains(build_file) {
            return Ok(false);
        }

        if let Some(files) = self.doc.record_mut(phase).and_then(Record::members_mut) {
            files.push(build_file.clone());
        }
        self.changes += 1;
        Ok(true)
    }

    /// The `bucket` phase of the named target, or of the first target when
    /// no name is given. Falls back to the first phase of that kind in the
    /// document when it declares no targets.
    pub fn resolve_phase(&self, target: Option<&str>, bucket: Bucket) -> Result<ObjectId> {
        let targets = self.doc.targets();
        let chosen = match target {
            Some(name) => Some(
                targets
                    .iter()
                    .find(|t| t.name == name)
                    .ok_or_else(|| EditError::UnknownTarget(name.to_string()))?,
            ),
            None => targets.first(),
        };
        let missing = |target: &str| EditError::MissingPhase {
            target: target.to_string(),
            bucket,
        };
        match chosen {
            Some(t) => t
                .build_phases
                .iter()
                .find(|id| {
                    self.doc
                        .record(id)
                        .and_then(Record::as_build_phase)
                        .is_some_and(|p| p.bucket == bucket)
                })
                .cloned()
                .ok_or_else(|| missing(&t.name)),
            None => self.doc.phases(bucket).into_iter().next().ok_or_else(|| missing("<none>")),
        }
    }

    // ---- Groups ----

    /// Makes `record` a child of `group`, appended at the end, and removes
    /// it from any other group. Returns whether anything changed.
    pub fn ensure_group_membership(&mut self, group: &ObjectId, record: &ObjectId) -> Result<bool> {
        let target = self.expect_group(group)?;
        let child = self.expect_record(record, "file reference or group")?;
        match &child.kind {
            RecordKind::FileReference(_) => {}
            RecordKind::Group(_) => {
                if group == record || self.is_descendant(group, record) {
                    return Err(EditError::Cycle {
                        group: group.clone(),
                        child: record.clone(),
                    });
                }
            }
            other => {
                return Err(EditError::WrongKind {
                    id: record.clone(),
                    expected: "file reference or group",
                    found: other.describe(),
                });
            }
        }

        let already_child = target.children.contains(record);
        let other_parents: Vec<ObjectId> = self
            .doc
            .parents_of(record)
            .filter(|parent| *parent != group)
            .cloned()
            .collect();
        if already_child && other_parents.is_empty() {
            return Ok(false);
        }

        let moved = self.locations_under(group, record);
        for (id, key) in &moved {
            let Some(holder) = self.doc.find_file_reference(key) else { continue };
            if holder != id && !moved.iter().any(|(m, _)| m == holder) {
                return Err(EditError::PathConflict {
                    record: id.clone(),
                    path: key.clone(),
                    existing: holder.clone(),
                });
            }
        }

        for parent in &other_parents {
            tracing::debug!(%record, from = %parent, to = %group, "moving between groups");
            if let Some(children) = self.doc.record_mut(parent).and_then(Record::members_mut) {
                children.retain(|c| c != record);
            }
        }
        if !already_child {
            if let Some(children) = self.doc.record_mut(group).and_then(Record::members_mut) {
                children.push(record.clone());
            }
        }
        for (id, key) in moved {
            self.doc.relocate(&id, key);
        }
        self.changes += 1;
        Ok(true)
    }

    /// Locations of every file reference at or below `record` once it is
    /// a child of `group`.
    fn locations_under(&self, group: &ObjectId, record: &ObjectId) -> Vec<(ObjectId, String)> {
        let mut located = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(record, self.doc.group_path(group))];
        while let Some((id, prefix)) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            match self.doc.record(id).map(|r| &r.kind) {
                Some(RecordKind::FileReference(file)) => located.push((id.clone(), location_key(&prefix, file))),
                Some(RecordKind::Group(g)) => {
                    let mut inner = prefix.clone();
                    inner.extend(g.path.as_deref());
                    stack.extend(g.children.iter().map(|child| (child, inner.clone())));
                }
                _ => {}
            }
        }
        located
    }

    /// Whether `id` sits anywhere below group `ancestor`.
    fn is_descendant(&self, id: &ObjectId, ancestor: &ObjectId) -> bool {
        let mut stack = vec![ancestor.clone()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(group) = self.doc.record(&current).and_then(Record::as_group) else {
                continue;
            };
            for child in &group.children {
                if child == id {
                    return true;
                }
                stack.push(child.clone());
            }
        }
        false
    }

    /// Walks `segments` down from `parent` by group name, creating each
    /// missing group with a matching `path`. Returns the last group.
    pub fn ensure_group_path(&mut self, parent: &ObjectId, segments: &[&str]) -> Result<ObjectId> {
        self.expect_group(parent)?;
        self.reserve(segments.len())?;
        let mut current = parent.clone();
        for segment in segments {
            current = self.ensure_child_group(&current, segment, Some(segment))?;
        }
        Ok(current)
    }

    fn ensure_child_group(&mut self, parent: &ObjectId, name: &str, path: Option<&str>) -> Result<ObjectId> {
        if let Some(existing) = self.doc.child_group(parent, name) {
            return Ok(existing.clone());
        }
        let id = self.allocate()?;
        tracing::debug!(%id, name, parent = %parent, "new group");
        self.insert(Record::new(
            id.clone(),
            Some(name.to_string()),
            RecordKind::Group(Group::new(name, path)),
        ));
        self.ensure_group_membership(parent, &id)?;
        Ok(id)
    }

    // ---- Composite operations ----

    /// Registers a file as a build input: reference, link, phase member and
    /// group child, in that order, so a retry after a failure is safe.
    pub fn add_source_file(
        &mut self,
        path: &str,
        display_name: &str,
        group: &ObjectId,
        phase: &ObjectId,
        bucket: Bucket,
    ) -> Result<Added> {
        self.add_file(FileReference::source(path, display_name), group, phase, bucket)
    }

    /// Links a system framework such as `Metal.framework` into `phase` and
    /// files it under the main group's `Frameworks` group.
    pub fn add_framework(&mut self, name: &str, phase: &ObjectId) -> Result<Added> {
        let root = self.doc.root_group().ok_or(EditError::MissingRootGroup)?;
        self.expect_phase(phase, Bucket::Frameworks)?;
        self.reserve(3)?;
        let group = self.ensure_child_group(&root, "Frameworks", None)?;
        self.add_file(FileReference::framework(name), &group, phase, Bucket::Frameworks)
    }

    /// `phase` is a build phase holding `bucket` links.
    fn expect_phase(&self, phase: &ObjectId, bucket: Bucket) -> Result<()> {
        let record = self.expect_record(phase, "build phase")?;
        match record.as_build_phase() {
            Some(p) if p.bucket != bucket => Err(EditError::MissingPhase {
                target: phase.to_string(),
                bucket,
            }),
            Some(_) => Ok(()),
            None => Err(EditError::WrongKind {
                id: phase.clone(),
                expected: "build phase",
                found: record.kind.describe(),
            }),
        }
    }

    fn add_file(&mut self, file: FileReference, group: &ObjectId, phase: &ObjectId, bucket: Bucket) -> Result<Added> {
        // fail before creating anything when the targets are wrong
        self.expect_group(group)?;
        self.expect_phase(phase, bucket)?;
        self.reserve(2)?;

        let before = self.changes;
        let path = file.path.clone();
        let file_ref = self.ensure_file_reference_in(Some(group), file)?;
        let build_file = self.ensure_build_file(&file_ref, bucket)?;
        self.ensure_phase_membership(phase, &build_file)?;
        let in_place = self
            .doc
            .record(&file_ref)
            .and_then(Record::as_file_reference)
            .is_some_and(|f| f.path == path);
        if in_place {
            self.ensure_group_membership(group, &file_ref)?;
        } else {
            // found through a group with another path; moving it would
            // make it point at a different file
            tracing::debug!(%file_ref, %path, "already referenced from another group");
        }
        let changed = self.changes != before;
        if changed {
            tracing::info!(%path, %file_ref, %build_file, "added");
        }
        Ok(Added {
            file_ref,
            build_file,
            changed,
        })
    }
}
