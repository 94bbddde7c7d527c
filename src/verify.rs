use std::collections::{HashMap, HashSet};

use crate::model::*;

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyError {
    pub code: &'static str,
    pub record: ObjectId,
    pub message: String,
    pub hint: Option<String>,
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "verify: {} in '{}'", self.message, self.record)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {hint}")?;
        }
        Ok(())
    }
}

fn closest_match<'a>(name: &str, candidates: impl Iterator<Item = &'a ObjectId>) -> Option<String> {
    let mut best: Option<(String, usize)> = None;
    for candidate in candidates {
        let dist = levenshtein(name, candidate.as_str());
        if dist == 0 || dist > 2 {
            continue;
        }
        let better = best
            .as_ref()
            .is_none_or(|(s, d)| dist < *d || (dist == *d && candidate.as_str() < s.as_str()));
        if better {
            best = Some((candidate.to_string(), dist));
        }
    }
    best.map(|(s, _)| s)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for (i, row) in dp.iter_mut().enumerate().take(m + 1) { row[0] = i; }
    for (j, val) in dp[0].iter_mut().enumerate().take(n + 1) { *val = j; }
    for i in 1..=m {
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[m][n]
}

struct VerifyContext<'d> {
    doc: &'d Document,
    errors: Vec<VerifyError>,
}

impl<'d> VerifyContext<'d> {
    fn new(doc: &'d Document) -> Self {
        Self { doc, errors: Vec::new() }
    }

    fn err(&mut self, code: &'static str, record: &ObjectId, message: String, hint: Option<String>) {
        self.errors.push(VerifyError {
            code,
            record: record.clone(),
            message,
            hint,
        });
    }

    fn missing(&mut self, code: &'static str, owner: &ObjectId, missing: &ObjectId, what: &str) {
        let known = self.doc.records().map(|r| &r.id);
        let hint = closest_match(missing.as_str(), known).map(|s| format!("did you mean '{s}'?"));
        self.err(code, owner, format!("{what} '{missing}' does not exist"), hint);
    }

    /// Every build file points at a file reference.
    fn check_links(&mut self) {
        let doc = self.doc;
        for record in doc.records_in_order() {
            let Some(link) = record.as_build_file() else { continue };
            match doc.record(&link.file_ref) {
                None => self.missing("PBX-V001", &record.id, &link.file_ref, "file reference"),
                Some(target) if target.as_file_reference().is_none() => self.err(
                    "PBX-V001",
                    &record.id,
                    format!("fileRef '{}' is a {}, not a file reference", link.file_ref, target.kind.describe()),
                    None,
                ),
                Some(_) => {}
            }
        }
    }

    /// Phase members are build files of the phase's bucket, each listed
    /// in at most one phase slot.
    fn check_phases(&mut self) {
        let doc = self.doc;
        let mut owner: HashMap<&ObjectId, &ObjectId> = HashMap::new();
        for record in doc.records_in_order() {
            let Some(phase) = record.as_build_phase() else { continue };
            for member in &phase.files {
                match doc.record(member) {
                    None => self.missing("PBX-V002", &record.id, member, "build file"),
                    Some(m) => match m.as_build_file() {
                        // package product links carry productRef instead of fileRef
                        None if m.isa() == "PBXBuildFile" => {}
                        None => self.err(
                            "PBX-V002",
                            &record.id,
                            format!("member '{member}' is a {}, not a build file", m.kind.describe()),
                            None,
                        ),
                        Some(link) if link.bucket != phase.bucket => self.err(
                            "PBX-V002",
                            &record.id,
                            format!("build file '{member}' belongs to {}, phase holds {}", link.bucket, phase.bucket),
                            None,
                        ),
                        Some(_) => {}
                    },
                }
                if let Some(first) = owner.insert(member, &record.id) {
                    let message = if first == &record.id {
                        format!("build file '{member}' is listed twice")
                    } else {
                        format!("build file '{member}' is also listed in phase '{first}'")
                    };
                    self.err("PBX-V006", &record.id, message, None);
                }
            }
        }
    }

    /// Group children resolve to files or groups, and each has one parent.
    fn check_groups(&mut self) {
        let doc = self.doc;
        let mut parent: HashMap<&ObjectId, &ObjectId> = HashMap::new();
        for record in doc.records_in_order() {
            let Some(group) = record.as_group() else { continue };
            for child in &group.children {
                match doc.record(child).map(|c| &c.kind) {
                    None => self.missing("PBX-V003", &record.id, child, "child"),
                    Some(RecordKind::FileReference(_) | RecordKind::Group(_)) => {}
                    // version groups and reference proxies are kept as Other
                    Some(RecordKind::Other(_)) => {}
                    Some(kind) => self.err(
                        "PBX-V003",
                        &record.id,
                        format!("child '{child}' is a {}", kind.describe()),
                        None,
                    ),
                }
                if let Some(first) = parent.insert(child, &record.id) {
                    self.err(
                        "PBX-V004",
                        child,
                        format!("listed as a child of both '{first}' and '{}'", record.id),
                        Some("a file or group must live in exactly one group".to_string()),
                    );
                }
            }
        }
    }

    /// No two file references resolve to the same path.
    fn check_paths(&mut self) {
        let doc = self.doc;
        let mut seen: HashMap<&str, &ObjectId> = HashMap::new();
        for record in doc.records_in_order() {
            let Some(file) = record.as_file_reference() else { continue };
            let path = doc.resolved_path(&record.id).unwrap_or(&file.path);
            if let Some(first) = seen.insert(path, &record.id) {
                self.err(
                    "PBX-V008",
                    &record.id,
                    format!("path '{path}' is already referenced by '{first}'"),
                    Some("point build files at the first reference and drop this one".to_string()),
                );
            }
        }
    }

    fn check_cycles(&mut self) {
        let doc = self.doc;
        let mut done: HashSet<&ObjectId> = HashSet::new();
        for (id, _) in doc.groups() {
            if done.contains(id) {
                continue;
            }
            let mut path: Vec<&ObjectId> = Vec::new();
            if let Some(cycle) = find_cycle(doc, id, &mut path, &mut done) {
                self.err(
                    "PBX-V005",
                    &cycle,
                    "group contains itself".to_string(),
                    Some("remove one of the children entries forming the loop".to_string()),
                );
            }
        }
    }

    fn check_root(&mut self) {
        if self.doc.root_group().is_some() {
            return;
        }
        let project = self
            .doc
            .records_in_order()
            .find(|r| r.isa() == "PBXProject")
            .map(|r| r.id.clone());
        if let Some(project) = project {
            self.err("PBX-V007", &project, "mainGroup does not name a group".to_string(), None);
        }
    }
}

/// Depth-first walk from `id`; returns a group that is its own ancestor.
fn find_cycle<'d>(
    doc: &'d Document,
    id: &'d ObjectId,
    path: &mut Vec<&'d ObjectId>,
    done: &mut HashSet<&'d ObjectId>,
) -> Option<ObjectId> {
    if path.contains(&id) {
        return Some(id.clone());
    }
    if done.contains(id) {
        return None;
    }
    let group = doc.record(id)?.as_group()?;
    path.push(id);
    for child in &group.children {
        if let Some(cycle) = find_cycle(doc, child, path, done) {
            path.pop();
            return Some(cycle);
        }
    }
    path.pop();
    done.insert(id);
    None
}

/// Check every cross-reference and the group tree of a document.
/// Returns Ok(()) if consistent, Err(errors) if problems found.
pub fn verify(doc: &Document) -> Result<(), Vec<VerifyError>> {
    let mut ctx = VerifyContext::new(doc);

    ctx.check_links();
    ctx.check_phases();
    ctx.check_groups();
    ctx.check_root();
    ctx.check_paths();
    ctx.check_cycles();

    // groups on a loop are each reported once, in a stable order
    ctx.errors.sort_by(|a, b| a.code.cmp(b.code).then_with(|| a.record.cmp(&b.record)));
    ctx.errors.dedup();

    if ctx.errors.is_empty() {
        Ok(())
    } else {
        Err(ctx.errors)
    }
}
