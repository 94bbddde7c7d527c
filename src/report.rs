use std::fmt::Write as _;

use serde::Serialize;

use crate::edit::{EditError, Warning};
use crate::model::{Bucket, ObjectId};

/// A file the run registered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddedFile {
    pub path: String,
    pub bucket: Bucket,
    pub file_ref: ObjectId,
    pub build_file: ObjectId,
}

/// A request that could not be applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub path: String,
    pub code: &'static str,
    pub message: String,
}

impl Failure {
    pub fn new(path: &str, err: &EditError) -> Self {
        Failure {
            path: path.to_string(),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one batch of requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub added: Vec<AddedFile>,
    pub already_present: Vec<String>,
    pub errors: Vec<Failure>,
    pub warnings: Vec<Warning>,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for file in &self.added {
            let _ = writeln!(out, "+ {} ({})", file.path, file.bucket);
        }
        for path in &self.already_present {
            let _ = writeln!(out, "= {path} (already present)");
        }
        for failure in &self.errors {
            let _ = writeln!(out, "! {}: {} [{}]", failure.path, failure.message, failure.code);
        }
        let _ = writeln!(
            out,
            "{} added, {} already present, {} failed",
            self.added.len(),
            self.already_present.len(),
            self.errors.len()
        );
        out
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| r#"{"error":"internal error serializing report"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        Report {
            added: vec![AddedFile {
                path: "Core/Camera.swift".to_string(),
                bucket: Bucket::Sources,
                file_ref: ObjectId::from("F1"),
                build_file: ObjectId::from("B1"),
            }],
            already_present: vec!["App.swift".to_string()],
            errors: vec![Failure::new("Art.png", &EditError::UnknownTarget("Widget".to_string()))],
            warnings: Vec::new(),
        }
    }

    #[test]
    fn text_lists_each_outcome() {
        let text = sample().render_text();
        assert_eq!(
            text,
            "+ Core/Camera.swift (compile-sources)\n\
             = App.swift (already present)\n\
             ! Art.png: no target named 'Widget' [PBX-E008]\n\
             1 added, 1 already present, 1 failed\n"
        );
    }

    #[test]
    fn json_uses_bucket_names() {
        let v: serde_json::Value = serde_json::from_str(&sample().to_json()).unwrap();
        assert_eq!(v["added"][0]["bucket"], "compile-sources");
        assert_eq!(v["added"][0]["file_ref"], "F1");
        assert_eq!(v["errors"][0]["code"], "PBX-E008");
    }

    #[test]
    fn success_flag_follows_errors() {
        assert!(!sample().is_success());
        assert!(Report::default().is_success());
    }
}
