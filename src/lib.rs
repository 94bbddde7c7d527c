//! Structural editing of Xcode `project.pbxproj` descriptors.
//!
//! Text is read with [`parser::parse`], changed through an
//! [`edit::Editor`], and written back with [`serializer::serialize`].
//! Records the editor never touched are written back byte for byte.

pub mod diagnostic;
pub mod edit;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod plan;
pub mod report;
pub mod scan;
pub mod serializer;
pub mod verify;
