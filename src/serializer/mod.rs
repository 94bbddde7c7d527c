use crate::model::*;

const RECORD_INDENT: &str = "\t\t";
const INDENT: &str = "\t";

/// Render a document back to descriptor text.
///
/// Untouched records and opaque entries are copied from the parsed text.
/// Records whose member list changed are spliced; new records are written
/// in Xcode's canonical layout at the end of their section.
pub fn serialize(doc: &Document) -> String {
    let mut out = String::new();
    for chunk in doc.layout() {
        match chunk {
            Chunk::Text(text) => out.push_str(text),
            Chunk::Section(section) => {
                out.push_str(&section.begin);
                for entry in &section.entries {
                    match entry {
                        Entry::Opaque(text) => out.push_str(text),
                        Entry::Record(id) => {
                            if let Some(record) = doc.record(id) {
                                fmt_record(&mut out, doc, record);
                            }
                        }
                    }
                }
                out.push_str(&section.end);
            }
        }
    }
    out
}

fn fmt_record(out: &mut String, doc: &Document, record: &Record) {
    match &record.origin {
        Some(origin) => splice(out, doc, record, origin),
        None => fmt_new(out, doc, record),
    }
}

// ---- Parsed records ----

fn splice(out: &mut String, doc: &Document, record: &Record, origin: &Origin) {
    let (Some(list), Some(members)) = (&origin.list, record.members()) else {
        out.push_str(&origin.text);
        return;
    };
    let mut removed: Vec<Span> = list
        .items
        .iter()
        .filter(|(id, _)| !members.contains(id))
        .map(|(_, span)| *span)
        .collect();
    let mut added: Vec<&ObjectId> = members
        .iter()
        .filter(|id| !list.items.iter().any(|(original, _)| original == *id))
        .collect();
    let in_order = keeps_parsed_order(list, members);
    if removed.is_empty() && added.is_empty() && in_order {
        out.push_str(&origin.text);
        return;
    }
    if !in_order {
        // a member left and came back: rewrite the whole list in model order
        removed = list.items.iter().map(|(_, span)| *span).collect();
        added = members.iter().collect();
    }
    tracing::debug!(
        id = %record.id,
        removed = removed.len(),
        added = added.len(),
        "splicing member list"
    );

    let text = &origin.text;
    let mut cursor = 0;
    for span in removed {
        out.push_str(&text[cursor..span.start]);
        cursor = span.end;
    }
    let insert_at = list.insert_at.max(cursor);
    out.push_str(&text[cursor..insert_at]);
    for id in added {
        if list.multiline {
            out.push_str(&list.indent);
            fmt_reference(out, doc, id);
            out.push_str(",\n");
        } else {
            fmt_reference(out, doc, id);
            out.push_str(", ");
        }
    }
    out.push_str(&text[insert_at..]);
}

/// Whether `members` is the parsed list minus removals, followed by
/// appended members, so untouched lines can stay where they are.
fn keeps_parsed_order(list: &ListOrigin, members: &[ObjectId]) -> bool {
    let kept: Vec<&ObjectId> = list
        .items
        .iter()
        .map(|(id, _)| id)
        .filter(|id| members.contains(id))
        .collect();
    kept.len() <= members.len() && kept.iter().zip(members).all(|(k, m)| *k == m)
}

// ---- New records ----

fn fmt_new(out: &mut String, doc: &Document, record: &Record) {
    out.push_str(RECORD_INDENT);
    out.push_str(record.id.as_str());
    fmt_annotation(out, record.annotation.as_deref());
    out.push_str(" = {");

    match &record.kind {
        RecordKind::FileReference(file) => {
            out.push_str("isa = PBXFileReference; ");
            if let Some(encoding) = file.file_encoding {
                out.push_str(&format!("fileEncoding = {encoding}; "));
            }
            if let Some(content_type) = &file.content_type {
                out.push_str(&format!("lastKnownFileType = {}; ", quote(content_type)));
            }
            let basename = file.path.rsplit('/').next().unwrap_or(&file.path);
            if file.display_name != basename {
                out.push_str(&format!("name = {}; ", quote(&file.display_name)));
            }
            out.push_str(&format!("path = {}; ", quote(&file.path)));
            out.push_str(&format!("sourceTree = {}; ", quote(&file.source_tree)));
            out.push_str("};\n");
        }

        RecordKind::BuildFile(link) => {
            out.push_str("isa = PBXBuildFile; fileRef = ");
            fmt_reference(out, doc, &link.file_ref);
            out.push_str("; };\n");
        }

        RecordKind::Group(group) => {
            out.push('\n');
            fmt_field(out, "isa", &group.isa);
            fmt_member_list(out, doc, "children", &group.children);
            if group.path.as_deref() != Some(group.display_name.as_str()) {
                fmt_field(out, "name", &group.display_name);
            }
            if let Some(path) = &group.path {
                fmt_field(out, "path", path);
            }
            fmt_field(out, "sourceTree", GROUP_SOURCE_TREE);
            out.push_str(RECORD_INDENT);
            out.push_str("};\n");
        }

        RecordKind::BuildPhase(phase) => {
            out.push('\n');
            fmt_field(out, "isa", phase.bucket.phase_isa());
            fmt_field(out, "buildActionMask", "2147483647");
            fmt_member_list(out, doc, "files", &phase.files);
            fmt_field(out, "runOnlyForDeploymentPostprocessing", "0");
            out.push_str(RECORD_INDENT);
            out.push_str("};\n");
        }

        RecordKind::Other(other) => {
            out.push('\n');
            fmt_field(out, "isa", &other.isa);
            for prop in other.properties.iter().filter(|p| p.key != "isa") {
                fmt_property(out, prop, 3);
            }
            out.push_str(RECORD_INDENT);
            out.push_str("};\n");
        }
    }
}

fn fmt_annotation(out: &mut String, annotation: Option<&str>) {
    if let Some(text) = annotation {
        out.push_str(" /* ");
        out.push_str(text);
        out.push_str(" */");
    }
}

/// `<id> /* <annotation of the referenced record> */`
fn fmt_reference(out: &mut String, doc: &Document, id: &ObjectId) {
    out.push_str(id.as_str());
    fmt_annotation(out, doc.record(id).and_then(|r| r.annotation.as_deref()));
}

fn fmt_field(out: &mut String, key: &str, value: &str) {
    out.push_str(RECORD_INDENT);
    out.push_str(INDENT);
    out.push_str(key);
    out.push_str(" = ");
    out.push_str(&quote(value));
    out.push_str(";\n");
}

fn fmt_member_list(out: &mut String, doc: &Document, key: &str, members: &[ObjectId]) {
    let field_indent = format!("{RECORD_INDENT}{INDENT}");
    out.push_str(&field_indent);
    out.push_str(key);
    out.push_str(" = (\n");
    for id in members {
        out.push_str(&field_indent);
        out.push_str(INDENT);
        fmt_reference(out, doc, id);
        out.push_str(",\n");
    }
    out.push_str(&field_indent);
    out.push_str(");\n");
}

fn fmt_property(out: &mut String, prop: &Property, depth: usize) {
    out.push_str(&INDENT.repeat(depth));
    out.push_str(&quote(&prop.key));
    out.push_str(" = ");
    fmt_value(out, &prop.value, depth);
    out.push_str(";\n");
}

fn fmt_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Str(s) => out.push_str(&quote(s)),
        Value::List(items) => {
            out.push_str("(\n");
            for item in items {
                out.push_str(&INDENT.repeat(depth + 1));
                fmt_value(out, item, depth + 1);
                out.push_str(",\n");
            }
            out.push_str(&INDENT.repeat(depth));
            out.push(')');
        }
        Value::Dict(props) => {
            out.push_str("{\n");
            for prop in props {
                fmt_property(out, prop, depth + 1);
            }
            out.push_str(&INDENT.repeat(depth));
            out.push('}');
        }
    }
}

/// Write a string bare when the format allows it, quoted otherwise.
pub fn quote(s: &str) -> String {
    let bare = !s.is_empty()
        && !s.starts_with("//")
        && !s.starts_with("/*")
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '/' | ':' | '.' | '-'));
    if bare {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const FIXTURE: &str = include_str!("../../tests/fixtures/minimal.pbxproj");

    fn id(s: &str) -> ObjectId {
        ObjectId::from(s)
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let doc = parse(FIXTURE).unwrap();
        assert_eq!(serialize(&doc), FIXTURE);
    }

    #[test]
    fn round_trip_keeps_opaque_entries() {
        let text = "/* Begin PBXBuildFile section */\n\t\tAB = {isa = PBXBuildFile; fileRef = ;\n\n\t\tCD /* x in Sources */ = {isa = PBXBuildFile; fileRef = EF /* x */; };\n/* End PBXBuildFile section */\n";
        let doc = parse(text).unwrap();
        assert_eq!(serialize(&doc), text);
    }

    #[test]
    fn round_trip_without_trailing_newline() {
        let text = "{\n/* Begin PBXGroup section */\n\t\tAA = {isa = PBXGroup; children = (); sourceTree = \"<group>\"; };\n/* End PBXGroup section */\n}";
        let doc = parse(text).unwrap();
        assert_eq!(serialize(&doc), text);
    }

    #[test]
    fn appended_child_lands_before_close() {
        let mut doc = parse(FIXTURE).unwrap();
        let products = id("D00000000000000000000002");
        doc.record_mut(&products)
            .and_then(Record::members_mut)
            .unwrap()
            .push(id("F00000000000000000000001"));
        let out = serialize(&doc);
        let expected = "\t\t\t\tF00000000000000000000002 /* Demo.app */,\n\t\t\t\tF00000000000000000000001 /* AppDelegate.swift */,\n\t\t\t);\n\t\t\tname = Products;";
        assert!(out.contains(expected), "got:\n{out}");
    }

    #[test]
    fn removed_child_line_is_cut() {
        let mut doc = parse(FIXTURE).unwrap();
        let root = doc.root_group().unwrap();
        doc.record_mut(&root)
            .and_then(Record::members_mut)
            .unwrap()
            .retain(|c| c != &id("F00000000000000000000001"));
        let out = serialize(&doc);
        let expected = "\t\t\tchildren = (\n\t\t\t\tD00000000000000000000002 /* Products */,\n\t\t\t);";
        assert!(out.contains(expected), "got:\n{out}");
        assert_eq!(out.len(), FIXTURE.len() - "\t\t\t\tF00000000000000000000001 /* AppDelegate.swift */,\n".len());
    }

    #[test]
    fn member_that_returns_is_written_in_model_order() {
        let mut doc = parse(FIXTURE).unwrap();
        let root = doc.root_group().unwrap();
        let children = doc.record_mut(&root).and_then(Record::members_mut).unwrap();
        children.retain(|c| c != &id("F00000000000000000000001"));
        children.push(id("F00000000000000000000001"));
        let out = serialize(&doc);
        let expected = "\t\t\tchildren = (\n\t\t\t\tD00000000000000000000002 /* Products */,\n\t\t\t\tF00000000000000000000001 /* AppDelegate.swift */,\n\t\t\t);";
        assert!(out.contains(expected), "got:\n{out}");
        let reparsed = parse(&out).unwrap();
        assert_eq!(
            reparsed.record(&root).unwrap().members().unwrap(),
            &[id("D00000000000000000000002"), id("F00000000000000000000001")]
        );
    }

    #[test]
    fn append_into_empty_multiline_list() {
        let mut doc = parse(FIXTURE).unwrap();
        let frameworks = id("A00000000000000000000002");
        doc.record_mut(&frameworks)
            .and_then(Record::members_mut)
            .unwrap()
            .push(id("B00000000000000000000001"));
        let out = serialize(&doc);
        let expected = "\t\t\tfiles = (\n\t\t\t\tB00000000000000000000001 /* AppDelegate.swift in Sources */,\n\t\t\t);";
        assert!(out.contains(expected), "got:\n{out}");
    }

    #[test]
    fn append_into_inline_list() {
        let text = "/* Begin PBXGroup section */\n\t\tAA = {isa = PBXGroup; children = (BB /* b */, ); sourceTree = \"<group>\"; };\n\t\tBB /* b */ = {isa = PBXGroup; children = (); name = b; sourceTree = \"<group>\"; };\n\t\tCC /* c */ = {isa = PBXGroup; children = (); name = c; sourceTree = \"<group>\"; };\n/* End PBXGroup section */\n";
        let mut doc = parse(text).unwrap();
        doc.record_mut(&id("AA")).and_then(Record::members_mut).unwrap().push(id("CC"));
        let out = serialize(&doc);
        assert!(out.contains("children = (BB /* b */, CC /* c */, );"), "got:\n{out}");
    }

    #[test]
    fn new_records_render_canonically() {
        let mut doc = parse(FIXTURE).unwrap();
        let file = FileReference::source("Core/Camera View.swift", "Camera View.swift");
        doc.insert_record(Record::new(
            id("F0000000000000000000000A"),
            Some("Camera View.swift".to_string()),
            RecordKind::FileReference(file),
        ));
        doc.insert_record(Record::new(
            id("B0000000000000000000000A"),
            Some("Camera View.swift in Sources".to_string()),
            RecordKind::BuildFile(BuildFile {
                file_ref: id("F0000000000000000000000A"),
                bucket: Bucket::Sources,
            }),
        ));
        let out = serialize(&doc);
        assert!(out.contains(
            "\t\tF0000000000000000000000A /* Camera View.swift */ = {isa = PBXFileReference; fileEncoding = 4; lastKnownFileType = sourcecode.swift; path = \"Core/Camera View.swift\"; sourceTree = \"<group>\"; };\n/* End PBXFileReference section */"
        ), "got:\n{out}");
        assert!(out.contains(
            "\t\tB0000000000000000000000A /* Camera View.swift in Sources */ = {isa = PBXBuildFile; fileRef = F0000000000000000000000A /* Camera View.swift */; };\n/* End PBXBuildFile section */"
        ), "got:\n{out}");
    }

    #[test]
    fn new_group_renders_multiline() {
        let mut doc = parse(FIXTURE).unwrap();
        let mut group = Group::new("Core", Some("Core"));
        group.children.push(id("F00000000000000000000001"));
        doc.insert_record(Record::new(
            id("D0000000000000000000000A"),
            Some("Core".to_string()),
            RecordKind::Group(group),
        ));
        let out = serialize(&doc);
        let expected = "\t\tD0000000000000000000000A /* Core */ = {\n\t\t\tisa = PBXGroup;\n\t\t\tchildren = (\n\t\t\t\tF00000000000000000000001 /* AppDelegate.swift */,\n\t\t\t);\n\t\t\tpath = Core;\n\t\t\tsourceTree = \"<group>\";\n\t\t};\n/* End PBXGroup section */";
        assert!(out.contains(expected), "got:\n{out}");
    }

    #[test]
    fn quote_rules() {
        assert_eq!(quote("sourcecode.swift"), "sourcecode.swift");
        assert_eq!(quote("System/Library/Frameworks/Metal.framework"), "System/Library/Frameworks/Metal.framework");
        assert_eq!(quote("<group>"), "\"<group>\"");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("a \"b\""), "\"a \\\"b\\\"\"");
        assert_eq!(quote("My App+Extras.swift"), "\"My App+Extras.swift\"");
    }
}
