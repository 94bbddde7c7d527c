use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod id;
pub mod source_map;

pub use id::{IdAllocator, ObjectId};
pub use source_map::SourceMap;

// ---- Span infrastructure ----

/// Byte range within descriptor text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// The same range measured from `base` instead of the start of the text.
    pub fn relative_to(self, base: usize) -> Span {
        Span {
            start: self.start - base,
            end: self.end - base,
        }
    }
}

// ---- Buckets ----

/// Build role of a linked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    #[serde(rename = "compile-sources")]
    Sources,
    #[serde(rename = "link-libraries")]
    Frameworks,
    #[serde(rename = "resources")]
    Resources,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Sources, Bucket::Frameworks, Bucket::Resources];

    /// `isa` of the build phase holding links of this bucket.
    pub fn phase_isa(self) -> &'static str {
        match self {
            Bucket::Sources => "PBXSourcesBuildPhase",
            Bucket::Frameworks => "PBXFrameworksBuildPhase",
            Bucket::Resources => "PBXResourcesBuildPhase",
        }
    }

    /// Title used in annotations: `Foo.swift in Sources`.
    pub fn title(self) -> &'static str {
        match self {
            Bucket::Sources => "Sources",
            Bucket::Frameworks => "Frameworks",
            Bucket::Resources => "Resources",
        }
    }

    pub fn from_phase_isa(isa: &str) -> Option<Bucket> {
        Bucket::ALL.into_iter().find(|b| b.phase_isa() == isa)
    }

    /// Reads the bucket off a build file annotation such as `Foo.swift in Sources`.
    pub fn from_annotation(annotation: &str) -> Option<Bucket> {
        let (_, title) = annotation.rsplit_once(" in ")?;
        Bucket::ALL.into_iter().find(|b| b.title() == title)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bucket::Sources => "compile-sources",
            Bucket::Frameworks => "link-libraries",
            Bucket::Resources => "resources",
        })
    }
}

impl FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compile-sources" | "sources" => Ok(Bucket::Sources),
            "link-libraries" | "frameworks" => Ok(Bucket::Frameworks),
            "resources" => Ok(Bucket::Resources),
            other => Err(format!(
                "unknown bucket '{other}' (expected compile-sources, link-libraries or resources)"
            )),
        }
    }
}

// ---- Records ----

/// A file on disk (or in the SDK) the project knows about.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReference {
    pub display_name: String,
    pub path: String,
    pub content_type: Option<String>,
    pub source_tree: String,
    pub file_encoding: Option<u32>,
}

pub const GROUP_SOURCE_TREE: &str = "<group>";
pub const PROJECT_SOURCE_TREE: &str = "SOURCE_ROOT";
pub const ABSOLUTE_SOURCE_TREE: &str = "<absolute>";
pub const SDK_SOURCE_TREE: &str = "SDKROOT";
pub const SYSTEM_FRAMEWORKS_DIR: &str = "System/Library/Frameworks";

impl FileReference {
    /// A source file under a group, typed from its extension.
    pub fn source(path: &str, display_name: &str) -> Self {
        let content_type = content_type_for(path);
        let file_encoding = content_type.starts_with("sourcecode.").then_some(4);
        FileReference {
            display_name: display_name.to_string(),
            path: path.to_string(),
            content_type: Some(content_type.to_string()),
            source_tree: GROUP_SOURCE_TREE.to_string(),
            file_encoding,
        }
    }

    /// A system framework such as `Metal.framework`.
    pub fn framework(name: &str) -> Self {
        FileReference {
            display_name: name.to_string(),
            path: format!("{SYSTEM_FRAMEWORKS_DIR}/{name}"),
            content_type: Some(content_type_for(name).to_string()),
            source_tree: SDK_SOURCE_TREE.to_string(),
            file_encoding: None,
        }
    }
}

/// Where a file lives, as one comparable string: the `path`s of the
/// enclosing groups joined with the file's own for group-relative files,
/// the bare path for project-relative and absolute ones, and
/// `$(TREE)/path` for files under the SDK or build products.
pub fn location_key(group_path: &[&str], file: &FileReference) -> String {
    match file.source_tree.as_str() {
        GROUP_SOURCE_TREE => group_path
            .iter()
            .copied()
            .chain(std::iter::once(file.path.as_str()))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("/"),
        PROJECT_SOURCE_TREE | ABSOLUTE_SOURCE_TREE => file.path.clone(),
        tree => format!("$({tree})/{}", file.path),
    }
}

/// Xcode's `lastKnownFileType` for a path, by extension.
pub fn content_type_for(path: &str) -> &'static str {
    let file = path.rsplit('/').next().unwrap_or(path);
    let ext = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return "text",
    };
    match ext.as_str() {
        "swift" => "sourcecode.swift",
        "metal" => "sourcecode.metal",
        "m" => "sourcecode.c.objc",
        "mm" => "sourcecode.cpp.objcpp",
        "c" => "sourcecode.c.c",
        "cc" | "cpp" | "cxx" => "sourcecode.cpp.cpp",
        "h" => "sourcecode.c.h",
        "hh" | "hpp" => "sourcecode.cpp.h",
        "s" => "sourcecode.asm",
        "framework" => "wrapper.framework",
        "xcframework" => "wrapper.xcframework",
        "dylib" => "compiled.mach-o.dylib",
        "tbd" => "sourcecode.text-based-dylib-definition",
        "a" => "archive.ar",
        "storyboard" => "file.storyboard",
        "xib" => "file.xib",
        "xcassets" => "folder.assetcatalog",
        "plist" => "text.plist.xml",
        "strings" => "text.plist.strings",
        "entitlements" => "text.plist.entitlements",
        "json" => "text.json",
        "png" => "image.png",
        "jpg" | "jpeg" => "image.jpeg",
        "md" => "net.daringfireball.markdown",
        _ => "text",
    }
}

/// Links a file reference into a build phase.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildFile {
    pub file_ref: ObjectId,
    pub bucket: Bucket,
}

/// A folder in the project navigator.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub isa: String,
    pub display_name: String,
    pub path: Option<String>,
    pub children: Vec<ObjectId>,
}

pub const GROUP_ISA: &str = "PBXGroup";

impl Group {
    pub fn new(display_name: &str, path: Option<&str>) -> Self {
        Group {
            isa: GROUP_ISA.to_string(),
            display_name: display_name.to_string(),
            path: path.map(str::to_string),
            children: Vec::new(),
        }
    }

    pub fn is_group_isa(isa: &str) -> bool {
        matches!(isa, "PBXGroup" | "PBXVariantGroup")
    }
}

/// An ordered list of build files compiled, linked or copied by a target.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildPhase {
    pub bucket: Bucket,
    pub files: Vec<ObjectId>,
}

/// Property values of records this crate does not model.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    List(Vec<Value>),
    Dict(Vec<Property>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: String,
    pub value: Value,
}

/// Any decodable record outside the four modelled kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct Other {
    pub isa: String,
    pub properties: Vec<Property>,
}

impl Other {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.iter().find(|p| p.key == key).map(|p| &p.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordKind {
    FileReference(FileReference),
    BuildFile(BuildFile),
    Group(Group),
    BuildPhase(BuildPhase),
    Other(Other),
}

impl RecordKind {
    /// Short human name for error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            RecordKind::FileReference(_) => "file reference",
            RecordKind::BuildFile(_) => "build file",
            RecordKind::Group(_) => "group",
            RecordKind::BuildPhase(_) => "build phase",
            RecordKind::Other(_) => "record",
        }
    }
}

/// Original text of a parsed record, kept so untouched records re-emit
/// byte for byte and touched ones can be spliced.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Origin {
    pub text: String,
    pub list: Option<ListOrigin>,
}

/// Where the member list (`children` or `files`) sits inside a record's text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ListOrigin {
    /// Members as parsed, each with the range to cut if it is removed.
    pub items: Vec<(ObjectId, Span)>,
    /// Offset where new members are inserted.
    pub insert_at: usize,
    /// One member per line (`true`) or all on the list's line.
    pub multiline: bool,
    /// Leading whitespace of a member line.
    pub indent: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: ObjectId,
    /// The `/* ... */` comment written next to the id.
    pub annotation: Option<String>,
    pub kind: RecordKind,
    pub(crate) origin: Option<Origin>,
}

impl Record {
    pub fn new(id: ObjectId, annotation: Option<String>, kind: RecordKind) -> Self {
        Record { id, annotation, kind, origin: None }
    }

    pub fn isa(&self) -> &str {
        match &self.kind {
            RecordKind::FileReference(_) => "PBXFileReference",
            RecordKind::BuildFile(_) => "PBXBuildFile",
            RecordKind::Group(g) => &g.isa,
            RecordKind::BuildPhase(p) => p.bucket.phase_isa(),
            RecordKind::Other(o) => &o.isa,
        }
    }

    /// The member list a group or phase owns.
    pub fn members(&self) -> Option<&[ObjectId]> {
        match &self.kind {
            RecordKind::Group(g) => Some(&g.children),
            RecordKind::BuildPhase(p) => Some(&p.files),
            _ => None,
        }
    }

    pub(crate) fn members_mut(&mut self) -> Option<&mut Vec<ObjectId>> {
        match &mut self.kind {
            RecordKind::Group(g) => Some(&mut g.children),
            RecordKind::BuildPhase(p) => Some(&mut p.files),
            _ => None,
        }
    }

    pub fn as_file_reference(&self) -> Option<&FileReference> {
        match &self.kind {
            RecordKind::FileReference(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_build_file(&self) -> Option<&BuildFile> {
        match &self.kind {
            RecordKind::BuildFile(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match &self.kind {
            RecordKind::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_build_phase(&self) -> Option<&BuildPhase> {
        match &self.kind {
            RecordKind::BuildPhase(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_other(&self) -> Option<&Other> {
        match &self.kind {
            RecordKind::Other(o) => Some(o),
            _ => None,
        }
    }

    /// Whether the record's text was parsed and not yet touched.
    pub fn is_parsed(&self) -> bool {
        self.origin.is_some()
    }
}

// ---- Layout ----

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Chunk {
    Text(String),
    Section(Section),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Section {
    pub name: String,
    pub begin: String,
    pub entries: Vec<Entry>,
    pub end: String,
}

impl Section {
    pub fn empty(name: &str) -> Self {
        Section {
            name: name.to_string(),
            begin: format!("/* Begin {name} section */\n"),
            entries: Vec::new(),
            end: format!("/* End {name} section */\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Entry {
    Record(ObjectId),
    Opaque(String),
}

/// A native target and the phases it builds with.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub id: ObjectId,
    pub name: String,
    pub build_phases: Vec<ObjectId>,
}

// ---- Document ----

/// An in-memory descriptor: every record in one id namespace, plus the
/// textual layout needed to write it back.
#[derive(Debug, Clone, Default)]
pub struct Document {
    records: HashMap<ObjectId, Record>,
    layout: Vec<Chunk>,
    /// Identifier-shaped tokens seen anywhere in the text, modelled or not.
    reserved: HashSet<ObjectId>,
    /// File references by [`location_key`]; the first in text order wins.
    by_location: HashMap<String, ObjectId>,
    location_of: HashMap<ObjectId, String>,
    links: HashMap<(ObjectId, Bucket), ObjectId>,
}

impl Document {
    pub(crate) fn from_parts(layout: Vec<Chunk>, records: Vec<Record>, reserved: HashSet<ObjectId>) -> Self {
        let mut doc = Document {
            layout,
            reserved,
            ..Default::default()
        };
        for record in records {
            doc.index_link(&record);
            doc.records.insert(record.id.clone(), record);
        }
        doc.index_locations();
        doc
    }

    fn index_link(&mut self, record: &Record) {
        if let RecordKind::BuildFile(b) = &record.kind {
            self.links
                .entry((b.file_ref.clone(), b.bucket))
                .or_insert_with(|| record.id.clone());
        }
    }

    /// Rebuilds the location index from the group tree in one pass.
    fn index_locations(&mut self) {
        let mut parent: HashMap<&ObjectId, &ObjectId> = HashMap::new();
        for record in self.records_in_order() {
            if let Some(group) = record.as_group() {
                for child in &group.children {
                    parent.entry(child).or_insert(&record.id);
                }
            }
        }
        let mut located = Vec::new();
        for record in self.records_in_order() {
            let Some(file) = record.as_file_reference() else { continue };
            let mut segments = Vec::new();
            let mut seen = HashSet::new();
            let mut current = &record.id;
            while let Some(&up) = parent.get(current) {
                if !seen.insert(up) {
                    break;
                }
                if let Some(path) = self.record(up).and_then(Record::as_group).and_then(|g| g.path.as_deref()) {
                    segments.push(path);
                }
                current = up;
            }
            segments.reverse();
            located.push((record.id.clone(), location_key(&segments, file)));
        }
        self.by_location.clear();
        self.location_of.clear();
        for (id, key) in located {
            self.by_location.entry(key.clone()).or_insert_with(|| id.clone());
            self.location_of.insert(id, key);
        }
    }

    /// Records that `id` now lives at `key`, after a group move.
    pub(crate) fn relocate(&mut self, id: &ObjectId, key: String) {
        if let Some(old) = self.location_of.remove(id) {
            if self.by_location.get(&old) == Some(id) {
                self.by_location.remove(&old);
                // another reference to the same file takes over the slot
                let heir = self.location_of.iter().find(|(_, k)| **k == old).map(|(i, _)| i.clone());
                if let Some(other) = heir {
                    self.by_location.insert(old, other);
                }
            }
        }
        self.by_location.entry(key.clone()).or_insert_with(|| id.clone());
        self.location_of.insert(id.clone(), key);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, id: &ObjectId) -> Option<&Record> {
        self.records.get(id)
    }

    pub(crate) fn record_mut(&mut self, id: &ObjectId) -> Option<&mut Record> {
        self.records.get_mut(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.records.keys().chain(self.reserved.iter())
    }

    /// Whether `id` names a record or appears anywhere in the parsed text.
    pub fn is_taken(&self, id: &ObjectId) -> bool {
        self.records.contains_key(id) || self.reserved.contains(id)
    }

    /// Records in section order, as the serializer emits them.
    pub fn records_in_order(&self) -> impl Iterator<Item = &Record> {
        self.layout
            .iter()
            .filter_map(|chunk| match chunk {
                Chunk::Section(s) => Some(s.entries.iter()),
                Chunk::Text(_) => None,
            })
            .flatten()
            .filter_map(|entry| match entry {
                Entry::Record(id) => self.records.get(id),
                Entry::Opaque(_) => None,
            })
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.layout
            .iter()
            .filter_map(|chunk| match chunk {
                Chunk::Section(s) => Some(s.name.as_str()),
                Chunk::Text(_) => None,
            })
            .collect()
    }

    /// The file reference living at `key` (see [`location_key`]).
    pub fn find_file_reference(&self, key: &str) -> Option<&ObjectId> {
        self.by_location.get(key)
    }

    /// The file reference `file` would collide with if placed in `group`.
    pub fn find_file_at(&self, group: Option<&ObjectId>, file: &FileReference) -> Option<&ObjectId> {
        let segments = group.map(|g| self.group_path(g)).unwrap_or_default();
        self.by_location.get(&location_key(&segments, file))
    }

    /// Where file reference `id` points, following its enclosing groups.
    pub fn resolved_path(&self, id: &ObjectId) -> Option<&str> {
        self.location_of.get(id).map(String::as_str)
    }

    /// `path` components of `group` and every group above it, outermost
    /// first. Groups without a `path` add nothing.
    pub fn group_path(&self, group: &ObjectId) -> Vec<&str> {
        let mut segments = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(group);
        while let Some(id) = current {
            if !seen.insert(id) {
                break;
            }
            let Some(record) = self.record(id) else { break };
            if let Some(path) = record.as_group().and_then(|g| g.path.as_deref()) {
                segments.push(path);
            }
            current = self.first_parent(id);
        }
        segments.reverse();
        segments
    }

    /// The first group in text order listing `id` as a child.
    fn first_parent(&self, id: &ObjectId) -> Option<&ObjectId> {
        self.records_in_order()
            .find(|r| r.as_group().is_some_and(|g| g.children.contains(id)))
            .map(|r| &r.id)
    }

    pub fn find_build_file(&self, file_ref: &ObjectId, bucket: Bucket) -> Option<&ObjectId> {
        self.links.get(&(file_ref.clone(), bucket))
    }

    pub fn file_references(&self) -> impl Iterator<Item = (&ObjectId, &FileReference)> {
        self.records
            .iter()
            .filter_map(|(id, r)| r.as_file_reference().map(|f| (id, f)))
    }

    pub fn groups(&self) -> impl Iterator<Item = (&ObjectId, &Group)> {
        self.records.iter().filter_map(|(id, r)| r.as_group().map(|g| (id, g)))
    }

    /// Groups listing `id` among their children.
    pub fn parents_of<'a>(&'a self, id: &'a ObjectId) -> impl Iterator<Item = &'a ObjectId> + 'a {
        self.groups()
            .filter(move |(_, g)| g.children.contains(id))
            .map(|(gid, _)| gid)
    }

    /// The child of `group` named `name`, if that child is a group.
    pub fn child_group(&self, group: &ObjectId, name: &str) -> Option<&ObjectId> {
        let group = self.record(group)?.as_group()?;
        group.children.iter().find(|child| {
            self.record(child)
                .and_then(Record::as_group)
                .is_some_and(|g| g.display_name == name)
        })
    }

    fn project(&self) -> Option<&Other> {
        self.records_in_order()
            .filter_map(Record::as_other)
            .find(|o| o.isa == "PBXProject")
    }

    /// The project's `mainGroup`.
    pub fn root_group(&self) -> Option<ObjectId> {
        let id = ObjectId::new(self.project()?.get("mainGroup")?.as_str()?);
        self.record(&id)?.as_group().map(|_| id)
    }

    pub fn targets(&self) -> Vec<Target> {
        self.records_in_order()
            .filter(|r| matches!(r.isa(), "PBXNativeTarget" | "PBXAggregateTarget"))
            .filter_map(|r| {
                let other = r.as_other()?;
                let name = other.get("name").and_then(Value::as_str).unwrap_or_default();
                let build_phases = match other.get("buildPhases") {
                    Some(Value::List(items)) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(ObjectId::new)
                        .collect(),
                    _ => Vec::new(),
                };
                Some(Target {
                    id: r.id.clone(),
                    name: name.to_string(),
                    build_phases,
                })
            })
            .collect()
    }

    /// All phases of `bucket`, in section order.
    pub fn phases(&self, bucket: Bucket) -> Vec<ObjectId> {
        self.records_in_order()
            .filter(|r| r.as_build_phase().is_some_and(|p| p.bucket == bucket))
            .map(|r| r.id.clone())
            .collect()
    }

    /// Adds a new record at the end of its section, creating the section
    /// in alphabetical position when the document has none for its kind.
    pub(crate) fn insert_record(&mut self, record: Record) {
        let isa = record.isa().to_string();
        let id = record.id.clone();
        self.index_link(&record);
        // new records sit in no group yet
        if let Some(file) = record.as_file_reference() {
            let key = location_key(&[], file);
            self.by_location.entry(key.clone()).or_insert_with(|| id.clone());
            self.location_of.insert(id.clone(), key);
        }
        self.records.insert(id.clone(), record);
        let section = self.section_mut(&isa);
        section.entries.push(Entry::Record(id));
    }

    fn section_mut(&mut self, name: &str) -> &mut Section {
        let existing = self
            .layout
            .iter()
            .position(|c| matches!(c, Chunk::Section(s) if s.name == name));
        let index = match existing {
            Some(index) => index,
            None => self.open_section(name),
        };
        match &mut self.layout[index] {
            Chunk::Section(s) => s,
            Chunk::Text(_) => unreachable!("layout index points at a section"),
        }
    }

    fn open_section(&mut self, name: &str) -> usize {
        tracing::debug!(section = name, "opening new section");
        let sections: Vec<(usize, &str)> = self
            .layout
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match c {
                Chunk::Section(s) => Some((i, s.name.as_str())),
                Chunk::Text(_) => None,
            })
            .collect();
        let following = sections.iter().find(|(_, n)| *n > name).map(|(i, _)| *i);
        let last = sections.last().map(|(i, _)| *i);
        let section = Chunk::Section(Section::empty(name));
        match (following, last) {
            (Some(i), _) => {
                self.layout.insert(i, section);
                self.layout.insert(i + 1, Chunk::Text("\n".to_string()));
                i
            }
            (None, Some(i)) => {
                self.layout.insert(i + 1, Chunk::Text("\n".to_string()));
                self.layout.insert(i + 2, section);
                i + 2
            }
            (None, None) => {
                let i = self.layout.len().min(1);
                self.layout.insert(i, section);
                i
            }
        }
    }

    pub(crate) fn layout(&self) -> &[Chunk] {
        &self.layout
    }
}
