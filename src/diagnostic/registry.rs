/// An entry in the diagnostic code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    pub short: &'static str,  // one line, used by `explain --list`
    pub long: &'static str,   // full explanation for `explain <CODE>`
}

/// All stable diagnostic codes pbxedit emits.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Format (reading the descriptor) ─────────────────────────────────────
    ErrorEntry {
        code: "PBX-F001",
        short: "section begin marker without end marker",
        long: r#"## PBX-F001: section is never closed

A `/* Begin X section */` marker was found, but the matching
`/* End X section */` marker never follows, or another section begins
before it.

**Example:**

    /* Begin PBXGroup section */
        ...
    /* Begin PBXProject section */

Sections cannot nest. Restore the missing end marker (often lost in a
bad merge) and run the command again. The file is left unchanged.
"#,
    },
    ErrorEntry {
        code: "PBX-F002",
        short: "end marker without matching begin",
        long: r#"## PBX-F002: stray end marker

An `/* End X section */` marker appears outside any section, or inside
a section with a different name.

Check for a duplicated or misspelled marker near the reported line.
"#,
    },
    ErrorEntry {
        code: "PBX-F003",
        short: "record sits in the wrong section",
        long: r#"## PBX-F003: record does not belong to its section

Every record lives in the section named after its `isa`. A
`PBXFileReference` record inside the `PBXGroup` section means the
section layout cannot be trusted, so the file is not edited.

Move the record into the section matching its `isa`.
"#,
    },
    ErrorEntry {
        code: "PBX-F004",
        short: "text cannot be tokenized",
        long: r#"## PBX-F004: unreadable descriptor text

The descriptor contains text that is not part of the property-list
syntax, usually an unterminated quoted string or `/*` comment.

**Example:**

    path = "Sources/App.swift;

Close the string or comment at the reported position.
"#,
    },
    ErrorEntry {
        code: "PBX-F005",
        short: "two records share an identifier",
        long: r#"## PBX-F005: duplicate identifier

Identifiers are unique across every section. Two records declared with
the same identifier make every reference to it ambiguous, so editing
stops.

This usually comes from a merge that kept both sides of a conflict.
Remove one of the records, or give it a fresh identifier and update the
places that refer to it.
"#,
    },
    ErrorEntry {
        code: "PBX-F006",
        short: "malformed record kept verbatim",
        long: r#"## PBX-F006: malformed record

A record inside a section could not be decoded (a missing `;` or `=`,
an unbalanced brace). It is kept exactly as written and ignored by every
edit; the rest of the file is processed normally.

Run with `-v` to see the position of each such record in the log.
"#,
    },

    // ── Edit ────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "PBX-E001",
        short: "reference to a record that does not exist",
        long: r#"## PBX-E001: dangling reference

An edit named an identifier that no record in the document carries.
Nothing was changed by the failing step.
"#,
    },
    ErrorEntry {
        code: "PBX-E002",
        short: "record has the wrong kind",
        long: r#"## PBX-E002: wrong record kind

An edit expected one kind of record (a group, a build phase, a file
reference) and found another. For example, only file references and
groups can become children of a group.
"#,
    },
    ErrorEntry {
        code: "PBX-E003",
        short: "build file added to a phase of another kind",
        long: r#"## PBX-E003: bucket mismatch

A build file links its file into one bucket (compile-sources,
link-libraries, resources). It can only be listed in the phase that
holds that bucket.

Use `--bucket` to choose the bucket that matches the phase.
"#,
    },
    ErrorEntry {
        code: "PBX-E004",
        short: "group would contain itself",
        long: r#"## PBX-E004: group cycle

Placing a group inside one of its own descendants would turn the group
tree into a loop. The group was left where it was.
"#,
    },
    ErrorEntry {
        code: "PBX-E005",
        short: "no fresh identifier could be allocated",
        long: r#"## PBX-E005: identifier space exhausted

Every candidate identifier collided with one already in the document,
even after reseeding. In practice this means the document carries an
enormous number of identifiers; nothing was created.
"#,
    },
    ErrorEntry {
        code: "PBX-E006",
        short: "target has no phase of the requested kind",
        long: r#"## PBX-E006: missing build phase

The selected target does not list a build phase for the requested
bucket. Projects created without resources, for example, have no
`PBXResourcesBuildPhase`.

Add the phase in the IDE, or choose another target with `--target`.
"#,
    },
    ErrorEntry {
        code: "PBX-E007",
        short: "project has no main group",
        long: r#"## PBX-E007: missing main group

The `PBXProject` record has no `mainGroup`, or it does not name a group.
Files cannot be placed in the tree without one.
"#,
    },
    ErrorEntry {
        code: "PBX-E008",
        short: "no target with that name",
        long: r#"## PBX-E008: unknown target

`--target` named a target the project does not declare. Target names
are matched exactly against each native target's `name`.
"#,
    },

    ErrorEntry {
        code: "PBX-E009",
        short: "move would duplicate a path",
        long: r#"## PBX-E009: path already referenced

A file reference's path is relative to the groups above it, so moving it
to another group changes which file on disk it names. The move was
refused because another file reference already names that file.

Nothing was changed. Move or remove the other reference first.
"#,
    },

    // ── Warnings ────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "PBX-W001",
        short: "path already referenced under another name",
        long: r#"## PBX-W001: path already referenced

A file was added with a display name that differs from the existing
reference to the same path. The existing record is reused and keeps its
name; no second reference is created.
"#,
    },

    // ── Verifier ────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "PBX-V001",
        short: "build file does not point at a file reference",
        long: r#"## PBX-V001: broken build file

A `PBXBuildFile` record's `fileRef` names a record that is missing or
is not a `PBXFileReference`. The build will fail to find the file.
"#,
    },
    ErrorEntry {
        code: "PBX-V002",
        short: "phase member is not a build file of its kind",
        long: r#"## PBX-V002: bad phase member

Build phases list build files, each linked into the phase's bucket. A
member that is missing, is some other kind of record, or links into a
different bucket is reported.
"#,
    },
    ErrorEntry {
        code: "PBX-V003",
        short: "group child is missing or of the wrong kind",
        long: r#"## PBX-V003: bad group child

Group children must be file references or groups that exist in the
document.
"#,
    },
    ErrorEntry {
        code: "PBX-V004",
        short: "record listed in more than one group",
        long: r#"## PBX-V004: record has two parents

The group tree requires every file and group to appear in exactly one
group. Remove the extra `children` entry.
"#,
    },
    ErrorEntry {
        code: "PBX-V005",
        short: "group tree contains a loop",
        long: r#"## PBX-V005: group cycle

A group is, directly or through its children, a child of itself.
"#,
    },
    ErrorEntry {
        code: "PBX-V006",
        short: "build file listed more than once",
        long: r#"## PBX-V006: build file listed twice

A build file belongs to exactly one slot of one phase. Listing it twice
compiles or copies the file twice.
"#,
    },
    ErrorEntry {
        code: "PBX-V007",
        short: "main group is missing",
        long: r#"## PBX-V007: missing main group

The `PBXProject` record's `mainGroup` does not name a group record.
"#,
    },
    ErrorEntry {
        code: "PBX-V008",
        short: "path referenced twice",
        long: r#"## PBX-V008: path referenced twice

Two `PBXFileReference` records resolve to the same file: their paths,
joined with the paths of the groups above them, are equal. Xcode shows
the file twice and build files may point at either one. Files with the
same name in different folders are not duplicates.

Keep the first record, point every build file at it, and remove the
duplicate from its group and from the file reference section.
"#,
    },

    // ── Outer layers ────────────────────────────────────────────────────────
    ErrorEntry {
        code: "PBX-P001",
        short: "plan file cannot be read",
        long: r#"## PBX-P001: bad plan file

The `--plan` file could not be read or is not valid JSON of the form:

    {"files": [{"path": "Core/App.swift", "group": "Core",
                "bucket": "compile-sources"}]}

`name`, `group` and `bucket` are optional.
"#,
    },
    ErrorEntry {
        code: "PBX-S001",
        short: "directory scan failed",
        long: r#"## PBX-S001: scan failed

The `--scan` directory could not be walked, usually because it does not
exist or a subdirectory cannot be read.
"#,
    },
];

/// Look up an entry by code (e.g. `"PBX-E003"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code.eq_ignore_ascii_case(code))
}
