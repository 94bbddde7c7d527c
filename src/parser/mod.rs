use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::lexer::{self, LexError, Token};
use crate::model::*;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(Begin|End) ([A-Za-z0-9_]+) section$").expect("marker pattern compiles"));

#[derive(Debug, Clone, thiserror::Error)]
#[error("Format error at byte {position}: {message}")]
pub struct FormatError {
    pub code: &'static str,
    pub position: usize,
    pub span: Span,
    pub message: String,
}

impl From<LexError> for FormatError {
    fn from(e: LexError) -> Self {
        let span = Span {
            start: e.position,
            end: e.position + e.snippet.len().max(1),
        };
        FormatError {
            code: "PBX-F004",
            position: e.position,
            span,
            message: format!("cannot tokenize '{}'. {}", e.snippet, e.suggestion),
        }
    }
}

type Result<T> = std::result::Result<T, FormatError>;

/// Parse descriptor text into a [`Document`].
///
/// Records of unmodelled kinds are kept as [`RecordKind::Other`]; entries
/// that do not decode at all are kept verbatim in their section.
pub fn parse(source: &str) -> Result<Document> {
    let tokens = lexer::lex(source)?;
    Parser::new(source, tokens).parse_document()
}

enum Marker<'t> {
    Begin(&'t str),
    End(&'t str),
}

fn marker(token: &Token) -> Option<Marker<'_>> {
    let Token::Comment(text) = token else {
        return None;
    };
    let caps = MARKER.captures(text)?;
    let name = caps.get(2)?.as_str();
    match caps.get(1)?.as_str() {
        "Begin" => Some(Marker::Begin(name)),
        _ => Some(Marker::End(name)),
    }
}

// ---- Raw syntax, before records are typed ----

struct RawObject {
    id: String,
    id_span: Span,
    annotation: Option<String>,
    props: Vec<RawProp>,
    span: Span,
}

struct RawProp {
    key: String,
    value: RawValue,
}

enum RawValue {
    Scalar { text: String },
    List { items: Vec<RawItem>, open: Span, close: Span },
    Dict(Vec<RawProp>),
}

struct RawItem {
    value: RawValue,
    span: Span,
}

impl RawObject {
    fn get(&self, key: &str) -> Option<&RawValue> {
        self.props.iter().find(|p| p.key == key).map(|p| &p.value)
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            RawValue::Scalar { text } => Some(text),
            _ => None,
        }
    }
}

impl RawValue {
    fn into_value(self) -> Value {
        match self {
            RawValue::Scalar { text } => Value::Str(text),
            RawValue::List { items, .. } => Value::List(items.into_iter().map(|i| i.value.into_value()).collect()),
            RawValue::Dict(props) => Value::Dict(
                props
                    .into_iter()
                    .map(|p| Property {
                        key: p.key,
                        value: p.value.into_value(),
                    })
                    .collect(),
            ),
        }
    }
}

pub struct Parser<'s> {
    source: &'s str,
    map: SourceMap,
    tokens: Vec<(Token, Span)>,
    pos: usize,
    prev_end: usize,
}

impl<'s> Parser<'s> {
    pub fn new(source: &'s str, tokens: Vec<(Token, Span)>) -> Self {
        Parser {
            source,
            map: SourceMap::new(source),
            tokens,
            pos: 0,
            prev_end: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .unwrap_or(Span { start: self.source.len(), end: self.source.len() })
    }

    fn advance(&mut self) -> Option<&Token> {
        let (tok, span) = self.tokens.get(self.pos)?;
        self.pos += 1;
        self.prev_end = span.end;
        Some(tok)
    }

    fn expect(&mut self, expected: &Token) -> Result<Span> {
        match self.peek() {
            Some(tok) if tok == expected => {
                let span = self.peek_span();
                self.advance();
                Ok(span)
            }
            Some(tok) => Err(self.error("PBX-F006", format!("expected {:?}, got {:?}", expected, tok))),
            None => Err(self.error("PBX-F006", format!("expected {:?}, got end of input", expected))),
        }
    }

    fn expect_scalar(&mut self) -> Result<String> {
        match self.peek().and_then(Token::scalar).map(str::to_string) {
            Some(text) => {
                self.advance();
                Ok(text)
            }
            None => Err(self.error("PBX-F006", format!("expected a string, got {:?}", self.peek()))),
        }
    }

    fn take_comment(&mut self) -> Option<String> {
        let text = match self.peek() {
            Some(tok @ Token::Comment(text)) if marker(tok).is_none() => text.clone(),
            _ => return None,
        };
        self.advance();
        Some(text)
    }

    fn error(&self, code: &'static str, message: String) -> FormatError {
        let span = self.peek_span();
        FormatError {
            code,
            position: span.start,
            span,
            message,
        }
    }

    fn is_blank(&self, from: usize, to: usize) -> bool {
        self.source[from..to].chars().all(char::is_whitespace)
    }

    /// Start of the line holding `offset` when only whitespace precedes it there.
    fn widen_to_line_start(&self, offset: usize) -> usize {
        let line_start = self.map.line_start(offset);
        if self.is_blank(line_start, offset) { line_start } else { offset }
    }

    /// End of the line holding `offset` when only whitespace follows it there.
    fn widen_to_line_end(&self, offset: usize) -> usize {
        let line_end = self.map.line_end(offset);
        if self.is_blank(offset, line_end) { line_end } else { offset }
    }

    // ---- Sections ----

    pub fn parse_document(&mut self) -> Result<Document> {
        let mut layout = Vec::new();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut text_start = 0;

        while let Some(token) = self.peek() {
            match marker(token) {
                Some(Marker::Begin(name)) => {
                    let name = name.to_string();
                    let span = self.peek_span();
                    let begin_start = self.widen_to_line_start(span.start).max(text_start);
                    if text_start < begin_start {
                        layout.push(Chunk::Text(self.source[text_start..begin_start].to_string()));
                    }
                    let (section, end) = self.parse_section(name, span, begin_start, &mut records, &mut seen)?;
                    layout.push(Chunk::Section(section));
                    text_start = end;
                }
                Some(Marker::End(name)) => {
                    let message = format!("`End {name} section` has no matching begin marker");
                    return Err(self.error("PBX-F002", message));
                }
                None => {
                    self.advance();
                }
            }
        }
        if text_start < self.source.len() {
            layout.push(Chunk::Text(self.source[text_start..].to_string()));
        }

        assign_buckets(&mut records);
        let reserved = self
            .tokens
            .iter()
            .filter_map(|(t, _)| match t {
                Token::Bare(s) if ObjectId::looks_like_id(s) => Some(ObjectId::new(s.as_str())),
                _ => None,
            })
            .collect();

        tracing::debug!(records = records.len(), sections = layout.len(), "parsed descriptor");
        Ok(Document::from_parts(layout, records, reserved))
    }

    fn parse_section(
        &mut self,
        name: String,
        begin_span: Span,
        begin_start: usize,
        records: &mut Vec<Record>,
        seen: &mut HashSet<ObjectId>,
    ) -> Result<(Section, usize)> {
        self.advance();
        let begin_end = self.widen_to_line_end(begin_span.end);
        let mut cursor = begin_end;
        let mut entries = Vec::new();

        loop {
            let Some(token) = self.peek() else {
                return Err(FormatError {
                    code: "PBX-F001",
                    position: begin_span.start,
                    span: begin_span,
                    message: format!("section `{name}` has no end marker"),
                });
            };
            let span = self.peek_span();
            match marker(token) {
                Some(Marker::End(end_name)) if end_name == name => {
                    let start = self.widen_to_line_start(span.start).max(cursor);
                    if cursor < start {
                        entries.push(Entry::Opaque(self.source[cursor..start].to_string()));
                    }
                    self.advance();
                    let end = self.widen_to_line_end(span.end);
                    let section = Section {
                        begin: self.source[begin_start..begin_end].to_string(),
                        end: self.source[start..end].to_string(),
                        name,
                        entries,
                    };
                    return Ok((section, end));
                }
                Some(Marker::End(other)) => {
                    let message = format!("`End {other} section` found inside section `{name}`");
                    return Err(self.error("PBX-F002", message));
                }
                Some(Marker::Begin(other)) => {
                    return Err(FormatError {
                        code: "PBX-F001",
                        position: begin_span.start,
                        span: begin_span,
                        message: format!("section `{name}` is not closed before section `{other}` begins"),
                    });
                }
                None => {}
            }

            let start = self.widen_to_line_start(span.start).max(cursor);
            if cursor < start {
                entries.push(Entry::Opaque(self.source[cursor..start].to_string()));
            }
            let checkpoint = self.pos;
            match self.parse_object() {
                Ok(object) => {
                    let end = self.widen_to_line_end(object.span.end);
                    let Some(isa) = object.get_str("isa") else {
                        tracing::warn!(position = start, "record without isa kept verbatim");
                        entries.push(Entry::Opaque(self.source[start..end].to_string()));
                        cursor = end;
                        continue;
                    };
                    if isa != name {
                        return Err(FormatError {
                            code: "PBX-F003",
                            position: object.id_span.start,
                            span: object.id_span,
                            message: format!(
                                "record {} is a `{isa}` but sits in the `{name}` section",
                                object.id
                            ),
                        });
                    }
                    let id = ObjectId::new(object.id.as_str());
                    if !seen.insert(id.clone()) {
                        return Err(FormatError {
                            code: "PBX-F005",
                            position: object.id_span.start,
                            span: object.id_span,
                            message: format!("identifier {id} is used by more than one record"),
                        });
                    }
                    records.push(self.build_record(object, start, end));
                    entries.push(Entry::Record(id));
                    cursor = end;
                }
                Err(err) => {
                    self.pos = checkpoint;
                    let end = self.recover(start);
                    tracing::warn!(
                        position = err.position,
                        section = %name,
                        "malformed record kept verbatim: {}",
                        err.message
                    );
                    entries.push(Entry::Opaque(self.source[start..end].to_string()));
                    cursor = end;
                }
            }
        }
    }

    /// Skip a malformed entry. Stops at the next token that opens a line
    /// no deeper than the entry did, or at a section marker. Returns the
    /// byte offset where the skipped text ends.
    fn recover(&mut self, entry_start: usize) -> usize {
        let first = self.peek_span();
        let entry_column = first.start - self.map.line_start(first.start);
        self.advance();

        while let Some(token) = self.peek() {
            let span = self.peek_span();
            if marker(token).is_some() {
                return self.widen_to_line_start(span.start).max(entry_start);
            }
            let line_start = self.map.line_start(span.start);
            let opens_line = self.is_blank(line_start, span.start);
            if opens_line && span.start - line_start <= entry_column {
                return line_start;
            }
            self.advance();
        }
        self.source.len()
    }

    // ---- Records ----

    /// `<id> /* <name> */ = { key = value; ... };`
    fn parse_object(&mut self) -> Result<RawObject> {
        let id_span = self.peek_span();
        let id = self.expect_scalar()?;
        let annotation = self.take_comment();
        self.expect(&Token::Assign)?;
        let props = self.parse_dict()?;
        let end = self.expect(&Token::Semi)?;
        Ok(RawObject {
            id,
            id_span,
            annotation,
            props,
            span: id_span.merge(end),
        })
    }

    fn parse_dict(&mut self) -> Result<Vec<RawProp>> {
        self.expect(&Token::LBrace)?;
        let mut props = Vec::new();
        while self.peek() != Some(&Token::RBrace) {
            let key = self.expect_scalar()?;
            self.take_comment();
            self.expect(&Token::Assign)?;
            let value = self.parse_value()?;
            self.expect(&Token::Semi)?;
            props.push(RawProp { key, value });
        }
        self.expect(&Token::RBrace)?;
        Ok(props)
    }

    fn parse_value(&mut self) -> Result<RawValue> {
        match self.peek() {
            Some(Token::LBrace) => Ok(RawValue::Dict(self.parse_dict()?)),
            Some(Token::LParen) => self.parse_list(),
            Some(Token::Quoted(_)) | Some(Token::Bare(_)) => {
                let text = self.expect_scalar()?;
                self.take_comment();
                Ok(RawValue::Scalar { text })
            }
            Some(tok) => Err(self.error("PBX-F006", format!("expected a value, got {:?}", tok))),
            None => Err(self.error("PBX-F006", "expected a value, got end of input".into())),
        }
    }

    fn parse_list(&mut self) -> Result<RawValue> {
        let open = self.expect(&Token::LParen)?;
        let mut items = Vec::new();
        while self.peek() != Some(&Token::RParen) {
            let start = self.peek_span().start;
            let value = self.parse_value()?;
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                Some(Token::RParen) => {}
                other => {
                    let message = format!("expected ',' or ')' in list, got {:?}", other);
                    return Err(self.error("PBX-F006", message));
                }
            }
            items.push(RawItem {
                value,
                span: Span { start, end: self.prev_end },
            });
        }
        let close = self.expect(&Token::RParen)?;
        Ok(RawValue::List { items, open, close })
    }

    fn build_record(&self, object: RawObject, start: usize, end: usize) -> Record {
        let isa = object.get_str("isa").unwrap_or_default().to_string();
        let annotation = object.annotation.clone();
        let mut list = None;

        let kind = match isa.as_str() {
            "PBXFileReference" => object.get_str("path").map(|path| {
                let display_name = object
                    .get_str("name")
                    .map(str::to_string)
                    .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path).to_string());
                RecordKind::FileReference(FileReference {
                    display_name,
                    path: path.to_string(),
                    content_type: object
                        .get_str("lastKnownFileType")
                        .or_else(|| object.get_str("explicitFileType"))
                        .map(str::to_string),
                    source_tree: object.get_str("sourceTree").unwrap_or(GROUP_SOURCE_TREE).to_string(),
                    file_encoding: object.get_str("fileEncoding").and_then(|e| e.parse().ok()),
                })
            }),
            "PBXBuildFile" => object.get_str("fileRef").map(|file_ref| {
                let bucket = annotation
                    .as_deref()
                    .and_then(Bucket::from_annotation)
                    .unwrap_or(Bucket::Sources);
                RecordKind::BuildFile(BuildFile {
                    file_ref: ObjectId::new(file_ref),
                    bucket,
                })
            }),
            g if Group::is_group_isa(g) => self.members(&object, "children", start).map(|(children, origin)| {
                list = Some(origin);
                RecordKind::Group(Group {
                    isa: isa.clone(),
                    display_name: object
                        .get_str("name")
                        .or_else(|| object.get_str("path"))
                        .unwrap_or_default()
                        .to_string(),
                    path: object.get_str("path").map(str::to_string),
                    children,
                })
            }),
            p => Bucket::from_phase_isa(p).and_then(|bucket| {
                self.members(&object, "files", start).map(|(files, origin)| {
                    list = Some(origin);
                    RecordKind::BuildPhase(BuildPhase { bucket, files })
                })
            }),
        };

        let id = ObjectId::new(object.id.as_str());
        let kind = match kind {
            Some(kind) => kind,
            None => {
                list = None;
                RecordKind::Other(Other {
                    isa,
                    properties: object
                        .props
                        .into_iter()
                        .map(|p| Property {
                            key: p.key,
                            value: p.value.into_value(),
                        })
                        .collect(),
                })
            }
        };

        Record {
            id,
            annotation,
            kind,
            origin: Some(Origin {
                text: self.source[start..end].to_string(),
                list,
            }),
        }
    }

    /// Reads a list of member ids and records where it sits in the record text.
    fn members(&self, object: &RawObject, key: &str, base: usize) -> Option<(Vec<ObjectId>, ListOrigin)> {
        let RawValue::List { items, open, close } = object.get(key)? else {
            return None;
        };
        let close_line = self.map.line_start(close.start);
        let close_opens_line = self.is_blank(close_line, close.start);
        let multiline = close_opens_line && self.source[open.end..close.start].contains('\n');

        let mut ids = Vec::new();
        let mut spans = Vec::new();
        for item in items {
            let RawValue::Scalar { text } = &item.value else {
                continue;
            };
            let line_start = self.map.line_start(item.span.start);
            let line_end = self.map.line_end(item.span.end);
            let own_line = self.is_blank(line_start, item.span.start)
                && self.is_blank(item.span.end, line_end)
                && line_end <= close.start;
            let cut = if multiline && own_line {
                Span { start: line_start, end: line_end }
            } else {
                let trailing = self.source[item.span.end..close.start]
                    .find(|c: char| !c.is_whitespace())
                    .unwrap_or(close.start - item.span.end);
                Span { start: item.span.start, end: item.span.end + trailing }
            };
            let id = ObjectId::new(text.as_str());
            ids.push(id.clone());
            spans.push((id, cut.relative_to(base)));
        }

        let indent = if multiline {
            items
                .first()
                .map(|first| {
                    let line_start = self.map.line_start(first.span.start);
                    &self.source[line_start..first.span.start]
                })
                .filter(|prefix| prefix.chars().all(char::is_whitespace))
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}\t", &self.source[close_line..close.start]))
        } else {
            String::new()
        };
        let insert_at = if multiline { close_line } else { close.start };

        Some((
            ids,
            ListOrigin {
                items: spans,
                insert_at: insert_at - base,
                multiline,
                indent,
            },
        ))
    }
}

/// Build files take the bucket of the phase listing them; the annotation
/// suffix is only a fallback for links no phase mentions.
fn assign_buckets(records: &mut [Record]) {
    let mut buckets: HashMap<ObjectId, Bucket> = HashMap::new();
    for record in records.iter() {
        if let Some(phase) = record.as_build_phase() {
            for member in &phase.files {
                buckets.entry(member.clone()).or_insert(phase.bucket);
            }
        }
    }
    for record in records.iter_mut() {
        if let RecordKind::BuildFile(link) = &mut record.kind {
            if let Some(bucket) = buckets.get(&record.id) {
                link.bucket = *bucket;
            }
        }
    }
}
