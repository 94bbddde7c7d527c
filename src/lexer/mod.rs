use logos::Logos;

use crate::model::Span;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("=")]
    Assign,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,

    // Annotation comments carry human-readable names and section markers.
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", |lex| {
        let s = lex.slice();
        s[2..s.len() - 2].trim().to_string()
    }, priority = 10)]
    Comment(String),

    // `// !$*UTF8*$!` header
    #[regex(r"//[^\n]*", priority = 10, allow_greedy = true)]
    LineComment,

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len() - 1])
    })]
    Quoted(String),

    // Unquoted strings: identifiers, paths, numbers, type names
    #[regex(r#"[^\s{}()=;,"]+"#, |lex| lex.slice().to_string())]
    Bare(String),
}

impl Token {
    /// The string payload of a scalar token.
    pub fn scalar(&self) -> Option<&str> {
        match self {
            Token::Quoted(s) | Token::Bare(s) => Some(s),
            _ => None,
        }
    }
}

/// Tokenize a descriptor. Line comments are dropped; everything else keeps
/// its byte span so callers can slice the original text.
pub fn lex(source: &str) -> Result<Vec<(Token, Span)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        match result {
            Ok(Token::LineComment) => {}
            Ok(token) => tokens.push((token, Span { start: range.start, end: range.end })),
            Err(()) => {
                let snippet: String = source[range.clone()].chars().take(24).collect();
                return Err(LexError {
                    position: range.start,
                    suggestion: suggest_fix(&snippet),
                    snippet,
                });
            }
        }
    }

    Ok(tokens)
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn suggest_fix(bad: &str) -> String {
    if bad.starts_with('"') {
        "Unterminated quoted string; close it with '\"'.".to_string()
    } else if bad.starts_with("/*") {
        "Unterminated comment; close it with '*/'.".to_string()
    } else {
        format!("Unexpected character(s): '{bad}'.")
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Lex error at position {position}: '{snippet}'. {suggestion}")]
pub struct LexError {
    pub position: usize,
    pub snippet: String,
    pub suggestion: String,
}
