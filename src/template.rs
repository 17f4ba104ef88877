//! Response body templates
//!
//! A deliberately small text template language:
//! - `{{env "NAME"}}` - value of an environment variable at render time (empty if unset)
//! - `{{"text"}}` or ``{{`text`}}`` - a string literal
//! - `{{/* ... */}}` - a comment
//! - `{{- ` / ` -}}` - trim whitespace on the left / right of the action
//!
//! Templates are parsed once at startup. Rendering cannot fail.

use thiserror::Error;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed action starting at byte {0}")]
    UnclosedAction(usize),

    #[error("unclosed comment starting at byte {0}")]
    UnclosedComment(usize),

    #[error("empty action at byte {0}")]
    EmptyAction(usize),

    #[error("function {name:?} not defined (action at byte {offset})")]
    UnknownFunction { name: String, offset: usize },

    #[error("wrong number of args for {name}: want {want} got {got} (action at byte {offset})")]
    ArgumentCount {
        name: String,
        want: usize,
        got: usize,
        offset: usize,
    },

    #[error("malformed string literal in action at byte {0}")]
    BadLiteral(usize),

    #[error("unexpected {token:?} in action at byte {offset}")]
    UnexpectedToken { token: String, offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Literal(String),
    Env(String),
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
}

/// A parsed response template
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse template text
    ///
    /// Returns an error for any action outside the supported set, so a bad
    /// template is caught before the server starts.
    pub fn parse(src: &str) -> Result<Self, TemplateError> {
        let mut nodes = Vec::new();
        let mut text = String::new();
        let mut trim_leading = false;
        let mut pos = 0;

        while let Some(found) = src[pos..].find(OPEN) {
            let open = pos + found;
            let mut body_start = open + OPEN.len();

            let trim_left = src[body_start..].starts_with('-')
                && src[body_start + 1..].starts_with(char::is_whitespace);
            if trim_left {
                body_start += 1;
            }

            let mut segment = &src[pos..open];
            if trim_leading {
                segment = segment.trim_start();
            }
            if trim_left {
                segment = segment.trim_end();
            }
            text.push_str(segment);

            let close = find_close(src, body_start, open)?;
            let mut body = &src[body_start..close];

            let trim_right = body.ends_with('-')
                && body[..body.len() - 1].ends_with(char::is_whitespace);
            if trim_right {
                body = &body[..body.len() - 1];
            }

            if let Some(node) = parse_action(body, open)? {
                if !text.is_empty() {
                    nodes.push(Node::Text(std::mem::take(&mut text)));
                }
                nodes.push(node);
            }

            pos = close + CLOSE.len();
            trim_leading = trim_right;
        }

        let mut tail = &src[pos..];
        if trim_leading {
            tail = tail.trim_start();
        }
        text.push_str(tail);
        if !text.is_empty() {
            nodes.push(Node::Text(text));
        }

        Ok(Self {
            source: src.to_string(),
            nodes,
        })
    }

    /// The template text this was parsed from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render against the live process environment
    ///
    /// Variables that are unset or not valid unicode render as empty.
    pub fn render(&self) -> String {
        self.render_with(|name| std::env::var(name).ok())
    }

    /// Render with a custom variable lookup
    pub fn render_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(s) | Node::Literal(s) => out.push_str(s),
                Node::Env(name) => {
                    if let Some(value) = lookup(name) {
                        out.push_str(&value);
                    }
                }
            }
        }
        out
    }
}

/// Locate the `}}` closing the action whose body starts at `from`
///
/// Braces inside string literals and comments do not close the action.
fn find_close(src: &str, from: usize, open: usize) -> Result<usize, TemplateError> {
    let body = &src[from..];
    let lead = body.len() - body.trim_start().len();

    if body[lead..].starts_with("/*") {
        let comment_start = from + lead + 2;
        let comment_end = src[comment_start..]
            .find("*/")
            .map(|i| comment_start + i + 2)
            .ok_or(TemplateError::UnclosedComment(open))?;
        return src[comment_end..]
            .find(CLOSE)
            .map(|i| comment_end + i)
            .ok_or(TemplateError::UnclosedAction(open));
    }

    let bytes = src.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'"') if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'`' => quote = Some(b),
            None if b == b'}' && bytes.get(i + 1) == Some(&b'}') => return Ok(i),
            None => {}
        }
        i += 1;
    }

    Err(TemplateError::UnclosedAction(open))
}

/// Parse one action body; comments yield `None`
fn parse_action(body: &str, offset: usize) -> Result<Option<Node>, TemplateError> {
    let body = body.trim();

    if let Some(comment) = body.strip_prefix("/*") {
        if comment.ends_with("*/") {
            return Ok(None);
        }
        let trailing = comment.rsplit("*/").next().unwrap_or_default().trim();
        return Err(TemplateError::UnexpectedToken {
            token: trailing.to_string(),
            offset,
        });
    }

    let mut tokens = tokenize(body, offset)?.into_iter();
    let Some(head) = tokens.next() else {
        return Err(TemplateError::EmptyAction(offset));
    };

    match head {
        Token::Str(literal) => match tokens.next() {
            None => Ok(Some(Node::Literal(literal))),
            Some(extra) => Err(unexpected(extra, offset)),
        },
        Token::Ident(name) if name == "env" => {
            let args: Vec<Token> = tokens.collect();
            if args.len() != 1 {
                return Err(TemplateError::ArgumentCount {
                    name,
                    want: 1,
                    got: args.len(),
                    offset,
                });
            }
            match args.into_iter().next() {
                Some(Token::Str(var)) => Ok(Some(Node::Env(var))),
                Some(other) => Err(unexpected(other, offset)),
                None => Err(TemplateError::EmptyAction(offset)),
            }
        }
        Token::Ident(name) => Err(TemplateError::UnknownFunction { name, offset }),
    }
}

fn unexpected(token: Token, offset: usize) -> TemplateError {
    let token = match token {
        Token::Ident(s) => s,
        Token::Str(s) => format!("{s:?}"),
    };
    TemplateError::UnexpectedToken { token, offset }
}

fn tokenize(body: &str, offset: usize) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut literal = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('"') => literal.push('"'),
                        Some('\\') => literal.push('\\'),
                        Some('n') => literal.push('\n'),
                        Some('t') => literal.push('\t'),
                        Some('r') => literal.push('\r'),
                        _ => return Err(TemplateError::BadLiteral(offset)),
                    },
                    Some(other) => literal.push(other),
                    None => return Err(TemplateError::BadLiteral(offset)),
                }
            }
            tokens.push(Token::Str(literal));
        } else if c == '`' {
            chars.next();
            let mut literal = String::new();
            loop {
                match chars.next() {
                    Some('`') => break,
                    Some(other) => literal.push(other),
                    None => return Err(TemplateError::BadLiteral(offset)),
                }
            }
            tokens.push(Token::Str(literal));
        } else if c.is_alphanumeric() || c == '_' || c == '.' {
            let mut ident = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' || c == '.' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(ident));
        } else {
            return Err(TemplateError::UnexpectedToken {
                token: c.to_string(),
                offset,
            });
        }
    }

    Ok(tokens)
}

#[cfg(test)]
#[path = "template_test.rs"]
mod tests;
