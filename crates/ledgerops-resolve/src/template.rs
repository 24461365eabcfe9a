//! Smart value string syntax.
//!
//! ```text
//! template  := part*
//! part      := text | sigil '{' part* '}'
//! sigil     := '$' | '&' | '%' | '='
//! ```
//!
//! A string that starts with a sigil not followed by `{` is read as if its
//! remainder were braced: `%a.b` is `%{a.b}`. Inside braces, plain `{` and
//! `}` must balance (so dict literals work inside formulas). A backslash
//! before one of `$ & % = { }` makes that character literal. Text nodes keep
//! the backslash; [`unescape`] removes it where the text is consumed.
//!
//! References nest at most [`DEFAULT_MAX_DEPTH`] levels unless a limit is
//! given to [`Template::parse_with_max_depth`].

use std::fmt;

use thiserror::Error;

use crate::resolver::DEFAULT_MAX_DEPTH;

/// Source of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sigil {
    /// `$`: environment variable
    Env,
    /// `&`: configuration value
    Config,
    /// `%`: scenario data
    Data,
    /// `=`: formula
    Formula,
}

impl Sigil {
    pub fn from_char(c: char) -> Option<Sigil> {
        match c {
            '$' => Some(Sigil::Env),
            '&' => Some(Sigil::Config),
            '%' => Some(Sigil::Data),
            '=' => Some(Sigil::Formula),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Sigil::Env => '$',
            Sigil::Config => '&',
            Sigil::Data => '%',
            Sigil::Formula => '=',
        }
    }
}

const ESCAPABLE: [char; 6] = ['$', '&', '%', '=', '{', '}'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Source text, escapes included.
    Text(String),
    Env(Vec<Node>),
    Config(Vec<Node>),
    Data(Vec<Node>),
    Formula(Vec<Node>),
}

impl Node {
    fn reference(sigil: Sigil, arg: Vec<Node>) -> Node {
        match sigil {
            Sigil::Env => Node::Env(arg),
            Sigil::Config => Node::Config(arg),
            Sigil::Data => Node::Data(arg),
            Sigil::Formula => Node::Formula(arg),
        }
    }

    /// Sigil and argument of a reference, `None` for text.
    pub fn as_reference(&self) -> Option<(Sigil, &[Node])> {
        match self {
            Node::Text(_) => None,
            Node::Env(arg) => Some((Sigil::Env, arg)),
            Node::Config(arg) => Some((Sigil::Config, arg)),
            Node::Data(arg) => Some((Sigil::Data, arg)),
            Node::Formula(arg) => Some((Sigil::Formula, arg)),
        }
    }
}

/// Renders the node back to source with every reference braced.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.as_reference()) {
            (Node::Text(text), _) => f.write_str(text),
            (_, None) => Ok(()),
            (_, Some((sigil, arg))) => {
                write!(f, "{}{{", sigil.as_char())?;
                for node in arg {
                    write!(f, "{node}")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed `{{` at offset {offset}")]
    Unclosed { offset: usize },

    #[error("references nested deeper than {max_depth} levels at offset {offset}")]
    TooDeep { offset: usize, max_depth: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub nodes: Vec<Node>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Template, TemplateError> {
        Self::parse_with_max_depth(text, DEFAULT_MAX_DEPTH)
    }

    pub fn parse_with_max_depth(text: &str, max_depth: usize) -> Result<Template, TemplateError> {
        let chars: Vec<char> = text.chars().collect();
        let mut parser = Parser {
            chars,
            pos: 0,
            depth: 0,
            max_depth,
        };

        let forced = match parser.chars.as_slice() {
            [first, second, ..] if *second != '{' => Sigil::from_char(*first),
            _ => None,
        };
        let nodes = match forced {
            Some(sigil) => {
                parser.enter()?;
                parser.pos = 1;
                let arg = parser.parts(false)?;
                vec![Node::reference(sigil, arg)]
            }
            None => parser.parts(false)?,
        };
        Ok(Template { nodes })
    }

    /// The only node, when the template is one reference and nothing else.
    pub fn single_reference(&self) -> Option<&Node> {
        match self.nodes.as_slice() {
            [node] if node.as_reference().is_some() => Some(node),
            _ => None,
        }
    }

    /// Whether the template contains no reference at all.
    pub fn is_literal(&self) -> bool {
        self.nodes.iter().all(|n| matches!(n, Node::Text(_)))
    }

    /// Concatenated source text of a literal template, escapes included.
    pub fn literal_text(&self) -> String {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    /// References currently open.
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn enter(&mut self) -> Result<(), TemplateError> {
        if self.depth >= self.max_depth {
            return Err(TemplateError::TooDeep {
                offset: self.pos,
                max_depth: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Parse parts until end of input, or until the `}` closing the current
    /// reference when `in_brace` is set.
    fn parts(&mut self, in_brace: bool) -> Result<Vec<Node>, TemplateError> {
        let open = self.pos;
        let mut nodes = Vec::new();
        let mut text = String::new();
        let mut depth = 0usize;

        while let Some(c) = self.peek(0) {
            if c == '\\' {
                if let Some(next) = self.peek(1).filter(|n| ESCAPABLE.contains(n)) {
                    text.push(c);
                    text.push(next);
                    self.pos += 2;
                    continue;
                }
            }
            if let (Some(sigil), Some('{')) = (Sigil::from_char(c), self.peek(1)) {
                if !text.is_empty() {
                    nodes.push(Node::Text(std::mem::take(&mut text)));
                }
                self.enter()?;
                self.pos += 2;
                let arg = self.parts(true)?;
                self.depth -= 1;
                nodes.push(Node::reference(sigil, arg));
                continue;
            }
            if in_brace {
                match c {
                    '{' => depth += 1,
                    '}' if depth == 0 => {
                        self.pos += 1;
                        if !text.is_empty() {
                            nodes.push(Node::Text(text));
                        }
                        return Ok(nodes);
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            text.push(c);
            self.pos += 1;
        }

        if in_brace {
            return Err(TemplateError::Unclosed {
                offset: open.saturating_sub(2),
            });
        }
        if !text.is_empty() {
            nodes.push(Node::Text(text));
        }
        Ok(nodes)
    }
}

/// Remove escape backslashes from source text.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if ESCAPABLE.contains(&next) {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}
