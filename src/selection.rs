//! Atom selection language.
//!
//! Expressions are evaluated atom by atom against the structure's records:
//! - `name CA CB`: atom name is one of the values
//! - `resname ALA`: residue name
//! - `resid 1-10 15`: residue numbers, single values or ranges (`1:10` works too)
//! - `chain A` / `segid A`: chain identifier
//! - `element C`: element symbol
//! - `index 0-99`: zero-based atom index in the structure file
//! - `serial 1-100`: atom serial number from the structure file
//! - `hetero`: `HETATM` records
//! - `protein`, `backbone`, `sidechain`, `hydrogen`, `heavy`, `all`, `none`
//!
//! Combinators: `and`/`&&`, `or`/`||`, `not`/`!`, parentheses. Values may be
//! quoted to use a keyword as a literal name. An empty expression selects
//! every atom.

use crate::error::{ContactError, Result};
use crate::structure::{AtomRecord, System};

const STANDARD_AA: &[&str] = &[
    "GLY", "ALA", "SER", "CYS", "VAL", "ILE", "LEU", "THR", "ARG", "LYS", "ASP", "GLU", "ASN",
    "GLN", "MET", "HIS", "PRO", "PHE", "TYR", "TRP", "HIE", "HID", "HIP", "HSD", "HSE", "HSP",
    "CYX", "ASH", "GLH", "LYN",
];

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "all", "none", "protein", "backbone", "sidechain", "hydrogen", "heavy",
    "hetero", "name", "resname", "resid", "chain", "segid", "element", "index", "serial",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Not,
    And,
    Or,
    Word(String),
    Quoted(String),
}

impl Token {
    fn text(&self) -> String {
        match self {
            Token::Open => "(".into(),
            Token::Close => ")".into(),
            Token::Not => "!".into(),
            Token::And => "&&".into(),
            Token::Or => "||".into(),
            Token::Word(w) | Token::Quoted(w) => w.clone(),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    start: i64,
    end: i64,
}

impl Range {
    fn contains(&self, value: i64) -> bool {
        value >= self.start && value <= self.end
    }
}

/// Parsed selection AST node.
#[derive(Debug, Clone, PartialEq)]
enum Selector {
    All,
    None,
    Protein,
    Backbone,
    SideChain,
    Hydrogen,
    Heavy,
    Hetero,
    Name(Vec<String>),
    ResName(Vec<String>),
    ResId(Vec<Range>),
    Chain(Vec<char>),
    Element(Vec<String>),
    Index(Vec<Range>),
    Serial(Vec<Range>),
    Not(Box<Selector>),
    And(Box<Selector>, Box<Selector>),
    Or(Box<Selector>, Box<Selector>),
}

impl Selector {
    fn matches(&self, index: usize, atom: &AtomRecord) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Protein => STANDARD_AA
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&atom.resname)),
            Self::Backbone => atom.is_backbone(),
            Self::SideChain => !atom.is_backbone() && !atom.is_hydrogen(),
            Self::Hydrogen => atom.is_hydrogen(),
            Self::Heavy => !atom.is_hydrogen(),
            Self::Hetero => atom.is_hetero,
            Self::Name(names) => names.iter().any(|n| n.eq_ignore_ascii_case(&atom.name)),
            Self::ResName(names) => names.iter().any(|n| n.eq_ignore_ascii_case(&atom.resname)),
            Self::ResId(ranges) => ranges.iter().any(|r| r.contains(atom.resid as i64)),
            Self::Chain(ids) => ids.contains(&atom.chain),
            Self::Element(elems) => elems.iter().any(|e| e.eq_ignore_ascii_case(&atom.element)),
            Self::Index(ranges) => ranges.iter().any(|r| r.contains(index as i64)),
            Self::Serial(ranges) => ranges.iter().any(|r| r.contains(atom.serial)),
            Self::Not(inner) => !inner.matches(index, atom),
            Self::And(l, r) => l.matches(index, atom) && r.matches(index, atom),
            Self::Or(l, r) => l.matches(index, atom) || r.matches(index, atom),
        }
    }
}

/// A compiled selection expression.
#[derive(Debug, Clone)]
pub struct Selection {
    expression: String,
    root: Selector,
}

impl Selection {
    /// Compile `expression`, failing with [`ContactError::InvalidSelection`]
    /// on any syntax error.
    pub fn parse(expression: &str) -> Result<Self> {
        let invalid = |reason: String| ContactError::InvalidSelection {
            expression: expression.to_string(),
            reason,
        };
        let tokens = tokenize(expression).map_err(invalid)?;
        let root = if tokens.is_empty() {
            Selector::All
        } else {
            let mut parser = Parser::new(tokens);
            let sel = parser.parse_expr().map_err(invalid)?;
            if let Some(extra) = parser.peek() {
                return Err(invalid(format!(
                    "unexpected token '{}' at position {}",
                    extra.text(),
                    parser.pos
                )));
            }
            sel
        };
        Ok(Self {
            expression: expression.to_string(),
            root,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn matches(&self, index: usize, atom: &AtomRecord) -> bool {
        self.root.matches(index, atom)
    }

    /// Keep the candidate atom indices that match, preserving their order.
    pub fn select(&self, system: &System, candidates: &[usize]) -> Vec<usize> {
        candidates
            .iter()
            .copied()
            .filter(|&i| self.matches(i, &system.atoms[i]))
            .collect()
    }
}

// ── Parser ──────────────────────────────────────────────────────────────────

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(ch) {
                    return Err(format!("expected '{ch}{ch}'"));
                }
                tokens.push(if ch == '&' { Token::And } else { Token::Or });
            }
            '\'' | '"' => {
                chars.next();
                let mut word = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == ch => break,
                        Some(c) => word.push(c),
                        None => return Err("unterminated quoted value".into()),
                    }
                }
                tokens.push(Token::Quoted(word));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || "()!&|'\"".contains(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = std::result::Result<T, String>;

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_or(&self) -> bool {
        self.peek()
            .map(|t| *t == Token::Or || t.is_keyword("or"))
            .unwrap_or(false)
    }

    fn at_and(&self) -> bool {
        self.peek()
            .map(|t| *t == Token::And || t.is_keyword("and"))
            .unwrap_or(false)
    }

    fn at_not(&self) -> bool {
        self.peek()
            .map(|t| *t == Token::Not || t.is_keyword("not"))
            .unwrap_or(false)
    }

    fn parse_expr(&mut self) -> ParseResult<Selector> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Selector> {
        let mut left = self.parse_and()?;
        while self.at_or() {
            self.next();
            let right = self.parse_and()?;
            left = Selector::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Selector> {
        let mut left = self.parse_not()?;
        while self.at_and() {
            self.next();
            let right = self.parse_not()?;
            left = Selector::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Selector> {
        if self.at_not() {
            self.next();
            let inner = self.parse_not()?;
            Ok(Selector::Not(Box::new(inner)))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Selector> {
        let token = self.next().ok_or("unexpected end of selection")?;
        let word = match token {
            Token::Open => {
                let inner = self.parse_expr()?;
                return match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err("expected ')'".into()),
                };
            }
            Token::Word(w) => w.to_lowercase(),
            other => return Err(format!("unexpected token '{}'", other.text())),
        };

        match word.as_str() {
            "all" => Ok(Selector::All),
            "none" => Ok(Selector::None),
            "protein" => Ok(Selector::Protein),
            "backbone" => Ok(Selector::Backbone),
            "sidechain" => Ok(Selector::SideChain),
            "hydrogen" => Ok(Selector::Hydrogen),
            "heavy" => Ok(Selector::Heavy),
            "hetero" => Ok(Selector::Hetero),
            "name" => Ok(Selector::Name(self.parse_values(&word)?)),
            "resname" => Ok(Selector::ResName(self.parse_values(&word)?)),
            "element" => Ok(Selector::Element(self.parse_values(&word)?)),
            "chain" | "segid" => {
                let vals = self.parse_values(&word)?;
                let mut ids = Vec::with_capacity(vals.len());
                for v in vals {
                    let mut chars = v.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => ids.push(c),
                        _ => return Err(format!("chain identifiers are single characters, got '{v}'")),
                    }
                }
                Ok(Selector::Chain(ids))
            }
            "resid" => Ok(Selector::ResId(self.parse_ranges(&word)?)),
            "serial" => Ok(Selector::Serial(self.parse_ranges(&word)?)),
            "index" => {
                let ranges = self.parse_ranges(&word)?;
                if ranges.iter().any(|r| r.start < 0) {
                    return Err("atom indices cannot be negative".into());
                }
                Ok(Selector::Index(ranges))
            }
            _ => Err(format!("unexpected token '{word}'")),
        }
    }

    /// Consume one or more non-keyword values (for multi-value: `name CA CB C`).
    fn parse_values(&mut self, keyword: &str) -> ParseResult<Vec<String>> {
        let mut vals = Vec::new();
        while let Some(token) = self.peek() {
            match token {
                Token::Quoted(v) => vals.push(v.clone()),
                Token::Word(v) if !KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(v)) => {
                    vals.push(v.clone())
                }
                _ => break,
            }
            self.pos += 1;
        }
        if vals.is_empty() {
            return Err(format!("expected value after '{keyword}'"));
        }
        Ok(vals)
    }

    fn parse_ranges(&mut self, keyword: &str) -> ParseResult<Vec<Range>> {
        let mut ranges = Vec::new();
        for val in self.parse_values(keyword)? {
            // "5", "1-10" or "1:10"; a leading '-' is a negative number
            let sep = val
                .char_indices()
                .skip(1)
                .find(|&(_, c)| c == '-' || c == ':')
                .map(|(i, _)| i);
            let bad = || format!("bad {keyword} value '{val}'");
            let range = match sep {
                Some(sep) => Range {
                    start: val[..sep].parse().map_err(|_| bad())?,
                    end: val[sep + 1..].parse().map_err(|_| bad())?,
                },
                None => {
                    let id = val.parse().map_err(|_| bad())?;
                    Range { start: id, end: id }
                }
            };
            if range.start > range.end {
                return Err(format!("empty {keyword} range '{val}'"));
            }
            ranges.push(range);
        }
        Ok(ranges)
    }
}
