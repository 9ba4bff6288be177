//! RFC 4515 search filters
//!
//! Filters arrive as strings, are parsed into a [`Filter`] tree so that
//! DN-valued assertions can be rewritten, and are serialized back to the
//! canonical string form before being sent upstream. Assertion values are raw
//! bytes; hex escapes are decoded on parse and re-applied on display.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("filter is empty")]
    Empty,
    #[error("unbalanced parentheses at offset {0}")]
    Unbalanced(usize),
    #[error("invalid filter item: {0:?}")]
    InvalidItem(String),
    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),
    #[error("unexpected data after filter at offset {0}")]
    TrailingData(usize),
}

/// Parsed search filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality {
        attribute: String,
        value: Vec<u8>,
    },
    Substrings {
        attribute: String,
        initial: Option<Vec<u8>>,
        any: Vec<Vec<u8>>,
        last: Option<Vec<u8>>,
    },
    GreaterOrEqual {
        attribute: String,
        value: Vec<u8>,
    },
    LessOrEqual {
        attribute: String,
        value: Vec<u8>,
    },
    Present {
        attribute: String,
    },
    Approx {
        attribute: String,
        value: Vec<u8>,
    },
    Extensible {
        attribute: Option<String>,
        rule: Option<String>,
        dn_attributes: bool,
        value: Vec<u8>,
    },
}

impl Filter {
    /// Parse a filter string
    ///
    /// A bare item without surrounding parentheses (`uid=jane`) is accepted
    /// and treated as if it were parenthesized.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] on malformed input.
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(FilterError::Empty);
        }
        if !trimmed.starts_with('(') {
            return parse_item(trimmed);
        }

        let mut parser = Parser {
            input: trimmed.as_bytes(),
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != trimmed.len() {
            return Err(FilterError::TrailingData(parser.pos));
        }
        Ok(filter)
    }

    /// Visit every assertion that carries a single value
    ///
    /// The callback receives the attribute type (if any) and a mutable
    /// reference to the value. Substring pieces are not visited.
    pub fn visit_values<F>(&mut self, f: &mut F)
    where
        F: FnMut(Option<&str>, &mut Vec<u8>),
    {
        match self {
            Self::And(items) | Self::Or(items) => {
                for item in items {
                    item.visit_values(f);
                }
            }
            Self::Not(inner) => inner.visit_values(f),
            Self::Equality { attribute, value }
            | Self::GreaterOrEqual { attribute, value }
            | Self::LessOrEqual { attribute, value }
            | Self::Approx { attribute, value } => f(Some(attribute), value),
            Self::Extensible {
                attribute, value, ..
            } => f(attribute.as_deref(), value),
            Self::Substrings { .. } | Self::Present { .. } => {}
        }
    }
}

impl std::str::FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(items) => {
                f.write_str("(&")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Self::Or(items) => {
                f.write_str("(|")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Self::Not(inner) => write!(f, "(!{inner})"),
            Self::Equality { attribute, value } => {
                write!(f, "({attribute}={})", escape_value(value))
            }
            Self::GreaterOrEqual { attribute, value } => {
                write!(f, "({attribute}>={})", escape_value(value))
            }
            Self::LessOrEqual { attribute, value } => {
                write!(f, "({attribute}<={})", escape_value(value))
            }
            Self::Approx { attribute, value } => {
                write!(f, "({attribute}~={})", escape_value(value))
            }
            Self::Present { attribute } => write!(f, "({attribute}=*)"),
            Self::Substrings {
                attribute,
                initial,
                any,
                last,
            } => {
                write!(f, "({attribute}=")?;
                if let Some(initial) = initial {
                    f.write_str(&escape_value(initial))?;
                }
                f.write_str("*")?;
                for piece in any {
                    write!(f, "{}*", escape_value(piece))?;
                }
                if let Some(last) = last {
                    f.write_str(&escape_value(last))?;
                }
                f.write_str(")")
            }
            Self::Extensible {
                attribute,
                rule,
                dn_attributes,
                value,
            } => {
                f.write_str("(")?;
                if let Some(attribute) = attribute {
                    f.write_str(attribute)?;
                }
                if *dn_attributes {
                    f.write_str(":dn")?;
                }
                if let Some(rule) = rule {
                    write!(f, ":{rule}")?;
                }
                write!(f, ":={})", escape_value(value))
            }
        }
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn filter(&mut self) -> Result<Filter, FilterError> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                self.skip_spaces();
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => {
                let start = self.pos;
                while let Some(&b) = self.input.get(self.pos) {
                    if b == b')' || b == b'(' {
                        break;
                    }
                    self.pos += 1;
                }
                let item = std::str::from_utf8(&self.input[start..self.pos])
                    .map_err(|_| FilterError::InvalidItem(String::new()))?;
                parse_item(item)?
            }
            None => return Err(FilterError::Unbalanced(self.pos)),
        };
        self.skip_spaces();
        self.expect(b')')?;
        Ok(filter)
    }

    fn list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut items = Vec::new();
        loop {
            self.skip_spaces();
            match self.peek() {
                Some(b'(') => items.push(self.filter()?),
                Some(b')') => return Ok(items),
                _ => return Err(FilterError::Unbalanced(self.pos)),
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), FilterError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(FilterError::Unbalanced(self.pos))
        }
    }
}

fn parse_item(item: &str) -> Result<Filter, FilterError> {
    let invalid = || FilterError::InvalidItem(item.to_string());
    let eq = item.find('=').ok_or_else(invalid)?;
    let value = &item[eq + 1..];
    let (left, op) = match item[..eq].chars().last() {
        Some(op @ ('~' | '>' | '<' | ':')) => (&item[..eq - 1], Some(op)),
        _ => (&item[..eq], None),
    };
    let left = left.trim();

    if op == Some(':') {
        return parse_extensible(left, value).ok_or_else(invalid);
    }
    if left.is_empty() || !left.chars().all(is_attribute_char) {
        return Err(invalid());
    }
    let attribute = left.to_string();

    match op {
        Some('~') => Ok(Filter::Approx {
            attribute,
            value: unescape_value(value)?,
        }),
        Some('>') => Ok(Filter::GreaterOrEqual {
            attribute,
            value: unescape_value(value)?,
        }),
        Some('<') => Ok(Filter::LessOrEqual {
            attribute,
            value: unescape_value(value)?,
        }),
        _ if value == "*" => Ok(Filter::Present { attribute }),
        _ if value.contains('*') => {
            let pieces: Vec<&str> = value.split('*').collect();
            let mut decoded = pieces
                .iter()
                .map(|piece| unescape_value(piece))
                .collect::<Result<Vec<_>, _>>()?;
            let last = decoded.pop().filter(|v| !v.is_empty());
            let initial = Some(decoded.remove(0)).filter(|v| !v.is_empty());
            let any = decoded.into_iter().filter(|v| !v.is_empty()).collect();
            Ok(Filter::Substrings {
                attribute,
                initial,
                any,
                last,
            })
        }
        _ => Ok(Filter::Equality {
            attribute,
            value: unescape_value(value)?,
        }),
    }
}

fn parse_extensible(left: &str, value: &str) -> Option<Filter> {
    let mut parts = left.split(':');
    let first = parts.next()?.trim();
    let attribute = (!first.is_empty()).then(|| first.to_string());
    let mut dn_attributes = false;
    let mut rule = None;

    for part in parts {
        if part.eq_ignore_ascii_case("dn") && rule.is_none() {
            dn_attributes = true;
        } else if !part.is_empty() && rule.is_none() {
            rule = Some(part.to_string());
        } else {
            return None;
        }
    }
    if attribute.is_none() && rule.is_none() {
        return None;
    }

    Some(Filter::Extensible {
        attribute,
        rule,
        dn_attributes,
        value: unescape_value(value).ok()?,
    })
}

fn is_attribute_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ';'
}

/// Decode `\XX` escapes in an assertion value
fn unescape_value(value: &str) -> Result<Vec<u8>, FilterError> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let pair = bytes
            .get(i + 1..i + 3)
            .filter(|pair| pair.iter().all(u8::is_ascii_hexdigit))
            .ok_or(FilterError::InvalidEscape(i))?;
        let hex = std::str::from_utf8(pair).map_err(|_| FilterError::InvalidEscape(i))?;
        out.push(u8::from_str_radix(hex, 16).map_err(|_| FilterError::InvalidEscape(i))?);
        i += 3;
    }

    Ok(out)
}

/// Escape an assertion value for the string form of a filter
#[must_use]
pub fn escape_value(value: &[u8]) -> String {
    let mut out = String::with_capacity(value.len());
    match std::str::from_utf8(value) {
        Ok(text) => {
            for ch in text.chars() {
                match ch {
                    '*' | '(' | ')' | '\\' | '\0' => out.push_str(&format!("\\{:02x}", ch as u8)),
                    _ => out.push(ch),
                }
            }
        }
        Err(_) => {
            for byte in value {
                out.push_str(&format!("\\{byte:02x}"));
            }
        }
    }
    out
}
