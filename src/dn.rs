//! Distinguished names
//!
//! A [`Dn`] keeps the components as the client spelled them (for display and
//! for forwarding) next to a normalized form used for every comparison:
//! attribute types and values are case-folded, value whitespace is collapsed
//! and the AVAs of a multi-valued RDN are sorted. Two DNs are equal when their
//! normalized forms are equal.
//!
//! The empty string parses to the root DN, which is an ancestor of every DN.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing a distinguished name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    /// A component was empty or had no `=`
    #[error("invalid distinguished name component: {0:?}")]
    InvalidComponent(String),
    /// A component was missing the attribute name to the left of the `=`
    #[error("distinguished name component missing attribute: {0:?}")]
    MissingAttribute(String),
    /// The value ended with a lone backslash
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
    /// Hex escapes decoded to bytes that are not UTF-8
    #[error("distinguished name value is not valid UTF-8 after unescaping")]
    InvalidUtf8,
}

/// One attribute type and value assertion inside an RDN
#[derive(Debug, Clone)]
pub struct Ava {
    attribute: String,
    value: String,
}

impl Ava {
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    fn normalized(&self) -> String {
        format!(
            "{}={}",
            self.attribute.to_ascii_lowercase(),
            escape(&normalize_value(&self.value))
        )
    }
}

/// Relative distinguished name, one or more `+`-joined AVAs
#[derive(Debug, Clone)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    /// Parse a single RDN such as `cn=Jane Doe` or `cn=a+uid=1`
    ///
    /// # Errors
    ///
    /// Returns [`DnError`] when the text is empty, contains an unescaped `,`
    /// or is otherwise malformed.
    pub fn parse(input: &str) -> Result<Self, DnError> {
        let parts = split_escaped(input.trim(), ',')?;
        match parts.as_slice() {
            [single] => parse_rdn(single),
            _ => Err(DnError::InvalidComponent(input.to_string())),
        }
    }

    #[must_use]
    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    fn normalized(&self) -> String {
        let mut parts: Vec<String> = self.avas.iter().map(Ava::normalized).collect();
        parts.sort();
        parts.join("+")
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ava) in self.avas.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{}={}", ava.attribute, escape(&ava.value))?;
        }
        Ok(())
    }
}

/// A parsed distinguished name, leaf RDN first
#[derive(Debug, Clone)]
pub struct Dn {
    rdns: Vec<Rdn>,
    /// Normalized RDN strings, same order as `rdns`
    norm: Vec<String>,
}

impl Dn {
    /// The root DN (zero RDNs)
    #[must_use]
    pub fn root() -> Self {
        Self {
            rdns: Vec::new(),
            norm: Vec::new(),
        }
    }

    /// Parse a DN in RFC 4514 string form
    ///
    /// # Errors
    ///
    /// Returns [`DnError`] when a component is malformed.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, DnError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Ok(Self::root());
        }

        let rdns = split_escaped(raw, ',')?
            .iter()
            .map(|component| parse_rdn(component))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_rdns(rdns))
    }

    fn from_rdns(rdns: Vec<Rdn>) -> Self {
        let norm = rdns.iter().map(Rdn::normalized).collect();
        Self { rdns, norm }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of RDNs
    #[must_use]
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    #[must_use]
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Leaf RDN, `None` for the root
    #[must_use]
    pub fn first_rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// Normalized string form, suitable as a map key
    #[must_use]
    pub fn normalized(&self) -> String {
        self.norm.join(",")
    }

    /// True when `self` equals `ancestor` or lies below it
    #[must_use]
    pub fn is_within(&self, ancestor: &Dn) -> bool {
        let n = ancestor.norm.len();
        self.norm.len() >= n && self.norm[self.norm.len() - n..] == ancestor.norm[..]
    }

    /// True when `self` lies strictly below `ancestor`
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        self.norm.len() > ancestor.norm.len() && self.is_within(ancestor)
    }

    /// True when `self` is exactly one level below `parent`
    #[must_use]
    pub fn is_child_of(&self, parent: &Dn) -> bool {
        self.norm.len() == parent.norm.len() + 1 && self.is_within(parent)
    }

    /// Parent DN, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        Some(Self {
            rdns: self.rdns[1..].to_vec(),
            norm: self.norm[1..].to_vec(),
        })
    }

    /// Replace the `from` suffix with `to`, keeping the leading RDNs as spelled
    ///
    /// Returns `None` when `self` is not within `from`.
    #[must_use]
    pub fn replace_suffix(&self, from: &Dn, to: &Dn) -> Option<Dn> {
        if !self.is_within(from) {
            return None;
        }
        let keep = self.rdns.len() - from.rdns.len();
        let mut rdns = self.rdns[..keep].to_vec();
        rdns.extend(to.rdns.iter().cloned());
        let mut norm = self.norm[..keep].to_vec();
        norm.extend(to.norm.iter().cloned());
        Some(Self { rdns, norm })
    }

    /// A new DN with `rdn` prepended
    #[must_use]
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.norm == other.norm
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.norm.hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.norm.cmp(&other.norm)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl FromStr for Dn {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Dn {
    type Error = DnError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

fn parse_rdn(component: &str) -> Result<Rdn, DnError> {
    let avas = split_escaped(component, '+')?
        .iter()
        .map(|part| split_attribute_value(part))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Rdn { avas })
}

/// Split on an unescaped delimiter, keeping escapes intact for later decoding
fn split_escaped(input: &str, delimiter: char) -> Result<Vec<String>, DnError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            current.push(ch);
            escape = false;
            continue;
        }
        if ch == '\\' {
            current.push(ch);
            escape = true;
            continue;
        }
        if ch == delimiter {
            parts.push(current.trim().to_string());
            current.clear();
            continue;
        }
        current.push(ch);
    }

    if escape {
        return Err(DnError::UnterminatedEscape);
    }

    parts.push(current.trim().to_string());
    if parts.iter().any(String::is_empty) {
        return Err(DnError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn split_attribute_value(component: &str) -> Result<Ava, DnError> {
    let mut escape = false;
    let mut index = None;

    for (i, ch) in component.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if ch == '\\' {
            escape = true;
            continue;
        }
        if ch == '=' {
            index = Some(i);
            break;
        }
    }

    let idx = index.ok_or_else(|| DnError::InvalidComponent(component.to_string()))?;
    let attribute = component[..idx].trim();
    if attribute.is_empty() {
        return Err(DnError::MissingAttribute(component.to_string()));
    }
    let value = unescape(component[idx + 1..].trim_start())?;
    Ok(Ava::new(attribute, value))
}

/// Decode `\c` and `\XX` escapes
fn unescape(value: &str) -> Result<String, DnError> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let next = bytes.get(i + 1).ok_or(DnError::UnterminatedEscape)?;
        let hex = bytes
            .get(i + 1..i + 3)
            .filter(|pair| pair.iter().all(u8::is_ascii_hexdigit))
            .and_then(|pair| std::str::from_utf8(pair).ok())
            .and_then(|pair| u8::from_str_radix(pair, 16).ok());
        match hex {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(*next);
                i += 2;
            }
        }
    }

    String::from_utf8(out).map_err(|_| DnError::InvalidUtf8)
}

/// RFC 4514 escaping for an attribute value
pub fn escape(value: &str) -> String {
    let count = value.chars().count();
    let mut escaped = String::with_capacity(value.len());

    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && (ch == ' ' || ch == '#'))
            || (idx + 1 == count && ch == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

fn normalize_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    #[test]
    fn test_parse_simple_dn() {
        let d = dn("cn=John Doe,ou=People,dc=example,dc=com");
        assert_eq!(d.depth(), 4);
        assert_eq!(d.to_string(), "cn=John Doe,ou=People,dc=example,dc=com");
        assert_eq!(d.first_rdn().unwrap().avas()[0].value(), "John Doe");
    }

    #[test]
    fn test_empty_is_root() {
        let root = dn("");
        assert!(root.is_root());
        assert!(dn("dc=com").is_within(&root));
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_equality_ignores_case_and_spacing() {
        assert_eq!(dn("CN=John  Doe, OU=People"), dn("cn=john doe,ou=people"));
        assert_ne!(dn("cn=a,ou=people"), dn("cn=b,ou=people"));
    }

    #[test]
    fn test_multi_valued_rdn_order_insensitive() {
        assert_eq!(dn("cn=a+uid=1,dc=x"), dn("uid=1+cn=a,dc=x"));
    }

    #[test]
    fn test_escaped_comma_in_value() {
        let d = dn("cn=Smith\\, John,ou=People");
        assert_eq!(d.depth(), 2);
        assert_eq!(d.first_rdn().unwrap().avas()[0].value(), "Smith, John");
        assert_eq!(d.to_string(), "cn=Smith\\, John,ou=People");
    }

    #[test]
    fn test_hex_escape_decoded() {
        let d = dn("cn=a\\2Cb,dc=x");
        assert_eq!(d.first_rdn().unwrap().avas()[0].value(), "a,b");
        assert_eq!(d, dn("cn=a\\,b,dc=x"));
    }

    #[test]
    fn test_invalid_dns() {
        assert!(matches!(
            Dn::parse("cn=John,"),
            Err(DnError::InvalidComponent(_))
        ));
        assert!(matches!(
            Dn::parse("=value"),
            Err(DnError::MissingAttribute(_))
        ));
        assert!(matches!(Dn::parse("novalue"), Err(DnError::InvalidComponent(_))));
        assert_eq!(Dn::parse("cn=a\\"), Err(DnError::UnterminatedEscape));
    }

    #[test]
    fn test_ancestry() {
        let base = dn("ou=people,dc=example,dc=com");
        let child = dn("uid=jane,ou=People,dc=example,dc=com");
        let grandchild = dn("cn=x,uid=jane,ou=people,dc=example,dc=com");

        assert!(child.is_within(&base));
        assert!(base.is_within(&base));
        assert!(!base.is_descendant_of(&base));
        assert!(child.is_child_of(&base));
        assert!(!grandchild.is_child_of(&base));
        assert!(grandchild.is_descendant_of(&base));
        assert!(!base.is_within(&child));
        assert!(!dn("ou=groups,dc=example,dc=com").is_within(&base));
    }

    #[test]
    fn test_replace_suffix_keeps_leading_spelling() {
        let client = dn("uid=Jane,ou=People,dc=example,dc=com");
        let from = dn("dc=example,dc=com");
        let to = dn("o=corp");
        let upstream = client.replace_suffix(&from, &to).unwrap();
        assert_eq!(upstream.to_string(), "uid=Jane,ou=People,o=corp");
        assert_eq!(upstream.replace_suffix(&to, &from).unwrap(), client);
        assert!(dn("dc=other").replace_suffix(&from, &to).is_none());
    }

    #[test]
    fn test_parent_and_child() {
        let d = dn("uid=jane,ou=people,dc=com");
        let parent = d.parent().unwrap();
        assert_eq!(parent, dn("ou=people,dc=com"));
        let back = parent.child(Rdn::parse("uid=jane").unwrap());
        assert_eq!(back, d);
    }

    #[test]
    fn test_rdn_parse_rejects_multiple_components() {
        assert!(Rdn::parse("cn=a").is_ok());
        assert!(Rdn::parse("cn=a,dc=b").is_err());
        assert!(Rdn::parse("").is_err());
    }

    #[test]
    fn test_escape_leading_and_trailing() {
        assert_eq!(escape(" a "), "\\ a\\ ");
        assert_eq!(escape("#x"), "\\#x");
        assert_eq!(escape("a=b"), "a\\=b");
    }
}
