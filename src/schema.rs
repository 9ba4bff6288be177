//! Attribute syntax lookup
//!
//! The rewrite layer only needs one fact from the schema: whether an
//! attribute type holds distinguished names.

use std::collections::HashSet;

/// Schema facts consumed by the rewrite layer
pub trait SchemaLookup: Send + Sync + std::fmt::Debug {
    /// True when values of `attribute` are DNs
    fn is_dn_valued(&self, attribute: &str) -> bool;
}

/// DN-syntax attribute types from the core and common schemas
const STANDARD_DN_ATTRIBUTES: &[&str] = &[
    "aliasedobjectname",
    "creatorsname",
    "distinguishedname",
    "entrydn",
    "manager",
    "member",
    "memberof",
    "modifiersname",
    "owner",
    "roleoccupant",
    "secretary",
    "seealso",
    "subschemasubentry",
    "uniquemember",
];

/// Fixed set of DN-valued attribute names, matched case-insensitively
#[derive(Debug, Clone)]
pub struct StaticSchema {
    dn_attributes: HashSet<String>,
}

impl StaticSchema {
    /// Standard attributes plus `extra`
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut schema = Self::default();
        schema
            .dn_attributes
            .extend(extra.into_iter().map(|s| s.as_ref().to_ascii_lowercase()));
        schema
    }
}

impl Default for StaticSchema {
    fn default() -> Self {
        Self {
            dn_attributes: STANDARD_DN_ATTRIBUTES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl SchemaLookup for StaticSchema {
    fn is_dn_valued(&self, attribute: &str) -> bool {
        // attribute options (member;range=0-99) do not change the syntax
        let base = attribute.split(';').next().unwrap_or(attribute);
        self.dn_attributes.contains(&base.to_ascii_lowercase())
    }
}
