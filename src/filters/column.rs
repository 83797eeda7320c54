// Filter columns - which tag field a facet filter groups tracks by
// Definitions come from config as {name, field} pairs and are read-only here

use super::error::{FilterError, Result};
use crate::library::track::KNOWN_FIELDS;
use crate::library::Track;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Shown for tracks that have no value for the column's field
pub const UNKNOWN_VALUE: &str = "?";

/// Column definition as stored in config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterColumn {
    pub name: String,
    pub field: String,
}

impl FilterColumn {
    pub fn new(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
        }
    }

    /// Parse the field expression into something a filter can evaluate
    pub fn compile(&self) -> Result<Facet> {
        Ok(Facet {
            name: self.name.clone(),
            expr: FieldExpr::parse(&self.field)?,
        })
    }
}

/// Parsed `%field%` / `%<field>%` expression.
///
/// The angle-bracket form marks a multi-value field: `Rock; Blues` yields two
/// facet values instead of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldExpr {
    pub field: String,
    pub multi_value: bool,
}

fn field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^%(?:<([a-z]+)>|([a-z]+))%$").expect("field expression pattern is valid")
    })
}

impl FieldExpr {
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim().to_ascii_lowercase();
        let captures = field_pattern()
            .captures(&trimmed)
            .ok_or_else(|| FilterError::InvalidFieldExpression(expression.to_string()))?;

        let (field, multi_value) = match (captures.get(1), captures.get(2)) {
            (Some(multi), _) => (multi.as_str(), true),
            (None, Some(single)) => (single.as_str(), false),
            (None, None) => return Err(FilterError::InvalidFieldExpression(expression.to_string())),
        };

        if !KNOWN_FIELDS.contains(&field) {
            return Err(FilterError::UnknownField {
                expression: expression.to_string(),
                field: field.to_string(),
            });
        }

        Ok(Self {
            field: field.to_string(),
            multi_value,
        })
    }

    /// Every facet value this track contributes; never empty
    pub fn values(&self, track: &Track) -> Vec<String> {
        let raw = match track.field(&self.field) {
            Some(value) if !value.trim().is_empty() => value,
            _ => return vec![UNKNOWN_VALUE.to_string()],
        };

        if !self.multi_value {
            return vec![raw.trim().to_string()];
        }

        let mut values: Vec<String> = Vec::new();
        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            if !values.iter().any(|v| v == part) {
                values.push(part.to_string());
            }
        }

        if values.is_empty() {
            values.push(UNKNOWN_VALUE.to_string());
        }
        values
    }
}

/// A compiled column: display name plus evaluator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facet {
    pub name: String,
    pub expr: FieldExpr,
}

impl Facet {
    pub fn values(&self, track: &Track) -> Vec<String> {
        self.expr.values(track)
    }

    /// Column predicate: does the track carry any of the selected values
    pub fn matches_any(&self, track: &Track, selected: &[String]) -> bool {
        self.values(track).iter().any(|v| selected.contains(v))
    }
}

/// Ordered set of columns filters can be built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterColumnRegistry {
    columns: Vec<FilterColumn>,
}

impl FilterColumnRegistry {
    pub fn new(columns: Vec<FilterColumn>) -> Self {
        Self { columns }
    }

    pub fn default_columns() -> Vec<FilterColumn> {
        vec![
            FilterColumn::new("Genre", "%<genre>%"),
            FilterColumn::new("Album Artist", "%<albumartist>%"),
            FilterColumn::new("Artist", "%<artist>%"),
            FilterColumn::new("Album", "%album%"),
            FilterColumn::new("Date", "%date%"),
        ]
    }

    pub fn columns(&self) -> &[FilterColumn] {
        &self.columns
    }

    /// Case-insensitive lookup by display name
    pub fn by_name(&self, name: &str) -> Option<&FilterColumn> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn by_index(&self, index: usize) -> Option<&FilterColumn> {
        self.columns.get(index)
    }
}

impl Default for FilterColumnRegistry {
    fn default() -> Self {
        Self::new(Self::default_columns())
    }
}
