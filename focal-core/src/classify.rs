//! Call-Site Classification
//!
//! Build-time tooling (debug labelling, hot-reload registration) needs to
//! know which call expressions construct a cell. This module answers that
//! question by name, over a minimal expression model that can be fed from a
//! JSON AST dump.
//!
//! A call is a cell constructor when:
//!
//! 1. its callee is a bare identifier naming one of [`CELL_CONSTRUCTORS`], or
//! 2. its callee is a member access whose property is an identifier naming
//!    one of [`CELL_CONSTRUCTORS`] or one of the configured custom names.
//!
//! Custom names only apply to member access; a bare call to a custom name
//! is not recognized.

use serde::Deserialize;

/// Constructor names recognized without configuration.
pub const CELL_CONSTRUCTORS: &[&str] = &[
    "abortable_cell",
    "cell",
    "cell_family",
    "cell_with_default",
    "cell_with_hash",
    "cell_with_immer",
    "cell_with_infinite_query",
    "cell_with_machine",
    "cell_with_mutation",
    "cell_with_observable",
    "cell_with_proxy",
    "cell_with_query",
    "cell_with_reducer",
    "cell_with_reset",
    "cell_with_subscription",
    "cell_with_storage",
    "cell_with_store",
    "freeze_cell",
    "loadable",
    "select_cell",
    "split_cell",
];

/// Errors loading a [`ClassifierConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid classifier config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("custom cell name must not be empty")]
    EmptyName,
}

/// Options for [`is_cell_constructor`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassifierConfig {
    /// Extra names recognized as the property of a member-access callee.
    pub custom_cell_names: Vec<String>,
}

impl ClassifierConfig {
    /// Config that also recognizes `custom_cell_names`.
    pub fn new<I, N>(custom_cell_names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            custom_cell_names: custom_cell_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a config such as `{"customCellNames": ["counter"]}`.
    ///
    /// Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if config.custom_cell_names.iter().any(String::is_empty) {
            return Err(ConfigError::EmptyName);
        }
        Ok(config)
    }

    fn recognizes_member(&self, name: &str) -> bool {
        CELL_CONSTRUCTORS.contains(&name) || self.custom_cell_names.iter().any(|n| n == name)
    }
}

/// The callee of a call expression.
///
/// Only the shapes classification looks at are modelled; everything else
/// deserializes as [`Expr::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum Expr {
    Identifier {
        name: String,
    },
    #[serde(rename = "MemberExpression")]
    Member {
        object: Box<Expr>,
        property: Box<Expr>,
    },
    StringLiteral {
        value: String,
    },
    #[serde(other)]
    Other,
}

impl Expr {
    /// An identifier expression.
    pub fn ident(name: impl Into<String>) -> Self {
        Self::Identifier { name: name.into() }
    }

    /// A member expression `object.property`.
    pub fn member(object: Expr, property: Expr) -> Self {
        Self::Member {
            object: Box::new(object),
            property: Box::new(property),
        }
    }

    fn as_ident(&self) -> Option<&str> {
        match self {
            Self::Identifier { name } => Some(name),
            _ => None,
        }
    }
}

/// Whether a call to `callee` constructs a cell.
pub fn is_cell_constructor(callee: &Expr, config: &ClassifierConfig) -> bool {
    match callee {
        Expr::Identifier { name } => CELL_CONSTRUCTORS.contains(&name.as_str()),
        Expr::Member { property, .. } => property
            .as_ident()
            .is_some_and(|name| config.recognizes_member(name)),
        _ => false,
    }
}
