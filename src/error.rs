//! Error taxonomy for template reconciliation.
//!
//! Validation failures are raised before the store is touched. Store failures
//! surface as [`TemplateError::ExecutionFailure`] after the enclosing unit of
//! work has been rolled back.

use thiserror::Error;

use crate::kind::KindTag;

pub type Result<T> = std::result::Result<T, TemplateError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    #[error("Unknown {entity} '{id}'")]
    UnknownIdentifier { entity: &'static str, id: String },

    #[error("{kind} template already exists for owner {owner}")]
    DuplicateEntity { kind: KindTag, owner: i64 },

    #[error("Duplicate column headers after normalization: {}", columns.join(", "))]
    DuplicateHeader { columns: Vec<String> },

    #[error("Missing required column(s): {}", columns.join(", "))]
    MissingRequiredColumn { columns: Vec<String> },

    #[error("Column '{column}' cannot be used: {reason}")]
    ForbiddenColumn { column: String, reason: String },

    #[error("Identifiers contain characters outside [A-Za-z0-9.]: {}", identifiers.join(", "))]
    InvalidIdentifierCharacters { identifiers: Vec<String> },

    #[error("Category '{category}' does not exist in the template")]
    UnknownCategory { category: String },

    #[error("Cannot store '{value}' in column '{column}': {reason}")]
    TypeCoercion {
        column: String,
        value: String,
        reason: String,
    },

    #[error("Statement failed ({statement}): {reason}")]
    ExecutionFailure { statement: String, reason: String },

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("{kind} template {owner} is referenced by {count} derived artifact(s)")]
    DependencyExists {
        kind: KindTag,
        owner: i64,
        count: usize,
    },

    #[error("Expected a {expected} template but got a {actual} template")]
    WrongTemplateKind { expected: KindTag, actual: KindTag },

    #[error("{0}")]
    Structure(String),
}

impl TemplateError {
    pub(crate) fn unknown_id(entity: &'static str, id: impl Into<String>) -> Self {
        TemplateError::UnknownIdentifier {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn execution(statement: &str, reason: impl ToString) -> Self {
        TemplateError::ExecutionFailure {
            statement: statement.split_whitespace().collect::<Vec<_>>().join(" "),
            reason: reason.to_string(),
        }
    }

    /// True for the errors a mapping-style `get` folds into an absent value.
    pub fn is_missing_key(&self) -> bool {
        matches!(
            self,
            TemplateError::UnknownIdentifier { .. } | TemplateError::UnknownCategory { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_failure_collapses_statement_whitespace() {
        let err = TemplateError::execution("CREATE TABLE x\n   (a integer)", "syntax error");
        assert_eq!(
            err.to_string(),
            "Statement failed (CREATE TABLE x (a integer)): syntax error"
        );
    }

    #[test]
    fn missing_key_covers_unknown_lookups_only() {
        assert!(TemplateError::unknown_id("sample", "2.X").is_missing_key());
        assert!(
            TemplateError::UnknownCategory {
                category: "depth".into()
            }
            .is_missing_key()
        );
        assert!(!TemplateError::NotImplemented("x".into()).is_missing_key());
    }
}
