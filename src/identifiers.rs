//! Row identifier qualification against an owner namespace.
//!
//! Every stored identifier has the form `"{owner}.{local}"`. Identifiers that
//! already carry the owner's prefix are left alone; any other dotted prefix is
//! kept as part of the local id so batches from different sources cannot
//! collide.

use std::collections::HashMap;
use std::sync::OnceLock;

use log::warn;
use regex::Regex;

use crate::error::{Result, TemplateError};

/// Non-fatal conditions reported alongside a successful operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateWarning {
    AlreadyQualified { id: String },
    ForeignPrefix { raw: String, qualified: String },
    DuplicateRows { ids: Vec<String> },
    DuplicateColumns { columns: Vec<String> },
}

impl TemplateWarning {
    pub fn message(&self) -> String {
        match self {
            TemplateWarning::AlreadyQualified { id } => {
                format!("Identifier '{id}' is already qualified; left unchanged")
            }
            TemplateWarning::ForeignPrefix { raw, qualified } => {
                format!("Identifier '{raw}' carries another owner's prefix; stored as '{qualified}'")
            }
            TemplateWarning::DuplicateRows { ids } => format!(
                "Existing row(s) kept unchanged: {}",
                ids.join(", ")
            ),
            TemplateWarning::DuplicateColumns { columns } => format!(
                "Existing column(s) kept unchanged for existing rows: {}",
                columns.join(", ")
            ),
        }
    }

    pub(crate) fn log(self) -> Self {
        warn!("{}", self.message());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedIds {
    /// Qualified identifiers, in input order.
    pub ids: Vec<String>,
    pub warnings: Vec<TemplateWarning>,
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9.]+$").expect("identifier pattern"))
}

pub fn owner_prefix(owner: i64) -> String {
    format!("{owner}.")
}

/// Qualifies a single identifier, returning the warning it raises, if any.
pub fn qualify_one(owner: i64, raw: &str) -> (String, Option<TemplateWarning>) {
    let prefix = owner_prefix(owner);
    if raw.starts_with(&prefix) {
        return (
            raw.to_string(),
            Some(TemplateWarning::AlreadyQualified { id: raw.to_string() }),
        );
    }
    let qualified = format!("{prefix}{raw}");
    let foreign = raw
        .split_once('.')
        .is_some_and(|(head, _)| !head.is_empty() && head.bytes().all(|b| b.is_ascii_digit()));
    if foreign {
        let warning = TemplateWarning::ForeignPrefix {
            raw: raw.to_string(),
            qualified: qualified.clone(),
        };
        return (qualified, Some(warning));
    }
    (qualified, None)
}

/// Qualifies a batch of identifiers, rejecting collisions.
pub fn qualify(owner: i64, raw: &[String]) -> Result<QualifiedIds> {
    let mut ids = Vec::with_capacity(raw.len());
    let mut warnings = Vec::new();
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(raw.len());
    for original in raw {
        let (qualified, warning) = qualify_one(owner, original);
        if let Some(previous) = seen.insert(qualified.clone(), original) {
            return Err(TemplateError::Structure(format!(
                "Identifiers '{previous}' and '{original}' both resolve to '{qualified}'"
            )));
        }
        if let Some(warning) = warning {
            warnings.push(warning.log());
        }
        ids.push(qualified);
    }
    Ok(QualifiedIds { ids, warnings })
}

/// Local part of an identifier qualified for `owner`.
pub fn local_id(owner: i64, qualified: &str) -> Option<&str> {
    qualified
        .strip_prefix(&owner_prefix(owner))
        .filter(|local| !local.is_empty())
}

/// Fails on empty identifiers and identifiers outside `[A-Za-z0-9.]`.
pub fn validate_characters<'a, I>(ids: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let invalid: Vec<String> = ids
        .into_iter()
        .filter(|id| !identifier_pattern().is_match(id) || id.ends_with('.'))
        .map(str::to_string)
        .collect();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(TemplateError::InvalidIdentifierCharacters {
            identifiers: invalid,
        })
    }
}
