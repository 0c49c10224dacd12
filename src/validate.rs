//! Structural validation of a candidate table.
//!
//! Normalizes headers and identifiers, checks required columns, and splits
//! the table into a required subframe and a dynamic subframe with every value
//! already cast to the type it will be stored as. Only reads the store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use itertools::Itertools;
use log::debug;
use regex::Regex;

use crate::{
    catalog::{self, Vocabulary},
    frame::MetadataTable,
    identifiers::{self, TemplateWarning},
    kind::{REQUIRED_TARGET_GENE_COLS, TARGET_GENE_DATA_TYPES, TemplateKind},
    schema::{ColumnType, infer_column_type},
    store::Store,
    error::{Result, TemplateError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Extend,
    Update,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTable {
    /// Required columns present in the input; vocabulary labels already resolved to ids.
    pub required: MetadataTable,
    pub dynamic: MetadataTable,
    /// Dynamic columns absent from the catalog, with their inferred type.
    pub new_columns: BTreeMap<String, ColumnType>,
    /// Catalog entries for the owner at validation time.
    pub known_columns: BTreeMap<String, ColumnType>,
    pub warnings: Vec<TemplateWarning>,
}

impl ValidatedTable {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.required.ids()
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.new_columns
            .get(column)
            .or_else(|| self.known_columns.get(column))
            .copied()
    }
}

fn column_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("column pattern"))
}

/// Lower-cases and renames headers, rejecting collisions and unusable names.
pub fn normalize_headers(kind: &TemplateKind, columns: &[String]) -> Result<Vec<String>> {
    let mut normalized = Vec::with_capacity(columns.len());
    let mut origins: HashMap<String, Vec<&str>> = HashMap::new();
    for original in columns {
        let lowered = original.trim().to_ascii_lowercase();
        let name = kind.rename(&lowered).map(str::to_string).unwrap_or(lowered);
        origins.entry(name.clone()).or_default().push(original);
        normalized.push(name);
    }

    let duplicates: Vec<String> = origins
        .iter()
        .filter(|(_, sources)| sources.len() > 1)
        .flat_map(|(_, sources)| sources.iter().map(|s| s.to_string()))
        .sorted()
        .collect();
    if !duplicates.is_empty() {
        return Err(TemplateError::DuplicateHeader {
            columns: duplicates,
        });
    }

    for name in &normalized {
        if kind.reserved_columns().contains(&name.as_str()) {
            return Err(TemplateError::ForbiddenColumn {
                column: name.clone(),
                reason: "reserved for the row key".to_string(),
            });
        }
        if kind.required_column(name).is_some() && !kind.is_required(name) {
            return Err(TemplateError::ForbiddenColumn {
                column: name.clone(),
                reason: "internal vocabulary id column".to_string(),
            });
        }
        if !column_pattern().is_match(name) {
            return Err(TemplateError::ForbiddenColumn {
                column: name.clone(),
                reason: "names must match [a-z_][a-z0-9_]*".to_string(),
            });
        }
    }
    Ok(normalized)
}

/// Required columns absent from `columns`, sorted.
pub fn missing_required(kind: &TemplateKind, columns: &[String]) -> Vec<String> {
    kind.required_names()
        .filter(|name| !columns.iter().any(|c| c == name))
        .map(str::to_string)
        .sorted()
        .collect()
}

fn check_target_gene(kind: &TemplateKind, table: &MetadataTable) -> Result<()> {
    if !kind.target_gene_check {
        return Ok(());
    }
    let Some(index) = table.column_index("data_type") else {
        return Ok(());
    };
    let is_target_gene = table
        .column_values(index)
        .flatten()
        .any(|value| TARGET_GENE_DATA_TYPES.contains(&value.as_display().trim()));
    if !is_target_gene {
        return Ok(());
    }
    let missing: Vec<String> = REQUIRED_TARGET_GENE_COLS
        .iter()
        .filter(|name| table.column_index(name).is_none())
        .map(|name| name.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TemplateError::MissingRequiredColumn { columns: missing })
    }
}

pub struct Validator<'a> {
    store: &'a dyn Store,
    kind: &'static TemplateKind,
    owner: i64,
}

impl<'a> Validator<'a> {
    pub fn new(store: &'a dyn Store, kind: &'static TemplateKind, owner: i64) -> Self {
        Self { store, kind, owner }
    }

    /// Validates `table` for `mode` given the identifiers already stored.
    pub fn validate(
        &self,
        table: &MetadataTable,
        mode: Mode,
        existing: &BTreeSet<String>,
    ) -> Result<ValidatedTable> {
        if table.is_empty() && mode != Mode::Update {
            return Err(TemplateError::Structure(
                "The metadata table has no rows".to_string(),
            ));
        }

        let mut normalized = table.clone();
        normalized.rename_columns(normalize_headers(self.kind, table.columns())?);

        let raw_ids: Vec<String> = table.ids().map(str::to_string).collect();
        identifiers::validate_characters(raw_ids.iter().map(String::as_str))?;
        let qualified = identifiers::qualify(self.owner, &raw_ids)?;
        identifiers::validate_characters(qualified.ids.iter().map(String::as_str))?;
        normalized.rename_rows(qualified.ids.clone());

        let has_new_rows = qualified.ids.iter().any(|id| !existing.contains(id));
        let needs_all_required = match mode {
            Mode::Create => true,
            Mode::Extend => has_new_rows,
            Mode::Update => false,
        };
        if needs_all_required {
            let missing = missing_required(self.kind, normalized.columns());
            if !missing.is_empty() {
                return Err(TemplateError::MissingRequiredColumn { columns: missing });
            }
        }
        if mode == Mode::Create {
            check_target_gene(self.kind, &normalized)?;
        }
        if mode == Mode::Update {
            let unknown: Vec<&str> = qualified
                .ids
                .iter()
                .filter(|id| !existing.contains(*id))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(TemplateError::Structure(format!(
                    "Update references rows not in the template: {}",
                    unknown.join(", ")
                )));
            }
        }

        let known_columns = catalog::dynamic_columns(self.store, self.kind, self.owner)?;
        let (required_columns, dynamic_columns): (Vec<String>, Vec<String>) = normalized
            .columns()
            .iter()
            .cloned()
            .partition(|name| self.kind.is_required(name));

        let new_names: Vec<&String> = dynamic_columns
            .iter()
            .filter(|name| !known_columns.contains_key(*name))
            .collect();
        if mode == Mode::Update && !new_names.is_empty() {
            return Err(TemplateError::Structure(format!(
                "Update references columns not in the template: {}",
                new_names.iter().join(", ")
            )));
        }

        let all_ids: BTreeSet<String> = qualified.ids.iter().cloned().collect();
        let mut required = normalized.select(&all_ids, &required_columns);
        let mut dynamic = normalized.select(&all_ids, &dynamic_columns);
        if mode == Mode::Extend {
            // Stored rows keep their values for every column the template already has.
            clear_stored_cells(&mut required, existing, |_| true);
            clear_stored_cells(&mut dynamic, existing, |name| known_columns.contains_key(name));
        }
        self.cast_required(&mut required)?;

        let mut new_columns = BTreeMap::new();
        for (index, name) in dynamic_columns.iter().enumerate() {
            let declared = match known_columns.get(name) {
                Some(ty) => *ty,
                None => {
                    let inferred = infer_column_type(dynamic.column_values(index));
                    new_columns.insert(name.clone(), inferred);
                    inferred
                }
            };
            cast_column(&mut dynamic, index, name, declared)?;
        }
        debug!(
            "Validated {} row(s): {} required column(s), {} dynamic column(s), {} new",
            normalized.len(),
            required_columns.len(),
            dynamic_columns.len(),
            new_columns.len()
        );

        Ok(ValidatedTable {
            required,
            dynamic,
            new_columns,
            known_columns,
            warnings: qualified.warnings,
        })
    }

    fn cast_required(&self, required: &mut MetadataTable) -> Result<()> {
        let columns = required.columns().to_vec();
        for (index, name) in columns.iter().enumerate() {
            let Some(definition) = self.kind.required_column(name) else {
                continue;
            };
            match &definition.lookup {
                Some(lookup) => {
                    let vocabulary = Vocabulary::load(self.store, definition.name, lookup)?;
                    for row in required.rows_mut() {
                        if let Some(value) = row.cells[index].take() {
                            row.cells[index] = Some(vocabulary.resolve(&value)?);
                        }
                    }
                }
                None => cast_column(required, index, name, definition.column_type)?,
            }
        }
        Ok(())
    }
}

fn clear_stored_cells<F>(table: &mut MetadataTable, existing: &BTreeSet<String>, known: F)
where
    F: Fn(&str) -> bool,
{
    let mask: Vec<bool> = table.columns().iter().map(|name| known(name)).collect();
    for row in table.rows_mut() {
        if !existing.contains(&row.id) {
            continue;
        }
        for (cell, clear) in row.cells.iter_mut().zip(&mask) {
            if *clear {
                *cell = None;
            }
        }
    }
}

fn cast_column(
    table: &mut MetadataTable,
    index: usize,
    name: &str,
    column_type: ColumnType,
) -> Result<()> {
    for row in table.rows_mut() {
        if let Some(value) = row.cells[index].take() {
            row.cells[index] = Some(column_type.coerce(name, &value)?);
        }
    }
    Ok(())
}
