//! Read-side helpers over the catalog, registry, and vocabulary relations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    data::Value,
    error::{Result, TemplateError},
    kind::{DERIVED_ARTIFACT_TABLE, Lookup, TEMPLATE_REGISTRY_TABLE, TemplateKind},
    schema::ColumnType,
    store::Store,
};

/// Declared dynamic columns for one owner, from the catalog.
pub fn dynamic_columns(
    store: &dyn Store,
    kind: &TemplateKind,
    owner: i64,
) -> Result<BTreeMap<String, ColumnType>> {
    let sql = format!(
        "SELECT column_name, column_type FROM {} WHERE {} = ? ORDER BY column_name",
        kind.catalog_table, kind.owner_column
    );
    let mut columns = BTreeMap::new();
    for record in store.fetch_all(&sql, &[Some(Value::Integer(owner))])? {
        let (Some(name), Some(ty)) = (record.at(0), record.at(1)) else {
            continue;
        };
        columns.insert(name.as_display(), ty.as_display().parse::<ColumnType>()?);
    }
    Ok(columns)
}

pub fn template_ids(store: &dyn Store, kind: &TemplateKind, owner: i64) -> Result<BTreeSet<String>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?",
        kind.id_column, kind.required_table, kind.owner_column
    );
    Ok(store
        .fetch_all(&sql, &[Some(Value::Integer(owner))])?
        .into_iter()
        .filter_map(|record| record.at(0).map(Value::as_display))
        .collect())
}

pub fn template_exists(store: &dyn Store, kind: &TemplateKind, owner: i64) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {TEMPLATE_REGISTRY_TABLE} WHERE template_kind = ? AND owner_id = ?"
    );
    let found = store.fetch_one(
        &sql,
        &[Some(Value::text(kind.tag.as_str())), Some(Value::Integer(owner))],
    )?;
    Ok(found.is_some())
}

pub fn dependent_count(store: &dyn Store, kind: &TemplateKind, owner: i64) -> Result<usize> {
    let sql = format!(
        "SELECT COUNT(*) FROM {DERIVED_ARTIFACT_TABLE} WHERE template_kind = ? AND owner_id = ?"
    );
    let record = store.fetch_one(
        &sql,
        &[Some(Value::text(kind.tag.as_str())), Some(Value::Integer(owner))],
    )?;
    match record.as_ref().and_then(|r| r.at(0)) {
        Some(Value::Integer(count)) => Ok(usize::try_from(*count).unwrap_or_default()),
        _ => Ok(0),
    }
}

/// Label → id map of a controlled vocabulary.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    column: &'static str,
    ids: HashMap<String, i64>,
}

impl Vocabulary {
    pub fn load(store: &dyn Store, column: &'static str, lookup: &Lookup) -> Result<Self> {
        let sql = format!(
            "SELECT {}, {} FROM {}",
            lookup.id_column, lookup.label_column, lookup.table
        );
        let mut ids = HashMap::new();
        for record in store.fetch_all(&sql, &[])? {
            if let (Some(Value::Integer(id)), Some(label)) = (record.at(0), record.at(1)) {
                ids.insert(label.as_display(), *id);
            }
        }
        Ok(Self { column, ids })
    }

    pub fn resolve(&self, value: &Value) -> Result<Value> {
        let label = value.as_display();
        match self.ids.get(label.trim()) {
            Some(id) => Ok(Value::Integer(*id)),
            None => {
                let mut labels: Vec<&str> = self.ids.keys().map(String::as_str).collect();
                labels.sort_unstable();
                Err(TemplateError::TypeCoercion {
                    column: self.column.to_string(),
                    value: label,
                    reason: format!("expected one of {}", labels.join(", ")),
                })
            }
        }
    }

    /// Checks a raw id supplied through the stored id column.
    pub fn resolve_id(&self, value: &Value) -> Result<Value> {
        let id = ColumnType::Integer.coerce(self.column, value)?;
        match id {
            Value::Integer(raw) if self.ids.values().any(|known| *known == raw) => Ok(id),
            _ => Err(TemplateError::TypeCoercion {
                column: self.column.to_string(),
                value: value.as_display(),
                reason: "not a known vocabulary id".to_string(),
            }),
        }
    }
}
