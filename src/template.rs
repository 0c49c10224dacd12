//! The template entity: lifecycle operations and reads over one owner's metadata.
//!
//! Every mutating call validates first, plans second, and hands the whole
//! plan to the store as one transaction, so a failure at any step leaves the
//! store exactly as it was.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use log::{debug, info};

use crate::{
    catalog::{self, Vocabulary},
    data::Value,
    error::{Result, TemplateError},
    frame::MetadataTable,
    identifiers::TemplateWarning,
    io_utils,
    kind::{KindTag, TemplateKind},
    plan::{self, Action, Relation},
    schema::ColumnType,
    store::Store,
    validate::{Mode, Validator},
};

fn entity_name(kind: &TemplateKind) -> &'static str {
    match kind.tag {
        KindTag::Sample => "sample template",
        KindTag::Prep => "prep template",
    }
}

pub(crate) fn row_entity_name(kind: &TemplateKind) -> &'static str {
    match kind.tag {
        KindTag::Sample => "sample",
        KindTag::Prep => "prep sample",
    }
}

/// How a writable category maps onto storage.
pub(crate) struct CategoryTarget {
    pub relation: Relation,
    /// Column name in the relation.
    pub column: String,
    caster: Caster,
}

enum Caster {
    Type(ColumnType),
    Label(Vocabulary),
    Id(Vocabulary),
}

impl CategoryTarget {
    pub fn cast(&self, value: &Value) -> Result<Value> {
        match &self.caster {
            Caster::Type(ty) => ty.coerce(&self.column, value),
            Caster::Label(vocabulary) => vocabulary.resolve(value),
            Caster::Id(vocabulary) => vocabulary.resolve_id(value),
        }
    }
}

#[derive(Clone, Copy)]
pub struct MetadataTemplate<'s> {
    store: &'s dyn Store,
    kind: &'static TemplateKind,
    owner: i64,
}

impl<'s> MetadataTemplate<'s> {
    pub fn exists(store: &dyn Store, kind: &TemplateKind, owner: i64) -> Result<bool> {
        catalog::template_exists(store, kind, owner)
    }

    /// Handle on an existing template.
    pub fn open(store: &'s dyn Store, kind: &'static TemplateKind, owner: i64) -> Result<Self> {
        if !Self::exists(store, kind, owner)? {
            return Err(TemplateError::unknown_id(entity_name(kind), owner.to_string()));
        }
        Ok(Self { store, kind, owner })
    }

    /// Creates the template for `owner` from `table`.
    pub fn create(
        store: &'s dyn Store,
        kind: &'static TemplateKind,
        owner: i64,
        table: &MetadataTable,
    ) -> Result<(Self, Vec<TemplateWarning>)> {
        if Self::exists(store, kind, owner)? {
            return Err(TemplateError::DuplicateEntity {
                kind: kind.tag,
                owner,
            });
        }
        let validated =
            Validator::new(store, kind, owner).validate(table, Mode::Create, &BTreeSet::new())?;
        let plan = plan::plan_create(kind, owner, &validated);
        debug!("Executing create plan of {} action(s)", plan.len());
        store.execute_batch(&plan.statements())?;
        info!(
            "Created {} {owner} with {} row(s) and {} dynamic column(s)",
            entity_name(kind),
            validated.required.len(),
            validated.new_columns.len()
        );
        Ok((Self { store, kind, owner }, plan.into_warnings()))
    }

    /// Removes every structure of the template in one unit.
    pub fn delete(store: &dyn Store, kind: &'static TemplateKind, owner: i64) -> Result<()> {
        if !Self::exists(store, kind, owner)? {
            return Err(TemplateError::unknown_id(entity_name(kind), owner.to_string()));
        }
        let count = catalog::dependent_count(store, kind, owner)?;
        if count > 0 {
            return Err(TemplateError::DependencyExists {
                kind: kind.tag,
                owner,
                count,
            });
        }
        let plan = plan::plan_delete(kind, owner);
        store.execute_batch(&plan.statements())?;
        info!("Deleted {} {owner}", entity_name(kind));
        Ok(())
    }

    pub fn kind(&self) -> &'static TemplateKind {
        self.kind
    }

    pub fn owner(&self) -> i64 {
        self.owner
    }

    pub fn store(&self) -> &'s dyn Store {
        self.store
    }

    /// Number of derived artifacts that block deletion.
    pub fn dependents(&self) -> Result<usize> {
        catalog::dependent_count(self.store, self.kind, self.owner)
    }

    /// Adds new rows and/or new columns; stored cells are never overwritten.
    pub fn extend(&self, table: &MetadataTable) -> Result<Vec<TemplateWarning>> {
        let existing = self.ids()?;
        let validated =
            Validator::new(self.store, self.kind, self.owner).validate(table, Mode::Extend, &existing)?;
        let plan = plan::plan_extend(self.kind, self.owner, &validated, &existing)?;
        self.store.execute_batch(&plan.statements())?;
        info!(
            "Extended {} {} with {} new column(s) ({} action(s))",
            entity_name(self.kind),
            self.owner,
            validated.new_columns.len(),
            plan.len()
        );
        Ok(plan.into_warnings())
    }

    /// Overwrites supplied cells of existing rows and columns.
    pub fn update(&self, table: &MetadataTable) -> Result<Vec<TemplateWarning>> {
        let existing = self.ids()?;
        let validated =
            Validator::new(self.store, self.kind, self.owner).validate(table, Mode::Update, &existing)?;
        let current = self.read_table(false, None)?;
        let plan = plan::plan_update(self.kind, self.owner, &validated, &current);
        if plan.is_empty() {
            info!("No cell of {} {} changed", entity_name(self.kind), self.owner);
        } else {
            self.store.execute_batch(&plan.statements())?;
            info!(
                "Updated {} cell(s) of {} {}",
                plan.len(),
                entity_name(self.kind),
                self.owner
            );
        }
        Ok(plan.into_warnings())
    }

    /// Sets `category` for each mapped identifier, all or nothing.
    ///
    /// For vocabulary columns the mapping may use either the label column
    /// name with labels, or the stored id column name with ids.
    pub fn update_category(&self, category: &str, mapping: &BTreeMap<String, Value>) -> Result<()> {
        let ids = self.ids()?;
        if let Some(unknown) = mapping.keys().find(|id| !ids.contains(*id)) {
            return Err(TemplateError::unknown_id(row_entity_name(self.kind), unknown.clone()));
        }
        let target = self.category_target(category)?;
        let values = mapping
            .iter()
            .map(|(id, value)| Ok((id.clone(), Some(target.cast(value)?))))
            .collect::<Result<Vec<_>>>()?;
        let plan = plan::plan_update_category(
            self.kind,
            self.owner,
            target.relation,
            &target.column,
            &values,
        );
        self.store.execute_batch(&plan.statements())?;
        info!(
            "Updated category '{}' for {} row(s) of {} {}",
            target.column,
            values.len(),
            entity_name(self.kind),
            self.owner
        );
        Ok(())
    }

    pub(crate) fn category_target(&self, category: &str) -> Result<CategoryTarget> {
        let name = category.trim().to_ascii_lowercase();
        if let Some(column) = self.kind.required_column(&name) {
            let caster = match &column.lookup {
                Some(lookup) => {
                    let vocabulary = Vocabulary::load(self.store, column.name, lookup)?;
                    if name == column.name {
                        Caster::Label(vocabulary)
                    } else {
                        Caster::Id(vocabulary)
                    }
                }
                None => Caster::Type(column.column_type),
            };
            return Ok(CategoryTarget {
                relation: Relation::Required,
                column: column.stored_name().to_string(),
                caster,
            });
        }
        let dynamic = catalog::dynamic_columns(self.store, self.kind, self.owner)?;
        match dynamic.get(&name) {
            Some(ty) => Ok(CategoryTarget {
                relation: Relation::Dynamic,
                column: name,
                caster: Caster::Type(*ty),
            }),
            None => Err(TemplateError::UnknownCategory {
                category: category.to_string(),
            }),
        }
    }

    /// Plans a single-cell write without executing it.
    pub(crate) fn cell_action(&self, id: &str, category: &str, value: &Value) -> Result<Action> {
        let target = self.category_target(category)?;
        let cast = target.cast(value)?;
        Ok(plan::cell_update(
            self.kind,
            self.owner,
            target.relation,
            &target.column,
            id,
            Some(cast),
        ))
    }

    pub fn ids(&self) -> Result<BTreeSet<String>> {
        catalog::template_ids(self.store, self.kind, self.owner)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.ids()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ? AND {} = ?",
            self.kind.required_table, self.kind.owner_column, self.kind.id_column
        );
        let found = self.store.fetch_one(
            &sql,
            &[Some(Value::Integer(self.owner)), Some(Value::text(id))],
        )?;
        Ok(found.is_some())
    }

    /// Every category of the template in ascending order.
    pub fn categories(&self) -> Result<Vec<String>> {
        let dynamic = catalog::dynamic_columns(self.store, self.kind, self.owner)?;
        let mut names: Vec<String> = self
            .kind
            .required_names()
            .map(str::to_string)
            .chain(dynamic.into_keys())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Full template content, optionally restricted to `filter` identifiers.
    pub fn to_dataframe(&self, filter: Option<&BTreeSet<String>>) -> Result<MetadataTable> {
        let table = self.read_table(true, None)?;
        Ok(match filter {
            Some(ids) => table.select(ids, table.columns()),
            None => table,
        })
    }

    /// Writes the template as a tab-separated file.
    pub fn to_file(&self, path: &Path, filter: Option<&BTreeSet<String>>) -> anyhow::Result<()> {
        let table = self.to_dataframe(filter)?;
        io_utils::write_metadata_table(Some(path), self.kind.export_id_header, &table)?;
        info!("Wrote {} row(s) to {path:?}", table.len());
        Ok(())
    }

    /// Reads required and dynamic columns joined per identifier.
    ///
    /// With `labels` vocabulary columns come back as labels, otherwise as the
    /// stored ids. Columns and rows are in ascending order.
    pub(crate) fn read_table(&self, labels: bool, id: Option<&str>) -> Result<MetadataTable> {
        let dynamic = catalog::dynamic_columns(self.store, self.kind, self.owner)?;
        let kind = self.kind;
        let mut select = vec![format!("r.{}", kind.id_column)];
        let mut joins = Vec::new();
        let mut layout: Vec<(String, ColumnType)> = Vec::new();
        for (index, column) in kind.required_columns.iter().enumerate() {
            match (&column.lookup, labels) {
                (Some(lookup), true) => {
                    select.push(format!("l{index}.{} AS {}", lookup.label_column, column.name));
                    joins.push(format!(
                        "JOIN {table} l{index} ON l{index}.{id} = r.{id}",
                        table = lookup.table,
                        id = lookup.id_column
                    ));
                    layout.push((column.name.to_string(), ColumnType::Varchar));
                }
                (Some(lookup), false) => {
                    select.push(format!("r.{} AS {}", lookup.id_column, column.name));
                    layout.push((column.name.to_string(), ColumnType::Integer));
                }
                (None, _) => {
                    select.push(format!("r.{}", column.name));
                    layout.push((column.name.to_string(), column.column_type));
                }
            }
        }
        for (name, ty) in &dynamic {
            select.push(format!("d.{name}"));
            layout.push((name.clone(), *ty));
        }

        let mut sql = format!(
            "SELECT {} FROM {} r JOIN {} d ON d.{id} = r.{id} {} WHERE r.{} = ?",
            select.join(", "),
            kind.required_table,
            kind.dynamic_table(self.owner),
            joins.join(" "),
            kind.owner_column,
            id = kind.id_column,
        );
        let mut params = vec![Some(Value::Integer(self.owner))];
        if let Some(id) = id {
            sql.push_str(&format!(" AND r.{} = ?", kind.id_column));
            params.push(Some(Value::text(id)));
        }
        sql.push_str(&format!(" ORDER BY r.{}", kind.id_column));

        let mut table = MetadataTable::new(layout.iter().map(|(name, _)| name.clone()));
        for record in self.store.fetch_all(&sql, &params)? {
            let mut values = record.into_values().into_iter();
            let row_id = values
                .next()
                .flatten()
                .map(|v| v.as_display())
                .unwrap_or_default();
            let cells = values
                .zip(&layout)
                .map(|(raw, (_, ty))| raw.map(|raw| ty.from_stored(raw)))
                .collect();
            table.push_row(row_id, cells)?;
        }
        Ok(table.sorted())
    }
}

impl fmt::Debug for MetadataTemplate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataTemplate")
            .field("kind", &self.kind.tag)
            .field("owner", &self.owner)
            .finish()
    }
}

impl PartialEq for MetadataTemplate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.kind.tag == other.kind.tag && self.owner == other.owner
    }
}
