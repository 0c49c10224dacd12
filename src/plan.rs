//! Statement planning for template mutations.
//!
//! Planning is pure: every function here turns a validated table (and, for
//! updates, the currently stored values) into an ordered [`Plan`]. Schema
//! actions always precede the data actions that depend on them. Execution is
//! left to the caller, which hands [`Plan::statements`] to a single
//! [`Store::execute_batch`](crate::store::Store::execute_batch).

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;

use crate::{
    data::Value,
    error::{Result, TemplateError},
    frame::MetadataTable,
    identifiers::TemplateWarning,
    kind::{TEMPLATE_REGISTRY_TABLE, TemplateKind},
    schema::ColumnType,
    store::{Param, Statement},
    validate::ValidatedTable,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    RegisterTemplate,
    InsertRequired,
    InsertCatalog,
    CreateDynamicTable,
    AddDynamicColumn,
    InsertDynamic,
    UpdateRequired,
    UpdateDynamic,
    DropDynamicTable,
    DeleteCatalog,
    DeleteRequired,
    UnregisterTemplate,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::RegisterTemplate => "register-template",
            ActionKind::InsertRequired => "insert-required",
            ActionKind::InsertCatalog => "insert-catalog",
            ActionKind::CreateDynamicTable => "create-dynamic-table",
            ActionKind::AddDynamicColumn => "add-dynamic-column",
            ActionKind::InsertDynamic => "insert-dynamic",
            ActionKind::UpdateRequired => "update-required",
            ActionKind::UpdateDynamic => "update-dynamic",
            ActionKind::DropDynamicTable => "drop-dynamic-table",
            ActionKind::DeleteCatalog => "delete-catalog",
            ActionKind::DeleteRequired => "delete-required",
            ActionKind::UnregisterTemplate => "unregister-template",
        }
    }

    pub fn is_schema_change(&self) -> bool {
        matches!(
            self,
            ActionKind::CreateDynamicTable
                | ActionKind::AddDynamicColumn
                | ActionKind::DropDynamicTable
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub statement: Statement,
}

/// Which physical relation holds a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Required,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    actions: Vec<Action>,
    warnings: Vec<TemplateWarning>,
}

impl Plan {
    fn push(&mut self, kind: ActionKind, statement: Statement) {
        self.actions.push(Action { kind, statement });
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn warnings(&self) -> &[TemplateWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<TemplateWarning> {
        self.warnings
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.actions.iter().map(|a| a.statement.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }
}

fn placeholders(count: usize) -> String {
    std::iter::repeat_n("?", count).join(", ")
}

fn register_statement(kind: &TemplateKind, owner: i64) -> Statement {
    Statement::new(
        format!("INSERT INTO {TEMPLATE_REGISTRY_TABLE} (template_kind, owner_id) VALUES (?, ?)"),
        vec![Some(Value::text(kind.tag.as_str())), Some(Value::Integer(owner))],
    )
}

fn catalog_insert(kind: &TemplateKind, owner: i64, column: &str, ty: ColumnType) -> Statement {
    Statement::new(
        format!(
            "INSERT INTO {} ({}, column_name, column_type) VALUES (?, ?, ?)",
            kind.catalog_table, kind.owner_column
        ),
        vec![
            Some(Value::Integer(owner)),
            Some(Value::text(column)),
            Some(Value::text(ty.as_str())),
        ],
    )
}

fn create_dynamic_table(
    kind: &TemplateKind,
    owner: i64,
    columns: &[(String, ColumnType)],
) -> Statement {
    let mut definitions = vec![format!("{} varchar NOT NULL PRIMARY KEY", kind.id_column)];
    definitions.extend(columns.iter().map(|(name, ty)| format!("{name} {ty}")));
    Statement::ddl(format!(
        "CREATE TABLE {} ({})",
        kind.dynamic_table(owner),
        definitions.join(", ")
    ))
}

/// Required columns present in `table`, as (index in table, stored name), in kind order.
fn required_layout(kind: &TemplateKind, table: &MetadataTable) -> Vec<(usize, &'static str)> {
    kind.required_columns
        .iter()
        .filter_map(|column| {
            table
                .column_index(column.name)
                .map(|index| (index, column.stored_name()))
        })
        .collect()
}

/// Dynamic columns present in `table`, as (index in table, name), sorted by name.
fn dynamic_layout(table: &MetadataTable) -> Vec<(usize, String)> {
    table
        .columns()
        .iter()
        .cloned()
        .enumerate()
        .sorted_by(|a, b| a.1.cmp(&b.1))
        .collect()
}

fn insert_required_rows(
    plan: &mut Plan,
    kind: &TemplateKind,
    owner: i64,
    table: &MetadataTable,
    ids: &BTreeSet<&str>,
) {
    let layout = required_layout(kind, table);
    let columns = [kind.id_column, kind.owner_column]
        .into_iter()
        .chain(layout.iter().map(|(_, name)| *name))
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({columns}) VALUES ({})",
        kind.required_table,
        placeholders(layout.len() + 2)
    );
    for row in table.rows().iter().filter(|row| ids.contains(row.id.as_str())) {
        let mut params: Vec<Param> = vec![Some(Value::text(&row.id)), Some(Value::Integer(owner))];
        params.extend(layout.iter().map(|(index, _)| row.cells[*index].clone()));
        plan.push(ActionKind::InsertRequired, Statement::new(sql.clone(), params));
    }
}

fn insert_dynamic_rows(
    plan: &mut Plan,
    kind: &TemplateKind,
    owner: i64,
    table: &MetadataTable,
    ids: &BTreeSet<&str>,
) {
    let layout = dynamic_layout(table);
    let columns = std::iter::once(kind.id_column)
        .chain(layout.iter().map(|(_, name)| name.as_str()))
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({columns}) VALUES ({})",
        kind.dynamic_table(owner),
        placeholders(layout.len() + 1)
    );
    for row in table.rows().iter().filter(|row| ids.contains(row.id.as_str())) {
        let mut params: Vec<Param> = vec![Some(Value::text(&row.id))];
        params.extend(layout.iter().map(|(index, _)| row.cells[*index].clone()));
        plan.push(ActionKind::InsertDynamic, Statement::new(sql.clone(), params));
    }
}

/// Single-cell update against the relation holding `column`.
///
/// For required vocabulary columns `column` must be the stored id column and
/// `value` the resolved id.
pub fn cell_update(
    kind: &TemplateKind,
    owner: i64,
    relation: Relation,
    column: &str,
    id: &str,
    value: Option<Value>,
) -> Action {
    match relation {
        Relation::Required => Action {
            kind: ActionKind::UpdateRequired,
            statement: Statement::new(
                format!(
                    "UPDATE {} SET {column} = ? WHERE {} = ? AND {} = ?",
                    kind.required_table, kind.owner_column, kind.id_column
                ),
                vec![value, Some(Value::Integer(owner)), Some(Value::text(id))],
            ),
        },
        Relation::Dynamic => Action {
            kind: ActionKind::UpdateDynamic,
            statement: Statement::new(
                format!(
                    "UPDATE {} SET {column} = ? WHERE {} = ?",
                    kind.dynamic_table(owner),
                    kind.id_column
                ),
                vec![value, Some(Value::text(id))],
            ),
        },
    }
}

/// Plans a brand-new template from a table validated in create mode.
pub fn plan_create(kind: &TemplateKind, owner: i64, validated: &ValidatedTable) -> Plan {
    let mut plan = Plan {
        actions: Vec::new(),
        warnings: validated.warnings.clone(),
    };
    let ids: BTreeSet<&str> = validated.ids().collect();

    plan.push(ActionKind::RegisterTemplate, register_statement(kind, owner));
    insert_required_rows(&mut plan, kind, owner, &validated.required, &ids);

    let columns: Vec<(String, ColumnType)> = validated
        .new_columns
        .iter()
        .map(|(name, ty)| (name.clone(), *ty))
        .collect();
    for (name, ty) in &columns {
        plan.push(ActionKind::InsertCatalog, catalog_insert(kind, owner, name, *ty));
    }
    plan.push(
        ActionKind::CreateDynamicTable,
        create_dynamic_table(kind, owner, &columns),
    );
    insert_dynamic_rows(&mut plan, kind, owner, &validated.dynamic, &ids);
    plan
}

/// Plans the additions an extend introduces.
///
/// Rows already stored keep all their current values; they only receive
/// values for columns that are new to the template.
pub fn plan_extend(
    kind: &TemplateKind,
    owner: i64,
    validated: &ValidatedTable,
    existing: &BTreeSet<String>,
) -> Result<Plan> {
    let (old_rows, new_rows): (BTreeSet<&str>, BTreeSet<&str>) =
        validated.ids().partition(|id| existing.contains(*id));
    if new_rows.is_empty() && validated.new_columns.is_empty() {
        return Err(TemplateError::Structure(
            "No new rows or columns to add to the template".to_string(),
        ));
    }

    let mut plan = Plan {
        actions: Vec::new(),
        warnings: validated.warnings.clone(),
    };
    if !old_rows.is_empty() {
        plan.warnings.push(
            TemplateWarning::DuplicateRows {
                ids: old_rows.iter().map(|id| id.to_string()).collect(),
            }
            .log(),
        );
        let kept: Vec<String> = validated
            .required
            .columns()
            .iter()
            .chain(validated.dynamic.columns())
            .filter(|name| !validated.new_columns.contains_key(*name))
            .cloned()
            .sorted()
            .collect();
        if !kept.is_empty() {
            plan.warnings
                .push(TemplateWarning::DuplicateColumns { columns: kept }.log());
        }
    }

    let table = kind.dynamic_table(owner);
    for (name, ty) in &validated.new_columns {
        plan.push(ActionKind::InsertCatalog, catalog_insert(kind, owner, name, *ty));
        plan.push(
            ActionKind::AddDynamicColumn,
            Statement::ddl(format!("ALTER TABLE {table} ADD COLUMN {name} {ty}")),
        );
    }

    insert_required_rows(&mut plan, kind, owner, &validated.required, &new_rows);
    insert_dynamic_rows(&mut plan, kind, owner, &validated.dynamic, &new_rows);

    for (index, name) in dynamic_layout(&validated.dynamic) {
        if !validated.new_columns.contains_key(&name) {
            continue;
        }
        for row in validated.dynamic.rows() {
            if !old_rows.contains(row.id.as_str()) {
                continue;
            }
            if let Some(value) = row.cell(index) {
                let action = cell_update(
                    kind,
                    owner,
                    Relation::Dynamic,
                    &name,
                    &row.id,
                    Some(value.clone()),
                );
                plan.actions.push(action);
            }
        }
    }
    Ok(plan)
}

/// Plans per-cell updates for every supplied value that differs from `current`.
///
/// `current` holds the stored values keyed by logical column name, with
/// vocabulary columns carrying their ids. Null input cells are treated as
/// not supplied.
pub fn plan_update(
    kind: &TemplateKind,
    owner: i64,
    validated: &ValidatedTable,
    current: &MetadataTable,
) -> Plan {
    let mut plan = Plan {
        actions: Vec::new(),
        warnings: validated.warnings.clone(),
    };
    let mut stage = |table: &MetadataTable, relation: Relation| {
        for (index, name) in table.columns().iter().enumerate() {
            let stored_name = match relation {
                Relation::Required => kind
                    .required_column(name)
                    .map(|column| column.stored_name())
                    .unwrap_or(name.as_str()),
                Relation::Dynamic => name.as_str(),
            };
            for row in table.rows() {
                let Some(value) = row.cell(index) else {
                    continue;
                };
                if current.value(&row.id, name) == Some(value) {
                    continue;
                }
                plan.actions.push(cell_update(
                    kind,
                    owner,
                    relation,
                    stored_name,
                    &row.id,
                    Some(value.clone()),
                ));
            }
        }
    };
    stage(&validated.required, Relation::Required);
    stage(&validated.dynamic, Relation::Dynamic);
    plan
}

/// Plans one update per mapped identifier; `column` is the stored column name.
pub fn plan_update_category(
    kind: &TemplateKind,
    owner: i64,
    relation: Relation,
    column: &str,
    values: &[(String, Option<Value>)],
) -> Plan {
    let mut plan = Plan::default();
    for (id, value) in values {
        plan.actions
            .push(cell_update(kind, owner, relation, column, id, value.clone()));
    }
    plan
}

/// Plans removal of every structure belonging to one template.
pub fn plan_delete(kind: &TemplateKind, owner: i64) -> Plan {
    let mut plan = Plan::default();
    let owner_param = || vec![Some(Value::Integer(owner))];
    plan.push(
        ActionKind::DropDynamicTable,
        Statement::ddl(format!("DROP TABLE {}", kind.dynamic_table(owner))),
    );
    plan.push(
        ActionKind::DeleteCatalog,
        Statement::new(
            format!("DELETE FROM {} WHERE {} = ?", kind.catalog_table, kind.owner_column),
            owner_param(),
        ),
    );
    plan.push(
        ActionKind::DeleteRequired,
        Statement::new(
            format!("DELETE FROM {} WHERE {} = ?", kind.required_table, kind.owner_column),
            owner_param(),
        ),
    );
    plan.push(
        ActionKind::UnregisterTemplate,
        Statement::new(
            format!("DELETE FROM {TEMPLATE_REGISTRY_TABLE} WHERE template_kind = ? AND owner_id = ?"),
            vec![Some(Value::text(kind.tag.as_str())), Some(Value::Integer(owner))],
        ),
    );
    plan
}
