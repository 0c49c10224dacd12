//! In-memory metadata table: one row per identifier, one column per category.

use std::collections::{BTreeSet, HashMap};

use crate::{
    data::Value,
    error::{Result, TemplateError},
};

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub id: String,
    pub cells: Vec<Option<Value>>,
}

impl TableRow {
    pub fn cell(&self, index: usize) -> Option<&Value> {
        self.cells.get(index).and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataTable {
    columns: Vec<String>,
    rows: Vec<TableRow>,
}

impl MetadataTable {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Builds a table from per-row `(column, value)` records.
    ///
    /// Columns appear in first-seen order; a row without a given column gets
    /// a null cell there.
    pub fn from_records<I, R, K, C>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, R)>,
        R: IntoIterator<Item = (C, Option<Value>)>,
        K: Into<String>,
        C: Into<String>,
    {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut staged = Vec::new();
        for (id, record) in records {
            let mut cells = Vec::new();
            for (column, value) in record {
                let column = column.into();
                let index = match positions.get(&column) {
                    Some(index) => *index,
                    None => {
                        positions.insert(column.clone(), columns.len());
                        columns.push(column);
                        columns.len() - 1
                    }
                };
                cells.push((index, value));
            }
            staged.push((id.into(), cells));
        }

        let mut table = MetadataTable::new(columns);
        for (id, cells) in staged {
            let mut row = vec![None; table.columns.len()];
            for (index, value) in cells {
                row[index] = value;
            }
            table.push_row(id, row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, id: impl Into<String>, cells: Vec<Option<Value>>) -> Result<()> {
        let id = id.into();
        if cells.len() != self.columns.len() {
            return Err(TemplateError::Structure(format!(
                "Row '{id}' has {} cell(s) but the table has {} column(s)",
                cells.len(),
                self.columns.len()
            )));
        }
        self.rows.push(TableRow { id, cells });
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> impl Iterator<Item = &mut TableRow> {
        self.rows.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.id.as_str())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row(&self, id: &str) -> Option<&TableRow> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn value(&self, id: &str, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.row(id)?.cell(index)
    }

    /// Values of one column in row order.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = Option<&Value>> {
        self.rows.iter().map(move |row| row.cell(index))
    }

    /// Copy with columns and rows in ascending name order.
    pub fn sorted(&self) -> Self {
        let mut order: Vec<usize> = (0..self.columns.len()).collect();
        order.sort_by(|a, b| self.columns[*a].cmp(&self.columns[*b]));
        let columns = order.iter().map(|i| self.columns[*i].clone()).collect();
        let mut rows: Vec<TableRow> = self
            .rows
            .iter()
            .map(|row| TableRow {
                id: row.id.clone(),
                cells: order.iter().map(|i| row.cells[*i].clone()).collect(),
            })
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Self { columns, rows }
    }

    /// Keeps only the listed rows and columns, in the given column order.
    pub fn select(&self, ids: &BTreeSet<String>, columns: &[String]) -> Self {
        let indices: Vec<Option<usize>> =
            columns.iter().map(|c| self.column_index(c)).collect();
        let rows = self
            .rows
            .iter()
            .filter(|row| ids.contains(&row.id))
            .map(|row| TableRow {
                id: row.id.clone(),
                cells: indices
                    .iter()
                    .map(|index| index.and_then(|i| row.cells[i].clone()))
                    .collect(),
            })
            .collect();
        Self {
            columns: columns.to_vec(),
            rows,
        }
    }

    pub(crate) fn rename_columns(&mut self, columns: Vec<String>) {
        debug_assert_eq!(columns.len(), self.columns.len());
        self.columns = columns;
    }

    pub(crate) fn rename_rows(&mut self, ids: Vec<String>) {
        debug_assert_eq!(ids.len(), self.rows.len());
        for (row, id) in self.rows.iter_mut().zip(ids) {
            row.id = id;
        }
    }
}
