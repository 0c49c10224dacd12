//! Per-identifier view over the required and dynamic columns of a template.

use log::debug;

use crate::{
    data::Value,
    error::{Result, TemplateError},
    frame::MetadataTable,
    kind::KindTag,
    mapping::MetadataMap,
    plan::Action,
    template::{MetadataTemplate, row_entity_name},
};

/// One sample (or prep sample) of a template.
///
/// Holds no cached values: every read goes back to the store.
#[derive(Debug, Clone)]
pub struct Row<'s> {
    template: MetadataTemplate<'s>,
    id: String,
}

impl<'s> Row<'s> {
    pub fn new(template: &MetadataTemplate<'s>, id: &str, expected: KindTag) -> Result<Self> {
        let actual = template.kind().tag;
        if actual != expected {
            return Err(TemplateError::WrongTemplateKind { expected, actual });
        }
        if !template.contains(id)? {
            return Err(TemplateError::unknown_id(row_entity_name(template.kind()), id));
        }
        Ok(Self {
            template: *template,
            id: id.to_string(),
        })
    }

    pub fn sample(template: &MetadataTemplate<'s>, id: &str) -> Result<Self> {
        Self::new(template, id, KindTag::Sample)
    }

    pub fn prep_sample(template: &MetadataTemplate<'s>, id: &str) -> Result<Self> {
        Self::new(template, id, KindTag::Prep)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn template(&self) -> &MetadataTemplate<'s> {
        &self.template
    }

    /// Writes one cell immediately.
    pub fn set(&self, category: &str, value: impl Into<Value>) -> Result<()> {
        let action = self.set_statement(category, value)?;
        self.template
            .store()
            .execute_batch(std::slice::from_ref(&action.statement))?;
        debug!("Set '{category}' on {}", self.id);
        Ok(())
    }

    /// Plans the write `set` would perform, without executing it.
    pub fn set_statement(&self, category: &str, value: impl Into<Value>) -> Result<Action> {
        self.template.cell_action(&self.id, category, &value.into())
    }

    pub fn delete_category(&self, category: &str) -> Result<()> {
        Err(TemplateError::NotImplemented(format!(
            "removing category '{category}' from {}",
            self.id
        )))
    }

    fn read(&self) -> Result<MetadataTable> {
        let table = self.template.read_table(true, Some(&self.id))?;
        if table.row(&self.id).is_none() {
            return Err(TemplateError::unknown_id(
                row_entity_name(self.template.kind()),
                self.id.clone(),
            ));
        }
        Ok(table)
    }
}

impl PartialEq for Row<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template && self.id == other.id
    }
}

impl MetadataMap for Row<'_> {
    type Item = Option<Value>;

    fn keys(&self) -> Result<Vec<String>> {
        self.template.categories()
    }

    /// Category names are matched case-insensitively.
    /// A vocabulary column's stored id name reads back the id, mirroring `set`.
    fn lookup(&self, key: &str) -> Result<Option<Value>> {
        let name = key.trim().to_ascii_lowercase();
        if let Some(column) = self.template.kind().required_column(&name) {
            if column.name != name {
                let table = self.template.read_table(false, Some(&self.id))?;
                return Ok(table.value(&self.id, column.name).cloned());
            }
        }
        let table = self.read()?;
        if table.column_index(&name).is_none() {
            return Err(TemplateError::UnknownCategory {
                category: key.to_string(),
            });
        }
        Ok(table.value(&self.id, &name).cloned())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        let name = key.trim().to_ascii_lowercase();
        Ok(self.keys()?.contains(&name))
    }

    fn items(&self) -> Result<Vec<(String, Option<Value>)>> {
        let table = self.read()?;
        let Some(row) = table.row(&self.id) else {
            return Ok(Vec::new());
        };
        Ok(table
            .columns()
            .iter()
            .cloned()
            .zip(row.cells.iter().cloned())
            .collect())
    }

    fn values(&self) -> Result<Vec<Option<Value>>> {
        Ok(self.items()?.into_iter().map(|(_, value)| value).collect())
    }
}

impl<'s> MetadataMap for MetadataTemplate<'s> {
    type Item = Row<'s>;

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.ids()?.into_iter().collect())
    }

    fn lookup(&self, key: &str) -> Result<Row<'s>> {
        Row::new(self, key, self.kind().tag)
    }

    fn contains(&self, key: &str) -> Result<bool> {
        MetadataTemplate::contains(self, key)
    }

    fn len(&self) -> Result<usize> {
        MetadataTemplate::len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::SAMPLE_TEMPLATE;
    use crate::store::{SqliteStore, Store};

    fn one_sample() -> MetadataTable {
        MetadataTable::from_records(vec![(
            "Sample1",
            vec![
                ("collection_timestamp", Some(Value::text("2014-05-29 12:24:51"))),
                ("description", Some(Value::text("Test Sample 1"))),
                ("has_extracted_data", Some(Value::Boolean(true))),
                ("has_physical_specimen", Some(Value::Boolean(true))),
                ("host_subject_id", Some(Value::text("NotIdentified"))),
                ("latitude", Some(Value::Float(42.42))),
                ("longitude", Some(Value::Float(41.41))),
                ("physical_location", Some(Value::text("location1"))),
                ("required_sample_info_status", Some(Value::text("received"))),
                ("sample_type", Some(Value::text("type1"))),
                ("str_column", Some(Value::text("Value for sample 1"))),
            ],
        )])
        .unwrap()
    }

    #[test]
    fn prep_view_over_sample_template_is_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        let (template, _) =
            MetadataTemplate::create(&store, &SAMPLE_TEMPLATE, 2, &one_sample()).unwrap();
        let err = Row::prep_sample(&template, "2.Sample1").unwrap_err();
        assert_eq!(
            err,
            TemplateError::WrongTemplateKind {
                expected: KindTag::Prep,
                actual: KindTag::Sample
            }
        );
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let store = SqliteStore::in_memory().unwrap();
        let (template, _) =
            MetadataTemplate::create(&store, &SAMPLE_TEMPLATE, 2, &one_sample()).unwrap();
        let row = Row::sample(&template, "2.Sample1").unwrap();
        assert_eq!(
            row.lookup("STR_COLUMN").unwrap(),
            Some(Value::text("Value for sample 1"))
        );
        assert!(row.contains("Description").unwrap());
    }

    #[test]
    fn set_statement_does_not_execute() {
        let store = SqliteStore::in_memory().unwrap();
        let (template, _) =
            MetadataTemplate::create(&store, &SAMPLE_TEMPLATE, 2, &one_sample()).unwrap();
        let row = Row::sample(&template, "2.Sample1").unwrap();
        let action = row.set_statement("str_column", "staged").unwrap();
        assert_eq!(
            action.statement.sql,
            "UPDATE sample_2 SET str_column = ? WHERE sample_id = ?"
        );
        assert_eq!(
            row.lookup("str_column").unwrap(),
            Some(Value::text("Value for sample 1"))
        );
        store.execute_batch(&[action.statement]).unwrap();
        assert_eq!(row.lookup("str_column").unwrap(), Some(Value::text("staged")));
    }
}
