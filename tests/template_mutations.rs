mod common;

use std::collections::BTreeMap;

use common::{owner_two_metadata, sample_row, scalar, store, table_with_rows};
use metadata_template::{
    MetadataMap, SAMPLE_TEMPLATE, TemplateError, TemplateWarning,
    data::Value,
    store::{SqliteStore, Store},
    template::MetadataTemplate,
};

fn created(store: &SqliteStore) -> MetadataTemplate<'_> {
    MetadataTemplate::create(store, &SAMPLE_TEMPLATE, 2, &owner_two_metadata())
        .unwrap()
        .0
}

fn dynamic_rows(store: &SqliteStore, columns: &str) -> Vec<Vec<Option<Value>>> {
    store
        .fetch_all(&format!("SELECT {columns} FROM sample_2 ORDER BY sample_id"), &[])
        .unwrap()
        .into_iter()
        .map(|record| record.into_values())
        .collect()
}

#[test]
fn extend_with_same_table_is_rejected() {
    let store = store();
    let template = created(&store);
    let err = template.extend(&owner_two_metadata()).unwrap_err();
    assert!(matches!(err, TemplateError::Structure(_)));
}

#[test]
fn extend_adds_new_samples_and_keeps_existing_values() {
    let store = store();
    let template = created(&store);

    let mut changed = sample_row(1, 42.42, 41.41);
    changed[7] = ("Description".into(), Some(Value::text("Changed")));
    let mut changed_dynamic = sample_row(2, 4.2, 1.1);
    changed_dynamic[10] = ("str_column".into(), Some(Value::text("Changed dynamic")));
    let table = table_with_rows(vec![
        ("Sample1", changed),
        ("Sample2", changed_dynamic),
        ("Sample3", sample_row(3, 4.8, 4.41)),
        ("Sample4", sample_row(4, 42.42, 41.41)),
    ]);

    let warnings = template.extend(&table).unwrap();
    assert!(warnings.iter().any(|w| matches!(
        w,
        TemplateWarning::DuplicateRows { ids } if ids.len() == 3
    )));
    assert_eq!(template.len().unwrap(), 4);

    let data = template.to_dataframe(None).unwrap();
    assert_eq!(
        data.value("2.Sample1", "description"),
        Some(&Value::text("Test Sample 1"))
    );
    assert_eq!(
        data.value("2.Sample2", "str_column"),
        Some(&Value::text("Value for sample 2"))
    );
    assert_eq!(
        data.value("2.Sample4", "description"),
        Some(&Value::text("Test Sample 4"))
    );
    assert_eq!(data.value("2.Sample4", "int_column"), Some(&Value::Integer(4)));
}

#[test]
fn extend_adds_new_columns_to_existing_samples() {
    let store = store();
    let template = created(&store);

    let rows = (1..=3)
        .map(|index| {
            let mut cells = sample_row(index, 1.0, 1.0);
            cells.push(("NEWCOL".into(), Some(Value::text(format!("val{index}")))));
            cells.push(("NEW_COL".into(), Some(Value::text(format!("val_{index}")))));
            (format!("Sample{index}"), cells)
        })
        .collect::<Vec<_>>();
    let table = table_with_rows(
        rows.iter()
            .map(|(id, cells)| (id.as_str(), cells.clone()))
            .collect(),
    );

    let warnings = template.extend(&table).unwrap();
    assert!(!warnings.is_empty());

    assert_eq!(
        dynamic_rows(&store, "newcol, new_col"),
        vec![
            vec![Some(Value::text("val1")), Some(Value::text("val_1"))],
            vec![Some(Value::text("val2")), Some(Value::text("val_2"))],
            vec![Some(Value::text("val3")), Some(Value::text("val_3"))],
        ]
    );
    assert_eq!(
        scalar(&store, "SELECT COUNT(*) FROM study_sample_columns WHERE study_id = 2"),
        4
    );
    // Latitude 1.0 was supplied for every row but the stored values stay put.
    let data = template.to_dataframe(None).unwrap();
    assert_eq!(data.value("2.Sample1", "latitude"), Some(&Value::Float(42.42)));
}

#[test]
fn extend_adds_new_samples_and_columns_together() {
    let store = store();
    let template = created(&store);
    let rows = (1..=4)
        .map(|index| {
            let mut cells = sample_row(index, 4.2, 1.1);
            cells.push(("NEWCOL".into(), Some(Value::text(format!("val{index}")))));
            (format!("Sample{index}"), cells)
        })
        .collect::<Vec<_>>();
    let table = table_with_rows(
        rows.iter()
            .map(|(id, cells)| (id.as_str(), cells.clone()))
            .collect(),
    );

    template.extend(&table).unwrap();

    assert_eq!(template.len().unwrap(), 4);
    assert_eq!(
        dynamic_rows(&store, "newcol"),
        (1..=4)
            .map(|index| vec![Some(Value::text(format!("val{index}")))])
            .collect::<Vec<_>>()
    );
}

#[test]
fn extend_with_foreign_prefix_keeps_it_and_warns() {
    let store = store();
    let template = created(&store);
    let table = table_with_rows(vec![("1.SampleX", sample_row(9, 0.5, 0.5))]);

    let warnings = template.extend(&table).unwrap();
    assert!(warnings.contains(&TemplateWarning::ForeignPrefix {
        raw: "1.SampleX".to_string(),
        qualified: "2.1.SampleX".to_string(),
    }));
    assert!(template.contains("2.1.SampleX").unwrap());
}

#[test]
fn extend_with_new_rows_missing_required_columns_fails() {
    let store = store();
    let template = created(&store);
    let table = table_with_rows(vec![(
        "Sample5",
        vec![("str_column".into(), Some(Value::text("no required")))],
    )]);
    let err = template.extend(&table).unwrap_err();
    assert!(matches!(err, TemplateError::MissingRequiredColumn { .. }));
}

#[test]
fn extend_new_column_only_needs_no_required_columns() {
    let store = store();
    let template = created(&store);
    let table = table_with_rows(vec![
        ("Sample1", vec![("depth".into(), Some(Value::text("3")))]),
        ("Sample2", vec![("depth".into(), Some(Value::text("4")))]),
    ]);
    template.extend(&table).unwrap();
    let data = template.to_dataframe(None).unwrap();
    assert_eq!(data.value("2.Sample1", "depth"), Some(&Value::Integer(3)));
    assert_eq!(data.value("2.Sample3", "depth"), None);
}

#[test]
fn extend_casts_into_declared_type() {
    let store = store();
    let template = created(&store);
    let mut cells = sample_row(4, 1.0, 1.0);
    cells[11] = ("int_column".into(), Some(Value::text("no_value")));
    let err = template
        .extend(&table_with_rows(vec![("Sample4", cells)]))
        .unwrap_err();
    assert!(matches!(err, TemplateError::TypeCoercion { ref column, .. } if column == "int_column"));
    assert_eq!(template.len().unwrap(), 3);
}

#[test]
fn update_changes_only_supplied_cells() {
    let store = store();
    let template = created(&store);
    let table = table_with_rows(vec![
        (
            "Sample1",
            vec![
                ("int_column".into(), Some(Value::Integer(10))),
                ("Description".into(), Some(Value::text("Updated 1"))),
            ],
        ),
        (
            "Sample3",
            vec![
                ("int_column".into(), Some(Value::Integer(3))),
                ("required_sample_info_status".into(), Some(Value::text("completed"))),
            ],
        ),
    ]);
    template.update(&table).unwrap();

    let data = template.to_dataframe(None).unwrap();
    assert_eq!(data.value("2.Sample1", "int_column"), Some(&Value::Integer(10)));
    assert_eq!(
        data.value("2.Sample1", "description"),
        Some(&Value::text("Updated 1"))
    );
    assert_eq!(data.value("2.Sample2", "int_column"), Some(&Value::Integer(2)));
    assert_eq!(
        data.value("2.Sample2", "description"),
        Some(&Value::text("Test Sample 2"))
    );
    assert_eq!(
        data.value("2.Sample3", "required_sample_info_status"),
        Some(&Value::text("completed"))
    );
    assert_eq!(
        data.value("2.Sample3", "str_column"),
        Some(&Value::text("Value for sample 3"))
    );
}

#[test]
fn update_with_unchanged_table_is_a_no_op() {
    let store = store();
    let template = created(&store);
    template.update(&owner_two_metadata()).unwrap();
    assert_eq!(
        template.to_dataframe(None).unwrap(),
        created_copy_dataframe()
    );
}

fn created_copy_dataframe() -> metadata_template::MetadataTable {
    let store = store();
    created(&store).to_dataframe(None).unwrap()
}

#[test]
fn update_rejects_unknown_rows_and_columns() {
    let store = store();
    let template = created(&store);

    let unknown_row = table_with_rows(vec![(
        "Sample9",
        vec![("int_column".into(), Some(Value::Integer(1)))],
    )]);
    assert!(matches!(
        template.update(&unknown_row).unwrap_err(),
        TemplateError::Structure(_)
    ));

    let unknown_column = table_with_rows(vec![(
        "Sample1",
        vec![("not_a_column".into(), Some(Value::Integer(1)))],
    )]);
    assert!(matches!(
        template.update(&unknown_column).unwrap_err(),
        TemplateError::Structure(_)
    ));
}

#[test]
fn update_category_sets_each_mapped_row() {
    let store = store();
    let template = created(&store);
    let mapping = BTreeMap::from([
        ("2.Sample1".to_string(), Value::text("changed 1")),
        ("2.Sample2".to_string(), Value::text("changed 2")),
    ]);
    template.update_category("str_column", &mapping).unwrap();

    let row = template.lookup("2.Sample1").unwrap();
    assert_eq!(row.lookup("str_column").unwrap(), Some(Value::text("changed 1")));
    let untouched = template.lookup("2.Sample3").unwrap();
    assert_eq!(
        untouched.lookup("str_column").unwrap(),
        Some(Value::text("Value for sample 3"))
    );
}

#[test]
fn update_category_accepts_vocabulary_ids() {
    let store = store();
    let template = created(&store);
    let mapping = BTreeMap::from([
        ("2.Sample1".to_string(), Value::text("1")),
        ("2.Sample2".to_string(), Value::text("2")),
        ("2.Sample3".to_string(), Value::text("3")),
    ]);
    template
        .update_category("required_sample_info_status_id", &mapping)
        .unwrap();
    let data = template.to_dataframe(None).unwrap();
    assert_eq!(
        data.value("2.Sample2", "required_sample_info_status"),
        Some(&Value::text("in_preparation"))
    );
    assert_eq!(
        data.value("2.Sample3", "required_sample_info_status"),
        Some(&Value::text("running"))
    );
}

#[test]
fn update_category_with_unknown_identifier_changes_nothing() {
    let store = store();
    let template = created(&store);
    let before = template.to_dataframe(None).unwrap();
    let err = template
        .update_category("country", &BTreeMap::from([("id_a".to_string(), Value::text("1"))]))
        .unwrap_err();
    assert!(matches!(err, TemplateError::UnknownIdentifier { .. }));
    assert_eq!(template.to_dataframe(None).unwrap(), before);
}

#[test]
fn update_category_with_unknown_column_fails() {
    let store = store();
    let template = created(&store);
    let err = template
        .update_category(
            "missing column",
            &BTreeMap::from([("2.Sample1".to_string(), Value::text("stuff"))]),
        )
        .unwrap_err();
    assert!(matches!(err, TemplateError::UnknownCategory { .. }));
}

#[test]
fn update_category_is_all_or_nothing() {
    let store = store();
    let template = created(&store);
    let before = dynamic_rows(&store, "int_column");
    let mapping = BTreeMap::from([
        ("2.Sample1".to_string(), Value::Integer(1)),
        ("2.Sample2".to_string(), Value::text("no_value")),
    ]);
    let err = template.update_category("int_column", &mapping).unwrap_err();
    assert!(matches!(err, TemplateError::TypeCoercion { .. }));
    assert_eq!(dynamic_rows(&store, "int_column"), before);
}

#[test]
fn extend_ignores_unusable_values_in_cells_it_will_not_write() {
    let store = store();
    let template = created(&store);
    let mut stale = sample_row(1, 42.42, 41.41);
    stale[11] = ("int_column".into(), Some(Value::text("no_value")));
    stale[5] = ("collection_timestamp".into(), Some(Value::text("not a date")));
    stale.push(("depth".into(), Some(Value::text("3"))));
    let table = table_with_rows(vec![("Sample1", stale)]);

    template.extend(&table).unwrap();

    let data = template.to_dataframe(None).unwrap();
    assert_eq!(data.value("2.Sample1", "int_column"), Some(&Value::Integer(1)));
    assert_eq!(data.value("2.Sample1", "depth"), Some(&Value::Integer(3)));
}
