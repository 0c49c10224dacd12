#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use metadata_template::{
    MetadataTable,
    data::Value,
    store::{SqliteStore, Store},
};
use tempfile::{TempDir, tempdir};

pub const EXPECTED_EXPORT: &str = "sample_name\tcollection_timestamp\tdescription\thas_extracted_data\t\
has_physical_specimen\thost_subject_id\tint_column\tlatitude\tlongitude\t\
physical_location\trequired_sample_info_status\tsample_type\tstr_column\n\
2.Sample1\t2014-05-29 12:24:51\tTest Sample 1\tTrue\tTrue\tNotIdentified\
\t1\t42.42\t41.41\tlocation1\treceived\ttype1\tValue for sample 1\n\
2.Sample2\t2014-05-29 12:24:51\tTest Sample 2\tTrue\tTrue\tNotIdentified\
\t2\t4.2\t1.1\tlocation1\treceived\ttype1\tValue for sample 2\n\
2.Sample3\t2014-05-29 12:24:51\tTest Sample 3\tTrue\tTrue\tNotIdentified\
\t3\t4.8\t4.41\tlocation1\treceived\ttype1\tValue for sample 3\n";

pub const EXPECTED_EXPORT_FEWER_SAMPLES: &str = "sample_name\tcollection_timestamp\tdescription\thas_extracted_data\t\
has_physical_specimen\thost_subject_id\tint_column\tlatitude\tlongitude\t\
physical_location\trequired_sample_info_status\tsample_type\tstr_column\n\
2.Sample1\t2014-05-29 12:24:51\tTest Sample 1\tTrue\tTrue\tNotIdentified\
\t1\t42.42\t41.41\tlocation1\treceived\ttype1\tValue for sample 1\n\
2.Sample3\t2014-05-29 12:24:51\tTest Sample 3\tTrue\tTrue\tNotIdentified\
\t3\t4.8\t4.41\tlocation1\treceived\ttype1\tValue for sample 3\n";

/// Fresh in-memory store with the shared relations installed.
pub fn store() -> SqliteStore {
    SqliteStore::in_memory().expect("in-memory store")
}

pub fn collection_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2014, 5, 29)
        .and_then(|date| date.and_hms_opt(12, 24, 51))
        .expect("valid timestamp")
}

/// Required sample columns for one row, with `Description` in mixed case.
pub fn required_cells(index: usize, latitude: f64, longitude: f64) -> Vec<(String, Option<Value>)> {
    vec![
        ("physical_location".into(), Some(Value::text("location1"))),
        ("has_physical_specimen".into(), Some(Value::Boolean(true))),
        ("has_extracted_data".into(), Some(Value::Boolean(true))),
        ("sample_type".into(), Some(Value::text("type1"))),
        ("required_sample_info_status".into(), Some(Value::text("received"))),
        ("collection_timestamp".into(), Some(Value::Timestamp(collection_timestamp()))),
        ("host_subject_id".into(), Some(Value::text("NotIdentified"))),
        ("Description".into(), Some(Value::text(format!("Test Sample {index}")))),
        ("latitude".into(), Some(Value::Float(latitude))),
        ("longitude".into(), Some(Value::Float(longitude))),
    ]
}

pub fn sample_row(index: usize, latitude: f64, longitude: f64) -> Vec<(String, Option<Value>)> {
    let mut cells = required_cells(index, latitude, longitude);
    cells.push((
        "str_column".into(),
        Some(Value::text(format!("Value for sample {index}"))),
    ));
    cells.push(("int_column".into(), Some(Value::Integer(index as i64))));
    cells
}

/// The three-sample table used for owner 2 throughout the suite.
pub fn owner_two_metadata() -> MetadataTable {
    MetadataTable::from_records(vec![
        ("Sample1", sample_row(1, 42.42, 41.41)),
        ("Sample2", sample_row(2, 4.2, 1.1)),
        ("Sample3", sample_row(3, 4.8, 4.41)),
    ])
    .expect("owner two metadata")
}

pub fn table_with_rows(rows: Vec<(&str, Vec<(String, Option<Value>)>)>) -> MetadataTable {
    MetadataTable::from_records(rows).expect("metadata table")
}

/// Same content as [`owner_two_metadata`], as a tab-separated file body.
pub fn owner_two_tsv() -> String {
    let header = "sample_name\tphysical_location\thas_physical_specimen\thas_extracted_data\t\
sample_type\trequired_sample_info_status\tcollection_timestamp\thost_subject_id\tDescription\t\
latitude\tlongitude\tstr_column\tint_column";
    let rows = [(1, "42.42", "41.41"), (2, "4.2", "1.1"), (3, "4.8", "4.41")]
        .iter()
        .map(|(index, lat, lon)| {
            format!(
                "Sample{index}\tlocation1\tTrue\tTrue\ttype1\treceived\t2014-05-29 12:24:51\t\
NotIdentified\tTest Sample {index}\t{lat}\t{lon}\tValue for sample {index}\t{index}"
            )
        })
        .collect::<Vec<_>>();
    format!("{header}\n{}\n", rows.join("\n"))
}

/// Single integer produced by `sql`, such as a `COUNT(*)`.
pub fn scalar(store: &dyn Store, sql: &str) -> i64 {
    match store.fetch_one(sql, &[]).expect("scalar query") {
        Some(record) => match record.at(0) {
            Some(Value::Integer(value)) => *value,
            other => panic!("expected an integer from {sql}, got {other:?}"),
        },
        None => panic!("no row returned by {sql}"),
    }
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.temp_dir.path().join(name)).expect("read temp file")
    }

    pub fn db(&self) -> PathBuf {
        self.temp_dir.path().join("templates.db")
    }
}
