//! Capability descriptors for the two template kinds.
//!
//! Sample-level and preparation-level templates share one engine; what
//! differs between them (relation names, required columns, controlled
//! vocabularies, header renames) lives in a [`TemplateKind`].

use std::fmt;

use crate::schema::ColumnType;

pub const TARGET_GENE_DATA_TYPES: &[&str] = &["16S", "18S", "ITS"];

pub const REQUIRED_TARGET_GENE_COLS: &[&str] = &[
    "barcodesequence",
    "experiment_design_description",
    "library_construction_protocol",
    "linkerprimersequence",
    "platform",
    "run_prefix",
];

pub const TEMPLATE_REGISTRY_TABLE: &str = "metadata_template";
pub const DERIVED_ARTIFACT_TABLE: &str = "derived_artifact";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    Sample,
    Prep,
}

impl KindTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            KindTag::Sample => "sample",
            KindTag::Prep => "prep",
        }
    }
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Controlled vocabulary backing a required column.
#[derive(Debug)]
pub struct Lookup {
    pub table: &'static str,
    pub id_column: &'static str,
    pub label_column: &'static str,
    /// Labels seeded in id order starting at 1.
    pub labels: &'static [&'static str],
}

#[derive(Debug)]
pub struct RequiredColumn {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub lookup: Option<Lookup>,
}

impl RequiredColumn {
    const fn plain(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            lookup: None,
        }
    }

    /// Column name inside the required relation.
    pub fn stored_name(&self) -> &'static str {
        match &self.lookup {
            Some(lookup) => lookup.id_column,
            None => self.name,
        }
    }

    pub fn stored_type(&self) -> ColumnType {
        if self.lookup.is_some() {
            ColumnType::Integer
        } else {
            self.column_type
        }
    }
}

#[derive(Debug)]
pub struct TemplateKind {
    pub tag: KindTag,
    pub required_table: &'static str,
    pub id_column: &'static str,
    pub owner_column: &'static str,
    pub dynamic_prefix: &'static str,
    pub catalog_table: &'static str,
    pub export_id_header: &'static str,
    pub required_columns: &'static [RequiredColumn],
    pub column_renames: &'static [(&'static str, &'static str)],
    pub target_gene_check: bool,
}

pub static SAMPLE_TEMPLATE: TemplateKind = TemplateKind {
    tag: KindTag::Sample,
    required_table: "required_sample_info",
    id_column: "sample_id",
    owner_column: "study_id",
    dynamic_prefix: "sample_",
    catalog_table: "study_sample_columns",
    export_id_header: "sample_name",
    required_columns: &[
        RequiredColumn::plain("collection_timestamp", ColumnType::Timestamp),
        RequiredColumn::plain("description", ColumnType::Varchar),
        RequiredColumn::plain("has_extracted_data", ColumnType::Boolean),
        RequiredColumn::plain("has_physical_specimen", ColumnType::Boolean),
        RequiredColumn::plain("host_subject_id", ColumnType::Varchar),
        RequiredColumn::plain("latitude", ColumnType::Float),
        RequiredColumn::plain("longitude", ColumnType::Float),
        RequiredColumn::plain("physical_location", ColumnType::Varchar),
        RequiredColumn {
            name: "required_sample_info_status",
            column_type: ColumnType::Varchar,
            lookup: Some(Lookup {
                table: "required_sample_info_status",
                id_column: "required_sample_info_status_id",
                label_column: "status",
                labels: &["received", "in_preparation", "running", "completed"],
            }),
        },
        RequiredColumn::plain("sample_type", ColumnType::Varchar),
    ],
    column_renames: &[],
    target_gene_check: false,
};

pub static PREP_TEMPLATE: TemplateKind = TemplateKind {
    tag: KindTag::Prep,
    required_table: "common_prep_info",
    id_column: "sample_id",
    owner_column: "prep_template_id",
    dynamic_prefix: "prep_",
    catalog_table: "prep_columns",
    export_id_header: "sample_name",
    required_columns: &[
        RequiredColumn::plain("center_name", ColumnType::Varchar),
        RequiredColumn::plain("center_project_name", ColumnType::Varchar),
        RequiredColumn::plain("data_type", ColumnType::Varchar),
        RequiredColumn {
            name: "emp_status",
            column_type: ColumnType::Varchar,
            lookup: Some(Lookup {
                table: "emp_status",
                id_column: "emp_status_id",
                label_column: "emp_status",
                labels: &["EMP", "EMP_Processed", "NOT_EMP"],
            }),
        },
    ],
    column_renames: &[
        ("barcode", "barcodesequence"),
        ("primer", "linkerprimersequence"),
    ],
    target_gene_check: true,
};

impl TemplateKind {
    pub fn all() -> [&'static TemplateKind; 2] {
        [&SAMPLE_TEMPLATE, &PREP_TEMPLATE]
    }

    pub fn from_tag(tag: KindTag) -> &'static TemplateKind {
        match tag {
            KindTag::Sample => &SAMPLE_TEMPLATE,
            KindTag::Prep => &PREP_TEMPLATE,
        }
    }

    pub fn dynamic_table(&self, owner: i64) -> String {
        format!("{}{}", self.dynamic_prefix, owner)
    }

    /// Matches either the logical name or, for vocabulary columns, the stored id column.
    pub fn required_column(&self, name: &str) -> Option<&RequiredColumn> {
        self.required_columns
            .iter()
            .find(|column| column.name == name || column.stored_name() == name)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required_columns.iter().any(|column| column.name == name)
    }

    pub fn required_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.required_columns.iter().map(|column| column.name)
    }

    /// Key columns a user table may never carry.
    pub fn reserved_columns(&self) -> [&'static str; 2] {
        [self.id_column, self.owner_column]
    }

    pub fn rename(&self, column: &str) -> Option<&'static str> {
        self.column_renames
            .iter()
            .find(|(from, _)| *from == column)
            .map(|(_, to)| *to)
    }

    pub fn lookups(&self) -> impl Iterator<Item = &Lookup> + '_ {
        self.required_columns
            .iter()
            .filter_map(|column| column.lookup.as_ref())
    }

    /// DDL for the shared required relation.
    pub fn required_table_ddl(&self) -> String {
        let mut columns = vec![
            format!("{} varchar NOT NULL", self.id_column),
            format!("{} integer NOT NULL", self.owner_column),
        ];
        for column in self.required_columns {
            match &column.lookup {
                Some(lookup) => columns.push(format!(
                    "{} integer NOT NULL REFERENCES {} ({})",
                    lookup.id_column, lookup.table, lookup.id_column
                )),
                None => columns.push(format!("{} {} NOT NULL", column.name, column.column_type)),
            }
        }
        columns.push(format!(
            "PRIMARY KEY ({}, {})",
            self.owner_column, self.id_column
        ));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.required_table,
            columns.join(", ")
        )
    }

    pub fn catalog_table_ddl(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({} integer NOT NULL, column_name varchar NOT NULL, \
             column_type varchar NOT NULL, PRIMARY KEY ({}, column_name))",
            self.catalog_table, self.owner_column, self.owner_column
        )
    }
}

impl Lookup {
    pub fn table_ddl(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({} integer PRIMARY KEY, {} varchar NOT NULL UNIQUE)",
            self.table, self.id_column, self.label_column
        )
    }
}
