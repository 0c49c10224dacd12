//! Delimited-file reading and writing for metadata tables.
//!
//! Input files carry a header row; the first column holds the row
//! identifiers and every other column one category. Cells are read as text
//! and typed later by validation. Output follows the export format: tab
//! separated, identifier header first, empty fields for nulls.
//!
//! The `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;

use crate::{
    data::{Value, display_cell},
    frame::MetadataTable,
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

/// Tab unless the file is named `*.csv` or a delimiter is given.
pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => DEFAULT_CSV_DELIMITER,
        _ => DEFAULT_TSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

/// Parses a metadata table from any reader.
pub fn read_metadata_from<R: Read>(reader: &mut csv::Reader<R>) -> Result<MetadataTable> {
    let headers = reader
        .headers()
        .context("Reading header row")?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let Some((_, categories)) = headers.split_first() else {
        return Err(anyhow!("Input has no header row"));
    };

    let mut table = MetadataTable::new(categories.iter().cloned());
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Reading data row {}", line + 1))?;
        let mut fields = record.iter();
        let id = fields
            .next()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("Data row {} has an empty identifier", line + 1))?;
        let cells = fields
            .map(|field| (!field.is_empty()).then(|| Value::text(field)))
            .collect();
        table.push_row(id, cells)?;
    }
    Ok(table)
}

pub fn read_metadata_table(path: &Path, delimiter: Option<u8>) -> Result<MetadataTable> {
    let delimiter = resolve_input_delimiter(path, delimiter);
    let mut reader = open_csv_reader_from_path(path, delimiter)?;
    read_metadata_from(&mut reader).with_context(|| format!("Parsing metadata file {path:?}"))
}

/// Writes `table` with `id_header` naming the identifier column.
pub fn write_metadata_to<W: Write>(
    writer: &mut csv::Writer<W>,
    id_header: &str,
    table: &MetadataTable,
) -> Result<()> {
    writer.write_record(std::iter::once(id_header).chain(table.columns().iter().map(String::as_str)))?;
    for row in table.rows() {
        let fields = std::iter::once(row.id.clone())
            .chain((0..table.columns().len()).map(|index| display_cell(row.cell(index))));
        writer.write_record(fields)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_metadata_table(path: Option<&Path>, id_header: &str, table: &MetadataTable) -> Result<()> {
    let mut writer = open_csv_writer(path, DEFAULT_TSV_DELIMITER)?;
    write_metadata_to(&mut writer, id_header, table)
}
