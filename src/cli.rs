use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::kind::KindTag;

#[derive(Debug, Parser)]
#[command(author, version, about = "Manage per-study metadata templates", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a template from a metadata file
    Create(InputArgs),
    /// Add new rows and/or columns to an existing template
    Extend(InputArgs),
    /// Overwrite existing cells from a metadata file
    Update(InputArgs),
    /// Set one category for a list of identifiers
    UpdateCategory(UpdateCategoryArgs),
    /// Delete a template and all of its storage
    Delete(TemplateArgs),
    /// Write a template as a tab-separated file
    Export(ExportArgs),
    /// Print a template as an aligned table
    Show(ShowArgs),
    /// List the categories of a template
    Categories(TemplateArgs),
    /// Write a store configuration file
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum KindArg {
    Sample,
    Prep,
}

impl From<KindArg> for KindTag {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Sample => KindTag::Sample,
            KindArg::Prep => KindTag::Prep,
        }
    }
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// SQLite database file (overrides the configuration file)
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// YAML store configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct TemplateArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Template kind
    #[arg(short, long, value_enum, default_value_t = KindArg::Sample)]
    pub kind: KindArg,
    /// Owning study or prep id
    #[arg(long)]
    pub owner: i64,
}

#[derive(Debug, Args)]
pub struct InputArgs {
    #[command(flatten)]
    pub template: TemplateArgs,
    /// Metadata file; the first column holds sample identifiers ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Field delimiter (supports ',', 'tab', ';', '|'); tab unless the file ends in .csv
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct UpdateCategoryArgs {
    #[command(flatten)]
    pub template: TemplateArgs,
    /// Category to update
    #[arg(long)]
    pub category: String,
    /// Assignments of the form `identifier=value`
    #[arg(
        long = "set",
        value_parser = parse_assignment,
        action = clap::ArgAction::Append,
        required = true
    )]
    pub assignments: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub template: TemplateArgs,
    /// Output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Restrict output to these comma-separated identifiers
    #[arg(long = "ids", value_delimiter = ',')]
    pub ids: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[command(flatten)]
    pub template: TemplateArgs,
    /// Restrict output to these comma-separated identifiers
    #[arg(long = "ids", value_delimiter = ',')]
    pub ids: Vec<String>,
    /// Show at most this many rows
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Destination YAML file
    #[arg(short, long)]
    pub output: PathBuf,
    /// Database path recorded in the configuration
    #[arg(long)]
    pub db: PathBuf,
    /// Busy timeout in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub busy_timeout_ms: u64,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

/// Splits `identifier=value`; the value may itself contain `=`.
pub fn parse_assignment(value: &str) -> Result<(String, String), String> {
    let (id, cell) = value
        .split_once('=')
        .ok_or_else(|| format!("Assignment '{value}' must look like identifier=value"))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(format!("Assignment '{value}' has an empty identifier"));
    }
    Ok((id.to_string(), cell.to_string()))
}
