pub mod catalog;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod frame;
pub mod identifiers;
pub mod io_utils;
pub mod kind;
pub mod mapping;
pub mod plan;
pub mod row;
pub mod schema;
pub mod store;
pub mod table;
pub mod template;
pub mod validate;
mod yaml_provider;

use std::{collections::BTreeMap, collections::BTreeSet, env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, StoreArgs, TemplateArgs},
    config::StoreConfig,
    data::Value,
    kind::TemplateKind,
    store::SqliteStore,
    template::MetadataTemplate,
};

pub use crate::error::{Result as TemplateResult, TemplateError};
pub use crate::frame::MetadataTable;
pub use crate::identifiers::TemplateWarning;
pub use crate::kind::{KindTag, PREP_TEMPLATE, SAMPLE_TEMPLATE};
pub use crate::mapping::MetadataMap;
pub use crate::row::Row;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("metadata_template", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Create(args) => handle_create(&args),
        Commands::Extend(args) => handle_extend(&args),
        Commands::Update(args) => handle_update(&args),
        Commands::UpdateCategory(args) => handle_update_category(&args),
        Commands::Delete(args) => handle_delete(&args),
        Commands::Export(args) => handle_export(&args),
        Commands::Show(args) => handle_show(&args),
        Commands::Categories(args) => handle_categories(&args),
        Commands::InitConfig(args) => handle_init_config(&args),
    }
}

fn open_store(args: &StoreArgs) -> Result<SqliteStore> {
    if args.db.is_none() && args.config.is_none() {
        bail!("Either --db or --config must be provided");
    }
    let config = StoreConfig::resolve(args.config.as_deref(), args.db.as_deref())?;
    let store = SqliteStore::open(&config)
        .with_context(|| format!("Opening store at {:?}", config.path))?;
    store::bootstrap(&store).context("Installing shared relations")?;
    Ok(store)
}

fn template_kind(args: &TemplateArgs) -> &'static TemplateKind {
    TemplateKind::from_tag(args.kind.into())
}

fn open_template<'s>(store: &'s SqliteStore, args: &TemplateArgs) -> Result<MetadataTemplate<'s>> {
    let kind = template_kind(args);
    MetadataTemplate::open(store, kind, args.owner)
        .with_context(|| format!("Opening {} template {}", kind.tag, args.owner))
}

fn report(warnings: &[TemplateWarning]) {
    if !warnings.is_empty() {
        info!("Completed with {} warning(s)", warnings.len());
    }
}

fn id_filter(ids: &[String]) -> Option<BTreeSet<String>> {
    let ids: BTreeSet<String> = ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

fn handle_create(args: &cli::InputArgs) -> Result<()> {
    let store = open_store(&args.template.store)?;
    let table = io_utils::read_metadata_table(&args.input, args.delimiter)?;
    let kind = template_kind(&args.template);
    debug!(
        "Read {} row(s) and {} column(s) from {:?}",
        table.len(),
        table.columns().len(),
        args.input
    );
    let (_, warnings) = MetadataTemplate::create(&store, kind, args.template.owner, &table)
        .with_context(|| format!("Creating {} template {}", kind.tag, args.template.owner))?;
    report(&warnings);
    Ok(())
}

fn handle_extend(args: &cli::InputArgs) -> Result<()> {
    let store = open_store(&args.template.store)?;
    let template = open_template(&store, &args.template)?;
    let table = io_utils::read_metadata_table(&args.input, args.delimiter)?;
    let warnings = template
        .extend(&table)
        .with_context(|| format!("Extending template from {:?}", args.input))?;
    report(&warnings);
    Ok(())
}

fn handle_update(args: &cli::InputArgs) -> Result<()> {
    let store = open_store(&args.template.store)?;
    let template = open_template(&store, &args.template)?;
    let table = io_utils::read_metadata_table(&args.input, args.delimiter)?;
    let warnings = template
        .update(&table)
        .with_context(|| format!("Updating template from {:?}", args.input))?;
    report(&warnings);
    Ok(())
}

fn handle_update_category(args: &cli::UpdateCategoryArgs) -> Result<()> {
    let store = open_store(&args.template.store)?;
    let template = open_template(&store, &args.template)?;
    let mapping: BTreeMap<String, Value> = args
        .assignments
        .iter()
        .map(|(id, value)| (id.clone(), Value::text(value.as_str())))
        .collect();
    template
        .update_category(&args.category, &mapping)
        .with_context(|| format!("Updating category '{}'", args.category))
}

fn handle_delete(args: &TemplateArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let kind = template_kind(args);
    MetadataTemplate::delete(&store, kind, args.owner)
        .with_context(|| format!("Deleting {} template {}", kind.tag, args.owner))
}

fn handle_export(args: &cli::ExportArgs) -> Result<()> {
    let store = open_store(&args.template.store)?;
    let template = open_template(&store, &args.template)?;
    let filter = id_filter(&args.ids);
    match &args.output {
        Some(path) => template.to_file(path, filter.as_ref()),
        None => {
            let table = template.to_dataframe(filter.as_ref())?;
            io_utils::write_metadata_table(None, template.kind().export_id_header, &table)
        }
    }
}

fn handle_show(args: &cli::ShowArgs) -> Result<()> {
    let store = open_store(&args.template.store)?;
    let template = open_template(&store, &args.template)?;
    let mut table = template.to_dataframe(id_filter(&args.ids).as_ref())?;
    if let Some(limit) = args.limit {
        let keep: BTreeSet<String> = table.ids().take(limit).map(str::to_string).collect();
        table = table.select(&keep, table.columns());
    }
    print!(
        "{}",
        table::render_metadata(template.kind().export_id_header, &table)
    );
    Ok(())
}

fn handle_categories(args: &TemplateArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let template = open_template(&store, args)?;
    for category in template.categories()? {
        println!("{category}");
    }
    Ok(())
}

fn handle_init_config(args: &cli::InitConfigArgs) -> Result<()> {
    let mut config = StoreConfig::new(args.db.clone());
    config.busy_timeout_ms = args.busy_timeout_ms;
    config.save(&args.output)?;
    info!("Store configuration written to {:?}", args.output);
    Ok(())
}
