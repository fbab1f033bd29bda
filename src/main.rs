use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use atom_catalog::atom::{self, Entry, FeedCollector, FeedMetadata};
use atom_catalog::config::Config;
use atom_catalog::storage::{Database, DatabaseError, NetworkLink, UrlInfo, UrlType};
use atom_catalog::xml::ReadStatus;

/// Get the config directory path (~/.config/atom-catalog/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("atom-catalog"))
}

#[derive(Parser, Debug)]
#[command(name = "atom-catalog", about = "Read ATOM/OPDS catalog feeds and manage catalog links")]
struct Cli {
    /// Config file (default: ~/.config/atom-catalog/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Link database, overrides `database_path` from the config file
    #[arg(long, value_name = "FILE", global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a feed and print its metadata and entries
    Parse(ParseArgs),

    /// Manage stored catalog links
    #[command(subcommand)]
    Links(LinksCommand),

    /// Read or replace the extras of a link
    #[command(subcommand)]
    Extras(ExtrasCommand),
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Feed file, or `-` for stdin
    input: String,

    /// Stop after this many entries (0 = unlimited), overrides `max_entries`
    #[arg(long)]
    limit: Option<usize>,

    /// Input is a standalone <entry> document
    #[arg(long)]
    entry: bool,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum LinksCommand {
    /// List stored links
    List {
        #[arg(long)]
        json: bool,
    },
    /// Add a user-defined link
    Add {
        #[arg(long)]
        catalog_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        summary: Option<String>,
        /// URL of the link as KEY=URL (e.g. Catalog=https://...), repeatable
        #[arg(long = "url", value_name = "KEY=URL", value_parser = parse_url_arg)]
        urls: Vec<(UrlType, String)>,
    },
    /// Delete a link with its URLs and extras
    Remove { id: i64 },
    Enable { id: i64 },
    Disable { id: i64 },
}

#[derive(Subcommand, Debug)]
enum ExtrasCommand {
    Get {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Replace all extras of a link
    Set {
        id: i64,
        #[arg(value_name = "KEY=VALUE", value_parser = parse_pair)]
        pairs: Vec<(String, String)>,
    },
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_url_arg(s: &str) -> Result<(UrlType, String), String> {
    let (key, url) = parse_pair(s)?;
    let key = key.parse::<UrlType>().map_err(|e| e.to_string())?;
    Ok((key, url))
}

#[derive(Serialize)]
struct ParseOutput<'a> {
    metadata: Option<&'a FeedMetadata>,
    entries: &'a [Entry],
    interrupted: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let (config_path, config_dir) = config_location(cli.config.as_deref())?;
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match cli.command {
        Command::Parse(args) => run_parse(&args, &config),
        Command::Links(command) => {
            let db = open_database(cli.database.as_deref(), &config, &config_dir).await?;
            run_links(&db, command).await
        }
        Command::Extras(command) => {
            let db = open_database(cli.database.as_deref(), &config, &config_dir).await?;
            run_extras(&db, command).await
        }
    }
}

/// Config file and the directory relative paths in it resolve against.
/// `HOME` is only consulted when no `--config` was given.
fn config_location(config: Option<&Path>) -> Result<(PathBuf, PathBuf)> {
    match config {
        Some(path) => {
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            Ok((path.to_path_buf(), dir))
        }
        None => {
            let dir = get_config_dir()?;
            Ok((dir.join("config.toml"), dir))
        }
    }
}

fn run_parse(args: &ParseArgs, config: &Config) -> Result<()> {
    let limit = match args.limit {
        Some(0) => None,
        Some(n) => Some(n),
        None => config.entry_limit(),
    };
    let mut collector = match limit {
        Some(n) => FeedCollector::with_limit(n),
        None => FeedCollector::new(),
    };

    let source: Box<dyn BufRead> = if args.input == "-" {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(&args.input)
            .with_context(|| format!("Failed to open feed file '{}'", args.input))?;
        Box::new(BufReader::new(file))
    };

    let status = if args.entry {
        atom::read_entry(source, &mut collector)
    } else {
        atom::read_feed(source, &mut collector)
    }
    .with_context(|| format!("Failed to parse '{}'", args.input))?;

    let interrupted = status == ReadStatus::Interrupted;
    if args.json {
        let output = ParseOutput {
            metadata: collector.metadata.as_ref(),
            entries: &collector.entries,
            interrupted,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if let Some(metadata) = &collector.metadata {
        print_metadata(metadata);
    }
    for entry in &collector.entries {
        print_entry(entry, config.show_content);
    }
    if interrupted {
        println!("(stopped after {} entries)", collector.entries.len());
    }
    Ok(())
}

fn print_metadata(metadata: &FeedMetadata) {
    println!("{}", metadata.title.as_deref().unwrap_or("(untitled feed)"));
    if let Some(subtitle) = &metadata.subtitle {
        println!("  {}", subtitle);
    }
    if let Some(id) = &metadata.id {
        println!("  id: {}", id.uri);
    }
    if let Some(updated) = &metadata.updated {
        println!("  updated: {}", updated.date);
    }
    for author in &metadata.authors {
        println!("  author: {}", author.name);
    }
    for link in &metadata.links {
        println!(
            "  link [{}]: {}",
            link.rel.as_deref().unwrap_or("alternate"),
            link.href.as_deref().unwrap_or("")
        );
    }
    println!();
}

fn print_entry(entry: &Entry, show_content: bool) {
    println!("* {}", entry.title.as_deref().unwrap_or("(untitled entry)"));
    if !entry.authors.is_empty() {
        let names: Vec<&str> = entry.authors.iter().map(|a| a.name.as_str()).collect();
        println!("  by {}", names.join(", "));
    }
    if let Some(updated) = entry.updated.as_ref().or(entry.published.as_ref()) {
        println!("  {}", updated.date);
    }
    for link in &entry.links {
        if let Some(href) = &link.href {
            match &link.mime_type {
                Some(mime) => println!("  -> {} ({})", href, mime),
                None => println!("  -> {}", href),
            }
        }
    }
    if let Some(summary) = &entry.summary {
        println!("  {}", summary.replace('\n', "\n  "));
    }
    if show_content {
        if let Some(content) = &entry.content {
            println!("  {}", content.replace('\n', "\n  "));
        }
    }
}

fn resolve_database_path(
    override_path: Option<&Path>,
    config: &Config,
    config_dir: &Path,
) -> PathBuf {
    match override_path {
        Some(path) => path.to_path_buf(),
        None => config.database_path(config_dir),
    }
}

async fn open_database(
    override_path: Option<&Path>,
    config: &Config,
    config_dir: &Path,
) -> Result<Database> {
    let db_path = resolve_database_path(override_path, config, config_dir);
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(db_path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: The link database is locked by another process.");
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

async fn run_links(db: &Database, command: LinksCommand) -> Result<()> {
    match command {
        LinksCommand::List { json } => {
            let links = db.list_links().await.context("Failed to list links")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&links)?);
                return Ok(());
            }
            for link in &links {
                println!(
                    "{:>4}  {}{}  {} ({})",
                    link.id.unwrap_or_default(),
                    if link.is_enabled { "" } else { "[disabled] " },
                    link.title,
                    link.catalog_id,
                    if link.is_predefined { "predefined" } else { "custom" }
                );
                for (key, info) in &link.urls {
                    if let Some(url) = &info.url {
                        println!("        {}: {}", key, url);
                    }
                }
            }
        }
        LinksCommand::Add {
            catalog_id,
            title,
            summary,
            urls,
        } => {
            let mut link = NetworkLink::new(catalog_id, title);
            link.summary = summary;
            for (key, url) in urls {
                link.set_url(key, UrlInfo::new(url));
            }
            let id = db.save_link(&mut link).await.context("Failed to save link")?;
            println!("Added link {}", id);
        }
        LinksCommand::Remove { id } => {
            if !db.delete_link(id).await.context("Failed to delete link")? {
                anyhow::bail!("No link with id {}", id);
            }
            println!("Removed link {}", id);
        }
        LinksCommand::Enable { id } => set_enabled(db, id, true).await?,
        LinksCommand::Disable { id } => set_enabled(db, id, false).await?,
    }
    Ok(())
}

async fn set_enabled(db: &Database, id: i64, enabled: bool) -> Result<()> {
    if !db
        .set_link_enabled(id, enabled)
        .await
        .context("Failed to update link")?
    {
        anyhow::bail!("No link with id {}", id);
    }
    Ok(())
}

async fn run_extras(db: &Database, command: ExtrasCommand) -> Result<()> {
    match command {
        ExtrasCommand::Get { id, json } => {
            let extras = db.link_extras(id).await.context("Failed to read extras")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&extras)?);
            } else {
                for (key, value) in &extras {
                    println!("{}={}", key, value);
                }
            }
        }
        ExtrasCommand::Set { id, pairs } => {
            let extras: BTreeMap<String, String> = pairs.into_iter().collect();
            db.set_link_extras(id, &extras)
                .await
                .context("Failed to store extras")?;
        }
    }
    Ok(())
}
