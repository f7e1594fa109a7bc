//! matdb CLI - Command-line tool for Materials CDB databases.
//!
//! This is the main entry point for the matdb command-line application.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use matdb_cdb::{MaterialDatabase, ObjectId};

/// matdb - Materials component database inspection and export tool
#[derive(Parser)]
#[command(name = "matdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load databases and print table statistics
    Info {
        /// CDB files, loaded in order (later files patch earlier ones)
        #[arg(short, long, env = "MATDB_INPUT", num_args = 1.., value_delimiter = ',', required = true)]
        input: Vec<PathBuf>,
    },

    /// List top-level materials
    List {
        /// CDB files, loaded in order (later files patch earlier ones)
        #[arg(short, long, env = "MATDB_INPUT", num_args = 1.., value_delimiter = ',', required = true)]
        input: Vec<PathBuf>,

        /// List every object instead of top-level materials only
        #[arg(short, long)]
        all: bool,

        /// Show base, parent and component counts
        #[arg(short, long)]
        detailed: bool,
    },

    /// Export one material as JSON
    Export {
        /// CDB files, loaded in order (later files patch earlier ones)
        #[arg(short, long, env = "MATDB_INPUT", num_args = 1.., value_delimiter = ',', required = true)]
        input: Vec<PathBuf>,

        /// Material path or `res:` id
        #[arg(short, long)]
        material: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export every top-level material to a directory of JSON files
    ExportAll {
        /// CDB files, loaded in order (later files patch earlier ones)
        #[arg(short, long, env = "MATDB_INPUT", num_args = 1.., value_delimiter = ',', required = true)]
        input: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, env = "MATDB_OUTPUT")]
        output: PathBuf,

        /// File listing material paths, one per line; names the output files
        #[arg(short, long)]
        names: Option<PathBuf>,

        /// Filter pattern (glob-style) on material paths or ids
        #[arg(short, long)]
        filter: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { input } => {
            cmd_info(&input)?;
        }
        Commands::List { input, all, detailed } => {
            cmd_list(&input, all, detailed)?;
        }
        Commands::Export {
            input,
            material,
            output,
        } => {
            cmd_export(&input, &material, output.as_deref())?;
        }
        Commands::ExportAll {
            input,
            output,
            names,
            filter,
        } => {
            cmd_export_all(&input, &output, names.as_deref(), filter.as_deref())?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(inputs: &[PathBuf]) -> Result<MaterialDatabase> {
    let mut database = MaterialDatabase::new();
    let start = Instant::now();

    for path in inputs {
        let summary = database
            .load_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        debug!(
            "{}: version {}, {} objects, {} components",
            path.display(),
            summary.version,
            summary.objects,
            summary.components
        );
    }

    eprintln!(
        "Loaded {} file(s) in {:?}: {} objects",
        inputs.len(),
        start.elapsed(),
        database.object_count()
    );
    Ok(database)
}

fn cmd_info(inputs: &[PathBuf]) -> Result<()> {
    let database = load(inputs)?;
    let stats = database.stats();

    println!("Objects:        {}", stats.objects);
    println!("Components:     {}", stats.components);
    println!("Classes:        {}", stats.classes);
    println!("Names:          {}", stats.names);
    println!("Strings:        {} ({} bytes)", stats.strings, stats.string_bytes);
    println!("Arena nodes:    {} ({} bytes)", stats.arena.nodes, stats.arena.bytes);
    println!("COW copies:     {}", stats.arena.cow_copies);
    println!("Materials:      {}", database.top_level_materials().count());

    Ok(())
}

fn cmd_list(inputs: &[PathBuf], all: bool, detailed: bool) -> Result<()> {
    let database = load(inputs)?;

    let ids: Vec<ObjectId> = if all {
        database.objects().map(|(id, _)| id).collect()
    } else {
        database.top_level_materials().collect()
    };

    for &id in &ids {
        let object = database.object(id);
        if detailed {
            let base = object
                .base_object
                .map(|b| database.object(b).persistent_id.to_string())
                .unwrap_or_default();
            println!(
                "{} {:>4} {:>30} {}",
                object.persistent_id,
                object.components.len(),
                base,
                if object.has_data { "D" } else { " " }
            );
        } else {
            println!("{}", object.persistent_id);
        }
    }

    println!("\nTotal: {} objects", ids.len());

    Ok(())
}

fn cmd_export(inputs: &[PathBuf], material: &str, output: Option<&Path>) -> Result<()> {
    let database = load(inputs)?;

    let json = database
        .material_json(material)
        .context("Failed to export material")?
        .with_context(|| format!("Material not found: {}", material))?;

    match output {
        Some(path) => fs::write(path, json).context("Failed to write output file")?,
        None => println!("{}", json),
    }

    Ok(())
}

fn cmd_export_all(
    inputs: &[PathBuf],
    output: &Path,
    names: Option<&Path>,
    filter: Option<&str>,
) -> Result<()> {
    let database = load(inputs)?;
    let pattern = filter
        .map(|f| Pattern::new(&f.to_lowercase()))
        .transpose()
        .context("Invalid filter pattern")?;

    // (output name, object) pairs.
    let mut targets: Vec<(String, ObjectId)> = Vec::new();
    match names {
        Some(list) => {
            let text = fs::read_to_string(list).context("Failed to read material name list")?;
            for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if relative_output_path(line).is_none() {
                    warn!("skipping material name outside the output directory: {}", line);
                    continue;
                }
                match database.object_by_path(line) {
                    Some(id) => targets.push((line.replace('\\', "/"), id)),
                    None => warn!("material not found: {}", line),
                }
            }
        }
        None => {
            for id in database.top_level_materials() {
                let pid = database.object(id).persistent_id.to_string();
                targets.push((pid.replace(':', "_"), id));
            }
        }
    }
    if let Some(pattern) = &pattern {
        targets.retain(|(name, _)| pattern.matches(&name.to_lowercase()));
    }

    println!("Exporting {} materials to {}...", targets.len(), output.display());

    fs::create_dir_all(output)?;

    let pb = ProgressBar::new(targets.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let exporter = matdb_cdb::export::JsonExporter::new(&database);
    let start = Instant::now();
    let mut exported = 0;
    let mut errors = 0;

    for (name, id) in &targets {
        let Some(relative) = relative_output_path(name) else {
            continue;
        };
        let output_path = output.join(relative).with_extension("json");

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        match exporter.material_json(*id) {
            Ok(json) => {
                fs::write(&output_path, json)?;
                exported += 1;
            }
            Err(e) => {
                pb.println(format!("Error exporting {}: {}", name, e));
                errors += 1;
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("Done");
    println!(
        "Exported {} materials in {:?} ({} errors)",
        exported,
        start.elapsed(),
        errors
    );

    Ok(())
}

/// Turn a material name into a path below the output directory.
///
/// Returns `None` for names that would escape it: `..` segments, absolute
/// paths and drive prefixes.
fn relative_output_path(name: &str) -> Option<PathBuf> {
    if name.starts_with(['/', '\\']) {
        return None;
    }
    let mut path = PathBuf::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains(':') => return None,
            s => path.push(s),
        }
    }
    (!path.as_os_str().is_empty()).then_some(path)
}
