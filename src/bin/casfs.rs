#![forbid(unsafe_code)]
#![allow(clippy::too_many_lines)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use casfs::cas::{Cas, CasOptions};
use casfs::cli::{self as prog_cli, OutputMode};
use casfs::extent::{ExtentPacker, ExtentPackerConfig};
use casfs::path_map::PathMapperOptions;
use casfs::storage::{FsBlobStorage, FsMetadataStore};
use casfs::vfs::Vfs;

#[derive(Parser, Debug)]
#[command(name = "casfs", version, about = "Content-addressable storage + page VFS CLI", long_about = None)]
struct Cli {
    #[arg(long, global = true, default_value = "./casfs-data")]
    data_dir: PathBuf,

    #[arg(long, global = true, value_enum, default_value = "human")]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum Format {
    Human,
    Plain,
    Json,
}

impl From<Format> for OutputMode {
    fn from(value: Format) -> Self {
        match value {
            Format::Human => OutputMode::Human,
            Format::Plain => OutputMode::Plain,
            Format::Json => OutputMode::Json,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Store an object (reads from a file, or stdin if omitted)")]
    Put {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value = "blob")]
        object_type: String,
    },
    #[command(about = "Retrieve an object by hash")]
    Get {
        hash: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    #[command(about = "Check whether an object exists")]
    Has { hash: String },
    #[command(about = "Drop a reference to an object")]
    Delete { hash: String },
    #[command(about = "Reclaim objects with a zero refcount")]
    Gc {
        #[arg(long)]
        dry_run: bool,
    },
    #[command(about = "Print cache/refcount/existence-cache statistics")]
    Stats,
    #[command(about = "List a VFS directory")]
    Ls { path: String },
    #[command(about = "Stat a VFS path")]
    Stat { path: String },
    #[command(about = "Create a VFS directory")]
    Mkdir {
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },
    #[command(about = "Print a VFS file's contents")]
    Cat { path: String },
    #[command(about = "Write a VFS file (reads from a file, or stdin if omitted)")]
    Write {
        path: String,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    #[command(about = "Remove a VFS file")]
    Rm { path: String },
    #[command(name = "feature", about = "Manage runtime feature flags")]
    Feature {
        #[command(subcommand)]
        action: FeatureAction,
    },
}

#[derive(Subcommand, Debug)]
enum FeatureAction {
    List,
    Enable { name: String },
    Disable { name: String },
}

fn into_prog_command(cmd: Commands) -> prog_cli::Command {
    match cmd {
        Commands::Put { input, object_type } => prog_cli::Command::Put { input, object_type },
        Commands::Get { hash, output } => prog_cli::Command::Get { hash, output },
        Commands::Has { hash } => prog_cli::Command::Has { hash },
        Commands::Delete { hash } => prog_cli::Command::Delete { hash },
        Commands::Gc { dry_run } => prog_cli::Command::Gc { dry_run },
        Commands::Stats => prog_cli::Command::Stats,
        Commands::Ls { path } => prog_cli::Command::Ls { path },
        Commands::Stat { path } => prog_cli::Command::Stat { path },
        Commands::Mkdir { path, recursive } => {
            prog_cli::Command::Mkdir { path, recursive, mode: 0o755 }
        }
        Commands::Cat { path } => prog_cli::Command::Cat { path },
        Commands::Write { path, input } => prog_cli::Command::Write { path, input, mode: 0o644 },
        Commands::Rm { path } => prog_cli::Command::Rm { path },
        Commands::Feature { action } => match action {
            FeatureAction::List => prog_cli::Command::FeatureList,
            FeatureAction::Enable { name } => prog_cli::Command::FeatureEnable { name },
            FeatureAction::Disable { name } => prog_cli::Command::FeatureDisable { name },
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    casfs::logger::configure_from_env();
    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.data_dir)?;
    let metadata_dir = cli.data_dir.join("metadata");

    let blob_backend = Arc::new(FsBlobStorage::new(cli.data_dir.clone()));
    let metadata = Arc::new(FsMetadataStore::new(metadata_dir));

    let cas = Cas::new(
        blob_backend.clone(),
        CasOptions {
            path_mapper: PathMapperOptions { base_dir: "objects".to_string(), prefix_len: 2 },
            ..Default::default()
        },
    );

    let packer = Arc::new(ExtentPacker::new(
        blob_backend,
        metadata,
        ExtentPackerConfig { extents_base_dir: "extents".to_string(), ..Default::default() },
    ));
    let vfs = Vfs::new(packer);

    let mode = OutputMode::from(cli.format);
    let command = into_prog_command(cli.command);
    prog_cli::run_with_format(&cas, &vfs, command, mode).await
}
