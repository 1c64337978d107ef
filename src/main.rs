use clap::{Parser, Subcommand};
use media_manager::manager::{Asset, SaveOptions};
use media_manager::registry::Registry;
use media_manager::{config, output};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "media-manager")]
#[command(about = "Store, list and serve media through configured managers")]
#[command(long_about = "\
Store, list and serve media through configured managers

Each manager is a named namespace backed by local storage or an S3 bucket.
File managers store bytes as uploaded; image managers decode, resize,
thumbnail and re-encode every upload.

Managers are configured in a TOML file:

  prefix = \"/media\"
  [defaults]
  root = \"media\"
  [managers.photos]
  manager = \"image\"
  thumbnail_size = [200, 200, true]

Set RUST_LOG (e.g. RUST_LOG=debug) for detailed logs on stderr.

Run 'media-manager gen-config' to generate a documented media.toml.")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "media.toml", global = true)]
    config: PathBuf,

    /// Manager to use (may be omitted when only one is configured)
    #[arg(long, short, default_value = "", global = true)]
    manager: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save a file through the manager
    Save {
        /// File to upload
        file: PathBuf,
        /// Store under this name instead of the file's own name
        #[arg(long)]
        name: Option<String>,
        /// Replace an existing asset
        #[arg(long)]
        overwrite: bool,
        /// Store under a generated unique name
        #[arg(long, conflicts_with = "keep_name")]
        generate_name: bool,
        /// Keep the file's name (image managers generate one by default)
        #[arg(long)]
        keep_name: bool,
        /// Skip the thumbnail (image managers)
        #[arg(long)]
        no_thumbnail: bool,
    },
    /// Write an asset's bytes to stdout or a file
    Read {
        name: String,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete an asset (and its thumbnail)
    Delete { name: String },
    /// List every stored asset
    List,
    /// Show size, type, checksum and modification time
    Meta {
        name: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the public URL of an asset
    Url {
        name: String,
        /// Absolute URL using the configured external_url
        #[arg(long)]
        external: bool,
        /// URL of the thumbnail instead
        #[arg(long)]
        thumbnail: bool,
    },
    /// Bundle assets into a zip stored next to them
    Archive {
        /// Name of the archive to create
        archive: String,
        /// Assets to include
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Print a stock media.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let media_config = config::load_config(&cli.config)?;
    let registry = Registry::from_config(&media_config)?;
    let manager = registry.get(&cli.manager)?;

    match cli.command {
        Command::Save {
            file,
            name,
            overwrite,
            generate_name,
            keep_name,
            no_thumbnail,
        } => {
            let bytes = std::fs::read(&file)?;
            let mut asset = Asset::bytes(bytes);
            if let Some(filename) = file.file_name() {
                asset = asset.with_filename(filename.to_string_lossy());
            }
            let mut options = SaveOptions::default()
                .overwrite(overwrite)
                .create_thumbnail(!no_thumbnail);
            if generate_name {
                options = options.generate_name(true);
            } else if keep_name {
                options = options.generate_name(false);
            }
            let stored = manager.save(asset, name.as_deref(), options)?;
            let url = manager.url(&stored, false).ok();
            output::print_saved(manager.name(), &stored, url.as_deref());
        }
        Command::Read { name, output } => {
            let bytes = manager.read(&name)?;
            match output {
                Some(path) => std::fs::write(path, bytes)?,
                None => std::io::stdout().write_all(&bytes)?,
            }
        }
        Command::Delete { name } => {
            manager.delete(&name)?;
            let thumb = manager.thumbnail_name(&name);
            output::print_deleted(manager.name(), &name, thumb.as_deref());
        }
        Command::List => {
            let mut names = manager.list()?.collect::<Result<Vec<_>, _>>()?;
            names.sort();
            output::print_listing(manager.name(), &names);
        }
        Command::Meta { name, json } => {
            let meta = manager.metadata(&name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&meta)?);
            } else {
                output::print_metadata(&name, &meta);
            }
        }
        Command::Url {
            name,
            external,
            thumbnail,
        } => {
            let url = if thumbnail {
                manager.thumbnail_url(&name, external)?
            } else {
                manager.url(&name, external)?
            };
            println!("{}", url);
        }
        Command::Archive { archive, names } => {
            let members: Vec<&str> = names.iter().map(String::as_str).collect();
            let stored = manager.archive_files(&archive, &members)?;
            output::print_archived(manager.name(), &stored, &names);
        }
        // printed before any config was loaded
        Command::GenConfig => {}
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
