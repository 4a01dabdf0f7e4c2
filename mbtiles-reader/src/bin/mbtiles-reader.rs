use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Parser, Subcommand};
use mbtiles_reader::TileStore;
use tokio::io::AsyncWriteExt as _;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Defines the styles used for the CLI help output.
const HELP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Blue.on_default().bold())
    .usage(AnsiColor::Blue.on_default().bold())
    .literal(AnsiColor::White.on_default())
    .placeholder(AnsiColor::Green.on_default());

#[derive(Parser, PartialEq, Debug)]
#[command(
    version,
    name = "mbtiles-reader",
    about = "Read tiles and metadata from .mbtiles files",
    after_help = "Use RUST_LOG environment variable to control logging level, e.g. RUST_LOG=debug or RUST_LOG=mbtiles_reader=trace.",
    styles = HELP_STYLES
)]
pub struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, PartialEq, Debug)]
enum Commands {
    /// Print the metadata of a file, completed with inferred zoom levels, bounds and center
    #[command(name = "info", alias = "meta")]
    Info {
        /// `MBTiles` file path or `mbtiles://` URI
        file: String,
        /// Print JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
    /// Fetch a single tile using XYZ coordinates
    #[command(name = "tile", alias = "get", allow_negative_numbers = true)]
    Tile {
        /// `MBTiles` file path or `mbtiles://` URI
        file: String,
        z: i32,
        x: i64,
        y: i64,
        /// Write the tile to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mbtiles_reader=info"));
    tracing_subscriber::fmt()
        .compact()
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    if let Err(err) = main_int().await {
        error!("{err}");
        std::process::exit(1);
    }
}

async fn main_int() -> anyhow::Result<()> {
    let args = Args::parse();
    match args.command {
        Commands::Info { file, json } => {
            let store = TileStore::open_uri(&file).await?;
            let info = store.get_info().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(info)?);
            } else {
                print!("{}", serde_yaml::to_string(info)?);
            }
            store.close().await;
        }
        Commands::Tile {
            file,
            z,
            x,
            y,
            output,
        } => {
            let store = TileStore::open_uri(&file).await?;
            let tile = store.get_tile(z, x, y).await?;
            store.close().await;
            for (name, value) in tile.headers.iter() {
                eprintln!("{name}: {value}");
            }
            if let Some(path) = output {
                tokio::fs::write(&path, &tile.data).await?;
            } else {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&tile.data).await?;
                stdout.flush().await?;
            }
        }
    }

    Ok(())
}
