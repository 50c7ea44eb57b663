use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use wiki_imaging::cache::MemoryDimensionCache;
use wiki_imaging::imaging::{self, formats};
use wiki_imaging::resolver::ImageResolver;
use wiki_imaging::store::{self, BlobStore, DerivativeGenerator};
use wiki_imaging::types::{DisplayConstraints, ImageReference};
use wiki_imaging::{config, naming, output};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "wiki-imaging")]
#[command(about = "Resolve wiki images to cached, resized derivatives")]
#[command(long_about = "\
Resolve wiki images to cached, resized derivatives

Given an uploaded image and the size a page wants to show it at, work out the
display size, round the width up to the configured increment, and find or
create the matching derivative.

Storage layouts:

  filesystem                       database (SQLite)
  uploads/                         file_version  one row per upload
  ├── en/2010/10/cat.jpg           file_data     original (resized = 0)
  └── resized/                                   + one row per derivative width
      └── en/2010/10/cat-400px.jpg

Database derivatives are addressed as {root}/{file id}/{version|0}/{width|0}/{name}.

Run 'wiki-imaging gen-config' to generate a documented wiki-imaging.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "wiki-imaging.toml", global = true)]
    config: PathBuf,

    /// Directory that relative storage paths are resolved against
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct ResolveArgs {
    /// Upload paths relative to the upload directory (filesystem backend)
    #[arg(conflicts_with = "file_id")]
    paths: Vec<String>,

    /// File id (database backend)
    #[arg(long)]
    file_id: Option<i64>,

    /// File version id; omit for the current version
    #[arg(long, requires = "file_id")]
    file_version: Option<i64>,

    /// Virtual wiki the page belongs to
    #[arg(long, default_value = "en")]
    wiki: String,

    /// Maximum display width in pixels (0 = unconstrained)
    #[arg(long, default_value_t = 0)]
    max_width: i32,

    /// Maximum display height in pixels (0 = unconstrained)
    #[arg(long, default_value_t = 0)]
    max_height: i32,

    /// Never display larger than the original
    #[arg(long)]
    no_enlarge: bool,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Report the dimensions and format of an image file
    Probe { file: PathBuf },
    /// Resolve images to display references and sizes
    Resolve(ResolveArgs),
    /// Store a file as a new version in the database
    Import {
        file: PathBuf,
        #[arg(long)]
        file_id: i64,
        /// MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,
    },
    /// Decode a database file reference
    ParseRef { reference: String },
    /// Print a stock wiki-imaging.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Probe { file } => {
            let bytes = std::fs::read(&file)?;
            let dims = imaging::probe_bytes(&bytes);
            let format = image::guess_format(&bytes)
                .ok()
                .and_then(formats::from_image_format)
                .or_else(|| extension_format(&file));
            output::print_probe(&file.display().to_string(), dims, format);
        }
        Command::Resolve(args) => {
            let config = config::load_config(&cli.config)?;
            let store = store::open(&config, &cli.root)?;
            let cache = Arc::new(MemoryDimensionCache::new());
            let resolver = ImageResolver::new(store, cache.clone(), config.resize.increment);
            let constraints = DisplayConstraints::new(args.max_width, args.max_height)
                .with_allow_enlarge(config.resize.allow_enlarge && !args.no_enlarge);

            let references: Vec<ImageReference> = match args.file_id {
                Some(id) => vec![ImageReference::blob(id, args.file_version)],
                None if args.paths.is_empty() => {
                    return Err("give at least one path or --file-id".into());
                }
                None => args.paths.iter().map(ImageReference::file).collect(),
            };

            let renderings: Vec<_> = references
                .iter()
                .map(|r| (r, resolver.render(&args.wiki, r, &constraints)))
                .collect();
            if args.json {
                let values: Vec<_> = renderings.iter().map(|(_, rendering)| rendering).collect();
                println!("{}", serde_json::to_string_pretty(&values)?);
            } else {
                for (reference, rendering) in &renderings {
                    output::print_rendering(reference, rendering);
                }
                println!("{}", output::format_cache_stats(&cache.stats()));
            }
        }
        Command::Import {
            file,
            file_id,
            mime,
        } => {
            let config = config::load_config(&cli.config)?;
            let generator = DerivativeGenerator::from_config(&config)?;
            let blobs = BlobStore::open(
                &cli.root.join(&config.storage.database),
                &config.storage.url_root,
                generator,
            )?;
            let bytes = std::fs::read(&file)?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or("import path has no file name")?;
            let mime = mime
                .or_else(|| extension_format(&file).map(|f| f.mime.to_string()))
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let version = blobs.insert_original(file_id, &filename, &mime, &bytes)?;
            output::print_import(&filename, file_id, version, imaging::probe_bytes(&bytes));
        }
        Command::ParseRef { reference } => {
            let blob = naming::parse_blob_reference(&reference)?;
            output::print_blob_ref(&reference, &blob);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. Warnings only unless `-v` is given.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn extension_format(path: &Path) -> Option<&'static formats::FormatInfo> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(formats::from_extension)
}
