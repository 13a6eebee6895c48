//! gutencache CLI: metadata cache for a static bibliographic corpus.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use gutencache::cache::MetadataCache;
use gutencache::catalog::CatalogDump;
use gutencache::config::{CacheConfig, RemoteConfig};
use gutencache::model::EtextId;
use gutencache::populate::{CancelToken, DEFAULT_BATCH_SIZE, PopulateOptions};
use gutencache::text::{MirrorTextSource, TextSource, strip_headers};
use gutencache::vocabulary::Predicate;

#[derive(Parser)]
#[command(name = "gutencache", version, about = "Metadata cache for a static bibliographic corpus")]
struct Cli {
    /// Storage directory for the cache (defaults to the XDG data dir).
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Config file to read (defaults to the XDG config path).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend to use: embedded_kv, embedded_relational, or remote_triplestore.
    #[arg(long, global = true)]
    backend: Option<String>,

    /// SPARQL endpoint for the remote backend.
    #[arg(long, global = true)]
    remote_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the cache from a catalog dump (one-shot, can take hours).
    Populate {
        /// Path to the catalog dump (tar or tar.gz of RDF records).
        dump: PathBuf,

        /// Triples per atomic write batch.
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Clear an existing cache first instead of refusing to run.
        #[arg(long)]
        refresh: bool,
    },

    /// Look up all values of a predicate for one etext.
    Metadata {
        /// Predicate name (title, author, language, subject, rights, formaturi).
        predicate: Predicate,
        /// Numeric etext id.
        etext: u64,
    },

    /// Reverse lookup: all etexts carrying an exact (predicate, value) pair.
    Etexts {
        /// Predicate name.
        predicate: Predicate,
        /// Exact value to match.
        value: String,
    },

    /// List the predicates present in the cache.
    Predicates,

    /// Show the cache's backend, location, and lifecycle state.
    Status,

    /// Drop all cached metadata.
    Clear,

    /// Download a work's plain text from a mirror.
    Fetch {
        /// Numeric etext id.
        etext: u64,

        /// Mirror root URL (defaults to GUTENBERG_MIRROR or the public mirror).
        #[arg(long)]
        mirror: Option<String>,

        /// Print the raw text including the licensing boilerplate.
        #[arg(long)]
        raw: bool,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Populate {
            dump,
            batch_size,
            refresh,
        } => {
            let cache = MetadataCache::open(config).into_diagnostic()?;
            let dump = CatalogDump::open(dump);
            let options = PopulateOptions { batch_size };
            let token = CancelToken::new();

            if refresh {
                cache.clear().into_diagnostic()?;
            }
            let stats = cache
                .populate_with(&dump, &options, &token)
                .into_diagnostic()?;
            println!(
                "Populated: {} records, {} triples ({} records and {} facts skipped)",
                stats.records, stats.triples, stats.skipped_records, stats.skipped_facts
            );
        }

        Commands::Metadata { predicate, etext } => {
            let cache = MetadataCache::open(config).into_diagnostic()?;
            let id = parse_etext(etext)?;
            let values = cache.get_metadata(predicate, id).into_diagnostic()?;
            if values.is_empty() {
                println!("No {predicate} recorded for etext {etext}.");
            } else {
                for value in values {
                    println!("{value}");
                }
            }
        }

        Commands::Etexts { predicate, value } => {
            let cache = MetadataCache::open(config).into_diagnostic()?;
            let ids = cache.get_etexts(predicate, &value).into_diagnostic()?;
            if ids.is_empty() {
                println!("No etexts with {predicate} = \"{value}\".");
            } else {
                for id in ids {
                    println!("{}", id.get());
                }
            }
        }

        Commands::Predicates => {
            let cache = MetadataCache::open(config).into_diagnostic()?;
            let predicates = cache.list_supported_predicates().into_diagnostic()?;
            if predicates.is_empty() {
                println!("Cache holds no predicates (not populated yet?).");
            } else {
                for predicate in predicates {
                    println!("{predicate}");
                }
            }
        }

        Commands::Status => {
            let cache = MetadataCache::open(config).into_diagnostic()?;
            let state = cache.state().into_diagnostic()?;
            println!("backend:  {}", cache.config().backend);
            println!("location: {}", cache.config().storage_location.display());
            println!("state:    {state}");
        }

        Commands::Clear => {
            let cache = MetadataCache::open(config).into_diagnostic()?;
            cache.clear().into_diagnostic()?;
            println!("Cache cleared.");
        }

        Commands::Fetch { etext, mirror, raw } => {
            let id = parse_etext(etext)?;
            let source = match mirror {
                Some(mirror) => MirrorTextSource::new(mirror),
                None => MirrorTextSource::default_mirror(),
            };
            let source = match gutencache::paths::GutenPaths::resolve() {
                Ok(paths) => source.with_cache_dir(paths.text_cache_dir()),
                Err(_) => source,
            };
            let text = source.fetch(id).into_diagnostic()?;
            if raw {
                print!("{text}");
            } else {
                println!("{}", strip_headers(&text));
            }
        }
    }

    Ok(())
}

/// Merge the config file with command-line overrides.
fn resolve_config(cli: &Cli) -> Result<CacheConfig> {
    let mut config = match &cli.config {
        Some(path) => CacheConfig::from_file(path).into_diagnostic()?,
        None => {
            let paths = gutencache::paths::GutenPaths::resolve().into_diagnostic()?;
            let file = paths.config_file();
            if file.is_file() {
                CacheConfig::from_file(&file).into_diagnostic()?
            } else {
                CacheConfig::default_locations().into_diagnostic()?
            }
        }
    };

    if let Some(storage) = &cli.storage {
        config.storage_location = storage.clone();
    }
    if let Some(endpoint) = &cli.remote_endpoint {
        config = config.with_remote(RemoteConfig::new(endpoint.clone()));
    }
    if let Some(backend) = &cli.backend {
        config.backend = backend.parse().into_diagnostic()?;
    }
    Ok(config)
}

fn parse_etext(raw: u64) -> Result<EtextId> {
    EtextId::new(raw).ok_or_else(|| miette::miette!("etext ids start at 1"))
}
