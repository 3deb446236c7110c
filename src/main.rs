//! tunecast CLI
//!
//! Top-k recommendation serving over precomputed matrix factorization factors.
//!
//! # Usage
//!
//! ```bash
//! # Serve user keys from stdin, one id per output line
//! tunecast serve --items items.txt --users users.txt --blacklist black.txt --artists artists.txt
//!
//! # One-shot recommendations for a few users, as JSON
//! tunecast recommend --items items.txt --users users.txt --format json u1 u2
//!
//! # Inspect the loaded files and the ranking index
//! tunecast stats --items items.txt --users users.txt
//! ```

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tunecast::{
    serve, write_recommendation, BallTreeParams, OutputFormat, Recommender, Separators,
    ServeConfig, Strategy, DEFAULT_ARTIST_MARKER,
};

#[derive(Parser)]
#[command(name = "tunecast")]
#[command(about = "Top-k recommendation serving over matrix factorization factors")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read user keys from stdin and write recommendations to stdout
    Serve {
        #[command(flatten)]
        data: DataArgs,

        /// Output format (plain|json)
        #[arg(long, default_value = "plain")]
        format: OutputFormat,
    },

    /// Recommend for the given users, ranked in parallel
    Recommend {
        #[command(flatten)]
        data: DataArgs,

        /// Output format (plain|json)
        #[arg(long, default_value = "plain")]
        format: OutputFormat,

        /// User keys
        #[arg(required = true)]
        users: Vec<String>,
    },

    /// Display statistics about the loaded files and ranking index
    Stats {
        #[command(flatten)]
        data: DataArgs,
    },
}

#[derive(Args)]
struct DataArgs {
    /// Item factor file (`id:bias|f1|...|fd`)
    #[arg(long)]
    items: PathBuf,

    /// User factor file (`key:bias|f1|...|fd`)
    #[arg(long)]
    users: Option<PathBuf>,

    /// Per-user blacklist file (`key:item|aARTIST|...`)
    #[arg(long)]
    blacklist: Option<PathBuf>,

    /// Artist to tracks file (`artist:item|item|...`)
    #[arg(long)]
    artists: Option<PathBuf>,

    /// Ranking strategy (exact|accelerated)
    #[arg(long, default_value = "accelerated")]
    strategy: Strategy,

    /// Number of recommendations per user
    #[arg(short = 'k', long = "top-k", default_value = "50")]
    top_k: usize,

    /// Number of cached user results (0 disables the cache)
    #[arg(long, default_value = "1000")]
    cache_size: usize,

    /// Separator between record key and payload
    #[arg(long, default_value = ":")]
    key_sep: char,

    /// Separator between payload fields
    #[arg(long, default_value = "|")]
    field_sep: char,

    /// Leading character marking an artist reference in blacklists
    #[arg(long, default_value_t = DEFAULT_ARTIST_MARKER)]
    artist_marker: char,

    /// Ball tree leaf capacity
    #[arg(long, default_value = "16")]
    leaf_size: usize,
}

impl DataArgs {
    fn into_config(self) -> ServeConfig {
        let mut config = ServeConfig::new(self.items)
            .with_strategy(self.strategy)
            .with_top_k(self.top_k)
            .with_cache_capacity(self.cache_size);
        config.users_path = self.users;
        config.blacklist_path = self.blacklist;
        config.artists_path = self.artists;
        config.separators = Separators::new(self.key_sep, self.field_sep);
        config.artist_marker = self.artist_marker;
        config.tree = BallTreeParams {
            max_leaf_size: self.leaf_size,
            ..BallTreeParams::default()
        };
        config
    }
}

fn main() -> anyhow::Result<()> {
    // stdout carries results only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { data, format } => {
            let recommender = Recommender::open(data.into_config())?;
            let stdin = io::stdin();
            let stdout = io::stdout();
            serve(&recommender, stdin.lock(), stdout.lock(), format)?;
        }

        Commands::Recommend {
            data,
            format,
            users,
        } => {
            let recommender = Recommender::open(data.into_config())?;
            let recs = recommender.recommend_batch(&users);

            let stdout = io::stdout();
            let mut out = stdout.lock();
            for rec in &recs {
                write_recommendation(&mut out, rec, format)?;
            }
            out.flush()?;
        }

        Commands::Stats { data } => {
            let recommender = Recommender::open(data.into_config())?;
            let stats = recommender.stats();
            let config = recommender.config();

            println!("Item Catalog: {:?}", config.items_path);
            println!("  Items: {}", stats.items);
            println!("  Dimensions: {}", stats.dim);
            println!("  Strategy: {}", stats.strategy);
            if let Some(tree) = stats.tree {
                println!("  Ball Tree:");
                println!("    Nodes: {}", tree.nodes);
                println!("    Leaves: {}", tree.leaves);
                println!("    Depth: {}", tree.depth);
            }

            let stores = [
                ("User Factors", &config.users_path, stats.users),
                ("Blacklist", &config.blacklist_path, stats.blacklist),
                ("Artists", &config.artists_path, stats.artists),
            ];
            for (label, path, store) in stores {
                let Some(path) = path else {
                    continue;
                };
                match store {
                    Some(store) => {
                        println!("{}: {:?}", label, path);
                        println!("  Records: {}", store.records);
                        println!("  Skipped Lines: {}", store.skipped);
                        println!(
                            "  File Size: {:.2} MB",
                            store.bytes as f64 / (1024.0 * 1024.0)
                        );
                    }
                    None => println!("{}: {:?} (unavailable)", label, path),
                }
            }

            println!("Fallback: {:?}", recommender.fallback());
        }
    }

    Ok(())
}
