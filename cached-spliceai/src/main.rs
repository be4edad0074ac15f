use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use cached_spliceai::logging::{init_logging, Verbosity};
use cached_spliceai::scorer::{CommandScorer, DEFAULT_PROGRAM};
use spliceai_cache::cache::{
    namespaced_key, AnnotationContext, CacheConfig, KeyDeriver, KeyEncoding, KeyValueStore,
    MemoizedStore, MemoryStore, RedisConfig, RedisStore, ScoringParams, StoreFailurePolicy,
};
use spliceai_cache::pipeline::Annotator;
use spliceai_cache::vcf::{open_input, open_output, VcfReader, VcfWriter};

#[derive(Parser)]
#[command(name = "cached-spliceai")]
#[command(about = "SpliceAI variant annotation backed by a Redis result cache", long_about = None)]
#[command(version, disable_version_flag = true)]
struct Cli {
    /// Verbosity level (debug, info, warning, error, critical)
    #[arg(short = 'V', long, global = true, default_value_t = Verbosity::Info)]
    verbosity: Verbosity,

    /// Print version
    #[arg(long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate a VCF, scoring only variants missing from the cache
    Annotate {
        #[command(flatten)]
        io: IoArgs,

        #[command(flatten)]
        context: ContextArgs,

        #[command(flatten)]
        keys: KeyArgs,

        #[command(flatten)]
        server: ServerArgs,

        /// SpliceAI program run on cache misses
        #[arg(long, default_value = DEFAULT_PROGRAM)]
        scorer: PathBuf,

        /// Records resolved concurrently; output order is kept
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,

        /// Let concurrent misses on the same key each run the scorer
        #[arg(long)]
        no_single_flight: bool,

        /// Write the run summary as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print the cache key of every record
    Key {
        /// Input VCF, defaults to standard in
        #[arg(short = 'I', value_name = "input")]
        input: Option<PathBuf>,

        #[command(flatten)]
        context: ContextArgs,

        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Delete the cached entries of every record
    Invalidate {
        /// Input VCF, defaults to standard in
        #[arg(short = 'I', value_name = "input")]
        input: Option<PathBuf>,

        #[command(flatten)]
        context: ContextArgs,

        #[command(flatten)]
        keys: KeyArgs,

        #[command(flatten)]
        server: ServerArgs,
    },

    /// Delete every entry under the namespace
    Purge {
        #[command(flatten)]
        keys: KeyArgs,

        #[command(flatten)]
        server: ServerArgs,
    },

    /// Check that the cache server answers
    Ping {
        #[command(flatten)]
        server: ServerArgs,
    },
}

#[derive(Args)]
struct IoArgs {
    /// Input VCF (plain or gzip), defaults to standard in
    #[arg(short = 'I', value_name = "input")]
    input: Option<PathBuf>,

    /// Output VCF, defaults to standard out
    #[arg(short = 'O', value_name = "output")]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct ContextArgs {
    /// Reference genome fasta file
    #[arg(short = 'R', value_name = "reference")]
    reference: String,

    /// "grch37", "grch38", or a custom gene annotation file
    #[arg(short = 'A', value_name = "annotation")]
    annotation: String,

    /// Maximum distance between the variant and gained/lost splice site
    #[arg(short = 'D', value_name = "distance", default_value_t = 50,
          value_parser = clap::value_parser!(i64).range(0..5000))]
    distance: i64,

    /// Mask scores representing annotated acceptor/donor gain and unannotated acceptor/donor loss
    #[arg(short = 'M', value_name = "mask", default_value_t = 0,
          value_parser = clap::value_parser!(i64).range(0..=1))]
    mask: i64,
}

impl ContextArgs {
    fn deriver(&self, keys: &KeyArgs) -> KeyDeriver {
        KeyDeriver::new(
            AnnotationContext::new(&self.reference, &self.annotation),
            ScoringParams::new(self.distance, self.mask),
        )
        .with_encoding(keys.key_encoding)
    }
}

#[derive(Args)]
struct KeyArgs {
    /// Cache key layout (delimited or hashed)
    #[arg(long, default_value_t = KeyEncoding::Delimited)]
    key_encoding: KeyEncoding,

    /// Tag every stored key with "<namespace>:"
    #[arg(long)]
    namespace: Option<String>,
}

#[derive(Args)]
struct ServerArgs {
    /// Cache server host
    #[arg(short = 'H', long, env = "CACHE_HOST", required_unless_present = "no_cache_server")]
    cache_host: Option<String>,

    /// Cache server port
    #[arg(short = 'P', long, env = "CACHE_PORT", default_value_t = 6379)]
    cache_port: u16,

    /// Cache database number
    #[arg(short = 'N', long, default_value_t = 0)]
    cache_number: i64,

    /// File whose first line is the cache password
    #[arg(short = 'S', long)]
    cache_password_file: Option<PathBuf>,

    /// What a cache server failure does: degrade to scoring, or abort
    #[arg(long, default_value_t = StoreFailurePolicy::Degrade)]
    store_failure: StoreFailurePolicy,

    /// Keep the cache in memory for this run only
    #[arg(long)]
    no_cache_server: bool,
}

impl ServerArgs {
    fn redis_config(&self) -> Result<RedisConfig> {
        let host = self
            .cache_host
            .clone()
            .context("--cache-host is required without --no-cache-server")?;
        let config = RedisConfig::new(host, self.cache_port).with_db(self.cache_number);

        match &self.cache_password_file {
            Some(path) => config
                .with_password_file(path)
                .with_context(|| format!("Failed to read password file {}", path.display())),
            None => {
                warn!("No password specified for cache database");
                Ok(config)
            }
        }
    }

    fn cache_config(&self, keys: &KeyArgs) -> CacheConfig {
        let mut builder = CacheConfig::builder()
            .key_encoding(keys.key_encoding)
            .failure_policy(self.store_failure);
        if let Some(namespace) = &keys.namespace {
            builder = builder.namespace(namespace.as_str());
        }
        builder.build()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbosity);

    match cli.command {
        Commands::Annotate {
            io,
            context,
            keys,
            server,
            scorer,
            jobs,
            no_single_flight,
            report,
        } => {
            let config = CacheConfig {
                single_flight: !no_single_flight,
                concurrency: jobs,
                ..server.cache_config(&keys)
            };
            let job = AnnotateJob {
                io,
                deriver: context.deriver(&keys),
                scorer,
                report,
            };
            if server.no_cache_server {
                info!("No cache server: results are kept for this run only");
                job.run(MemoizedStore::new(MemoryStore::new(), config)?).await?;
            } else {
                let store = RedisStore::new(&server.redis_config()?)?;
                job.run(MemoizedStore::new(store, config)?).await?;
            }
        }

        Commands::Key {
            input,
            context,
            keys,
        } => {
            let deriver = context.deriver(&keys);
            let mut reader = VcfReader::new(open_input(input.as_deref())?)?;
            for record in reader.records() {
                let key = deriver.key_for(&record?)?;
                println!("{}", namespaced_key(keys.namespace.as_deref(), &key));
            }
        }

        Commands::Invalidate {
            input,
            context,
            keys,
            server,
        } => {
            let deriver = context.deriver(&keys);
            let config = server.cache_config(&keys);
            let reader = VcfReader::new(open_input(input.as_deref())?)?;
            let (removed, total) = if server.no_cache_server {
                invalidate(MemoizedStore::new(MemoryStore::new(), config)?, &deriver, reader).await?
            } else {
                let store = RedisStore::new(&server.redis_config()?)?;
                invalidate(MemoizedStore::new(store, config)?, &deriver, reader).await?
            };
            println!("Removed {} of {} cached entries", removed, total);
        }

        Commands::Purge { keys, server } => {
            let config = server.cache_config(&keys);
            let removed = if server.no_cache_server {
                MemoizedStore::new(MemoryStore::new(), config)?.invalidate_all().await?
            } else {
                let store = RedisStore::new(&server.redis_config()?)?;
                MemoizedStore::new(store, config)?.invalidate_all().await?
            };
            println!("Removed {} cached entries", removed);
        }

        Commands::Ping { server } => {
            if server.no_cache_server {
                println!("No cache server configured");
            } else {
                let config = server.redis_config()?;
                RedisStore::new(&config)?.ping().await.with_context(|| {
                    format!("Cache server {}:{} unreachable", config.host, config.port)
                })?;
                println!("Cache server {}:{} is reachable", config.host, config.port);
            }
        }
    }

    Ok(())
}

struct AnnotateJob {
    io: IoArgs,
    deriver: KeyDeriver,
    scorer: PathBuf,
    report: Option<PathBuf>,
}

impl AnnotateJob {
    async fn run<S: KeyValueStore>(self, memo: MemoizedStore<S>) -> Result<()> {
        let input = open_input(self.io.input.as_deref())
            .with_context(|| format!("Failed to open input {:?}", self.io.input))?;
        let reader = VcfReader::new(input).context("Failed to read VCF header")?;
        let output = open_output(self.io.output.as_deref())
            .with_context(|| format!("Failed to open output {:?}", self.io.output))?;
        let mut writer = VcfWriter::new(output);

        let scorer = CommandScorer::new(reader.header().clone()).with_program(self.scorer);
        let summary = Annotator::new(self.deriver, &memo, scorer)
            .run(reader, &mut writer)
            .await?;

        if let Some(path) = self.report {
            let json = serde_json::to_string_pretty(&summary)?;
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write report {}", path.display()))?;
        }
        Ok(())
    }
}

async fn invalidate<S: KeyValueStore, R: std::io::BufRead>(
    memo: MemoizedStore<S>,
    deriver: &KeyDeriver,
    mut reader: VcfReader<R>,
) -> Result<(u64, u64)> {
    let mut removed = 0;
    let mut total = 0;
    for record in reader.records() {
        let key = deriver.key_for(&record?)?;
        total += 1;
        if memo.invalidate(&key).await? {
            removed += 1;
        }
    }
    Ok((removed, total))
}
