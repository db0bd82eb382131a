//! psi-client binary: run PSI exchanges against a PSI server

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use psi_client::{cache_from_config, ClientConfig, HttpSessionClient, Orchestrator, RemoteSession};
use psi_core::{ClientDataset, KeyMaterialStore};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "psi-client")]
#[command(about = "Compute a private set intersection with a PSI server")]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the algorithm and key size pairs the server supports
    List {
        /// Server URL (e.g., http://localhost:8080)
        #[arg(long)]
        server_url: Option<String>,
    },
    /// Run the full protocol and write the intersection
    Compute(ComputeArgs),
}

#[derive(Args, Debug)]
struct ComputeArgs {
    /// Server URL (e.g., http://localhost:8080)
    #[arg(long)]
    server_url: Option<String>,

    /// Client dataset, one entry per line
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,

    /// Intersection output file
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Algorithm (BS, DH, ECBS, ECDH)
    #[arg(short = 'a', long)]
    algorithm: Option<String>,

    /// Key size in bits
    #[arg(short = 'k', long)]
    key_size: Option<u32>,

    /// Key description to reuse from an earlier run
    #[arg(long)]
    key_description: Option<PathBuf>,

    /// Where to write this run's key description
    #[arg(long)]
    output_key_description: Option<PathBuf>,

    /// Cache encryptions in Redis
    #[arg(long)]
    cache: bool,

    #[arg(long)]
    cache_host: Option<String>,

    #[arg(long)]
    cache_port: Option<u16>,

    /// Use the server Bloom filter if younger than this many minutes
    #[arg(long)]
    bloom_filter_max_age: Option<i64>,

    /// Server entries requested per page
    #[arg(long)]
    page_size: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl ComputeArgs {
    fn apply(self, config: &mut ClientConfig) {
        if let Some(url) = self.server_url {
            config.server_url = url;
        }
        if let Some(input) = self.input {
            config.input_dataset = Some(input);
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(algorithm) = self.algorithm {
            config.algorithm = algorithm;
        }
        if let Some(key_size) = self.key_size {
            config.key_size = key_size;
        }
        if let Some(path) = self.key_description {
            config.key_description = Some(path);
        }
        if let Some(path) = self.output_key_description {
            config.output_key_description = path;
        }
        if self.cache {
            config.cache.enabled = true;
        }
        if let Some(host) = self.cache_host {
            config.cache.host = host;
        }
        if let Some(port) = self.cache_port {
            config.cache.port = port;
        }
        if let Some(minutes) = self.bloom_filter_max_age {
            config.bloom_filter_max_age_minutes = Some(minutes);
        }
        if let Some(size) = self.page_size {
            config.page_size = size;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = timeout;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("psi_client=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    match cli.command {
        Command::List { server_url } => {
            if let Some(url) = server_url {
                config.server_url = url;
            }
            list(&config).await
        }
        Command::Compute(args) => {
            args.apply(&mut config);
            compute(&config).await
        }
    }
}

async fn list(config: &ClientConfig) -> anyhow::Result<()> {
    let remote = HttpSessionClient::with_timeout(&config.server_url, config.request_timeout())?;
    let parameters = remote.list_parameters().await?;
    if parameters.is_empty() {
        anyhow::bail!("Server at {} supports no PSI parameters", remote.base_url());
    }
    for parameter in parameters {
        println!("{}", parameter);
    }
    Ok(())
}

async fn compute(config: &ClientConfig) -> anyhow::Result<()> {
    config.validate()?;
    let input = config
        .input_dataset
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("No input dataset given (use -i or input_dataset)"))?;

    let dataset = ClientDataset::load(input)?;
    tracing::info!(path = %input.display(), entries = dataset.len(), "Loaded client dataset");

    let remote = HttpSessionClient::with_timeout(&config.server_url, config.request_timeout())?;
    let cache = cache_from_config(&config.cache).await?;

    let mut builder = Orchestrator::builder(Arc::new(remote))
        .cache(cache)
        .page_size(config.page_size)
        .key_output(&config.output_key_description);
    if let Some(path) = &config.key_description {
        let key = KeyMaterialStore::load(path, config.algorithm_kind()?)?;
        builder = builder.key_description(key);
    }
    if let Some(max_age) = config.bloom_filter_max_age() {
        builder = builder.bloom_filter_max_age(max_age);
    }

    let mut orchestrator = builder.build();
    let report = match orchestrator.run(&dataset, &config.algorithm, config.key_size).await {
        Ok(report) => report,
        Err(failure) => {
            for phase in &failure.statistics.phases {
                tracing::info!(
                    phase = %phase.phase,
                    operations = phase.operations(),
                    cache_hit = phase.cache_hit,
                    cache_miss = phase.cache_miss,
                    "Partial statistics"
                );
            }
            return Err(failure.into());
        }
    };

    report.write_intersection(&config.output)?;
    tracing::info!(
        session_id = report.session_id,
        entries = report.intersection.len(),
        output = %config.output.display(),
        total_cache_hit = report.statistics.total_cache_hit,
        total_cache_miss = report.statistics.total_cache_miss,
        "PSI complete"
    );
    Ok(())
}
