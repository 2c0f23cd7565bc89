use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pdf_qa_core::{
    CachePolicy, CharacterNgramEmbedder, DatasetStore, EchoModel, Embedder, GenerationParams,
    HttpChatModel, HttpChatModelConfig, HttpEmbedder, HttpEmbedderConfig, IndexCache,
    IngestionOptions, IngestionPipeline, LanguageModel, LengthUnit, LopdfExtractor, PromptConfig,
    QueryCoordinator, RetrievalAnswerer, S3ObjectStore, S3Settings, DEFAULT_CACHE_CAPACITY,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_PROMPT_TEMPLATE,
    DEFAULT_TOP_K,
};
use pdf_qa_server::{admin, query, AdminState, HttpConfig, QueryState, DEFAULT_MAX_UPLOAD_BYTES};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const OPENAI_EMBEDDING_DIMENSIONS: usize = 1_536;

#[derive(Parser)]
#[command(name = "pdf-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    storage: StorageArgs,

    #[command(flatten)]
    embedding: EmbeddingArgs,

    #[command(flatten)]
    llm: LlmArgs,

    /// Timeout for each embedding or completion request, in seconds.
    #[arg(long, env = "PROVIDER_TIMEOUT_SECS", default_value_t = 120)]
    provider_timeout_secs: u64,
}

#[derive(Args)]
struct StorageArgs {
    /// Bucket holding every dataset artifact.
    #[arg(long, env = "BUCKET_NAME")]
    bucket: String,

    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    /// Endpoint of an S3-compatible service such as MinIO.
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    s3_endpoint: Option<String>,

    #[arg(long, env = "S3_FORCE_PATH_STYLE", default_value_t = false)]
    force_path_style: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbeddingProvider {
    /// Deterministic character trigram hashing, no network calls.
    Local,
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
}

#[derive(Args)]
struct EmbeddingArgs {
    #[arg(long, env = "EMBEDDING_PROVIDER", value_enum, default_value = "openai")]
    embedding_provider: EmbeddingProvider,

    #[arg(long, env = "EMBEDDING_URL", default_value = "https://api.openai.com/v1/")]
    embedding_url: String,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    #[arg(long, env = "EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    #[arg(long, env = "EMBEDDING_BATCH_SIZE", default_value_t = 64)]
    embedding_batch_size: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum LlmProvider {
    /// OpenAI-compatible `/chat/completions` endpoint.
    Openai,
    /// Echoes the last prompt line; for wiring checks.
    Echo,
}

#[derive(Args)]
struct LlmArgs {
    #[arg(long, env = "LLM_PROVIDER", value_enum, default_value = "openai")]
    llm_provider: LlmProvider,

    #[arg(long, env = "LLM_URL", default_value = "https://api.openai.com/v1/")]
    llm_url: String,

    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o-mini")]
    llm_model: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.5)]
    temperature: f32,

    #[arg(long, env = "LLM_MAX_TOKENS", default_value_t = 4_096)]
    max_tokens: u32,

    /// Stop sequences, comma separated.
    #[arg(long = "stop", env = "LLM_STOP", value_delimiter = ',', default_value = "\n\nHuman")]
    stop_sequences: Vec<String>,

    /// Number of chunks retrieved per question.
    #[arg(long, env = "TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// File with a prompt template containing `{context}` and `{question}`.
    #[arg(long, env = "PROMPT_TEMPLATE")]
    prompt_template: Option<PathBuf>,
}

#[derive(Args)]
struct HttpArgs {
    /// Allowed CORS origins, comma separated; empty allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Vec<String>,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,
}

impl HttpArgs {
    fn config(&self) -> HttpConfig {
        HttpConfig {
            cors_origins: self.cors_origins.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

#[derive(Args)]
struct ChunkArgs {
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Unit for chunk size and overlap: words or characters.
    #[arg(long, default_value_t = LengthUnit::Words)]
    length_unit: LengthUnit,
}

impl ChunkArgs {
    fn options(&self) -> IngestionOptions {
        IngestionOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            length_unit: self.length_unit,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingestion service (upload and document URLs).
    ServeAdmin {
        #[arg(long, env = "ADMIN_ADDR", default_value = "0.0.0.0:8100")]
        addr: SocketAddr,

        /// Lifetime of presigned document URLs, in seconds.
        #[arg(long, env = "PRESIGN_TTL_SECS", default_value_t = 3_600)]
        presign_ttl_secs: u64,

        #[command(flatten)]
        http: HttpArgs,
    },
    /// Run the query service (list, load, ask, preview).
    ServeQuery {
        #[arg(long, env = "QUERY_ADDR", default_value = "0.0.0.0:8000")]
        addr: SocketAddr,

        /// Maximum number of loaded contexts kept in memory.
        #[arg(long, env = "CACHE_CAPACITY", default_value_t = DEFAULT_CACHE_CAPACITY)]
        cache_capacity: usize,

        /// Seconds after which a loaded context must be loaded again.
        #[arg(long, env = "CACHE_TTL_SECS")]
        cache_ttl_secs: Option<u64>,

        #[command(flatten)]
        http: HttpArgs,
    },
    /// Ingest a PDF, or every PDF below a folder.
    Ingest {
        path: PathBuf,

        #[command(flatten)]
        chunking: ChunkArgs,
    },
    /// Load a dataset and answer one question.
    Ask {
        base_name: String,
        question: String,
    },
    /// Print the recorded questions and answers of a dataset.
    History { base_name: String },
}

struct Providers {
    store: Arc<DatasetStore>,
    embedder: Arc<dyn Embedder>,
}

async fn connect(cli: &Cli) -> anyhow::Result<Providers> {
    let settings = S3Settings {
        bucket: cli.storage.bucket.clone(),
        region: cli.storage.region.clone(),
        endpoint_url: cli.storage.s3_endpoint.clone(),
        force_path_style: cli.storage.force_path_style,
    };
    let objects = S3ObjectStore::connect(&settings).await;
    info!(bucket = %settings.bucket, region = %settings.region, "object store ready");

    Ok(Providers {
        store: Arc::new(DatasetStore::new(Arc::new(objects))),
        embedder: build_embedder(&cli.embedding, provider_timeout(cli))?,
    })
}

fn provider_timeout(cli: &Cli) -> Duration {
    Duration::from_secs(cli.provider_timeout_secs)
}

fn build_embedder(args: &EmbeddingArgs, timeout: Duration) -> anyhow::Result<Arc<dyn Embedder>> {
    match args.embedding_provider {
        EmbeddingProvider::Local => Ok(Arc::new(CharacterNgramEmbedder {
            dimensions: args
                .embedding_dimensions
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
        })),
        EmbeddingProvider::Openai => {
            let embedder = HttpEmbedder::new(HttpEmbedderConfig {
                base_url: args.embedding_url.clone(),
                model: args.embedding_model.clone(),
                api_key: args.embedding_api_key.clone(),
                dimensions: args
                    .embedding_dimensions
                    .unwrap_or(OPENAI_EMBEDDING_DIMENSIONS),
                batch_size: args.embedding_batch_size.max(1),
                timeout,
            })
            .context("failed to configure embedding client")?;
            Ok(Arc::new(embedder))
        }
    }
}

fn build_model(args: &LlmArgs, timeout: Duration) -> anyhow::Result<Arc<dyn LanguageModel>> {
    match args.llm_provider {
        LlmProvider::Echo => Ok(Arc::new(EchoModel)),
        LlmProvider::Openai => {
            let model = HttpChatModel::new(HttpChatModelConfig {
                base_url: args.llm_url.clone(),
                model: args.llm_model.clone(),
                api_key: args.llm_api_key.clone(),
                timeout,
            })
            .context("failed to configure chat client")?;
            Ok(Arc::new(model))
        }
    }
}

fn build_prompt(args: &LlmArgs) -> anyhow::Result<PromptConfig> {
    let generation = GenerationParams {
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        stop_sequences: args
            .stop_sequences
            .iter()
            .filter(|stop| !stop.is_empty())
            .cloned()
            .collect(),
    };

    let prompt = match &args.prompt_template {
        Some(path) => PromptConfig::from_file(path, args.top_k, generation)
            .with_context(|| format!("failed to load prompt template {}", path.display()))?,
        None => PromptConfig::new(DEFAULT_PROMPT_TEMPLATE, args.top_k, generation)
            .context("invalid prompt settings")?,
    };
    Ok(prompt)
}

fn build_coordinator(
    cli: &Cli,
    providers: Providers,
    policy: CachePolicy,
) -> anyhow::Result<QueryCoordinator> {
    let model = build_model(&cli.llm, provider_timeout(cli))?;
    let answerer = RetrievalAnswerer::new(providers.embedder, model, build_prompt(&cli.llm)?);
    let cache = IndexCache::new(policy).context("invalid cache policy")?;
    Ok(QueryCoordinator::new(providers.store, cache, answerer))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-qa boot"
    );

    let providers = connect(&cli).await?;

    match &cli.command {
        Command::ServeAdmin {
            addr,
            presign_ttl_secs,
            http,
        } => {
            let pipeline = IngestionPipeline::new(
                providers.store,
                providers.embedder,
                Arc::new(LopdfExtractor),
            );
            let state = AdminState {
                pipeline: Arc::new(pipeline),
                presign_ttl: Duration::from_secs(*presign_ttl_secs),
            };
            pdf_qa_server::serve("admin", *addr, admin::router(state, &http.config())).await?;
        }
        Command::ServeQuery {
            addr,
            cache_capacity,
            cache_ttl_secs,
            http,
        } => {
            let policy = CachePolicy {
                capacity: *cache_capacity,
                ttl: cache_ttl_secs.map(Duration::from_secs),
            };
            let coordinator = build_coordinator(&cli, providers, policy)?;
            let state = QueryState {
                coordinator: Arc::new(coordinator),
            };
            pdf_qa_server::serve("query", *addr, query::router(state, &http.config())).await?;
        }
        Command::Ingest { path, chunking } => {
            let options = chunking.options();
            let pipeline = IngestionPipeline::new(
                providers.store,
                providers.embedder,
                Arc::new(LopdfExtractor),
            );

            if path.is_dir() {
                let report = pipeline.ingest_folder_best_effort(path, &options).await?;
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
                for ingested in &report.ingested {
                    println!(
                        "{}: {} chunks from {} pages",
                        ingested.dataset, ingested.chunks, ingested.pages
                    );
                }
                println!(
                    "{} pdf(s) ingested, {} skipped at {}",
                    report.ingested.len(),
                    report.skipped_files.len(),
                    Utc::now().to_rfc3339()
                );
            } else {
                let report = pipeline.ingest_file(path, &options).await?;
                println!(
                    "{}: {} chunks from {} pages",
                    report.dataset, report.chunks, report.pages
                );
            }
        }
        Command::Ask {
            base_name,
            question,
        } => {
            let coordinator = build_coordinator(&cli, providers, CachePolicy::default())?;
            let chunks = coordinator.load_context(base_name).await?;
            info!(dataset = %base_name, chunks, "context loaded");
            println!("{}", coordinator.ask(base_name, question).await?);
        }
        Command::History { base_name } => {
            let coordinator = build_coordinator(&cli, providers, CachePolicy::default())?;
            for record in coordinator.history(base_name).await? {
                println!("[{}] Q: {}", record.timestamp.to_rfc3339(), record.query);
                println!("A: {}\n", record.response);
            }
        }
    }

    Ok(())
}
