use anyhow::{bail, Context};
use broker_research_core::{
    read_chunks, Answer, EngineConfig, ExtractiveSynthesizer, HashingEmbedder, InMemoryRetriever,
    OpenAiSynthesizer, PostprocessPipeline, QdrantStore, QueryEngine, Retriever, Synthesizer,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type DynRetriever = Box<dyn Retriever + Send + Sync>;
type DynSynthesizer = Box<dyn Synthesizer + Send + Sync>;

#[derive(Parser)]
#[command(name = "broker-research", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON engine config; flags below override individual values.
    #[arg(long, env = "BROKER_RESEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Chunk corpus (JSON Lines or JSON array) for in-memory retrieval or indexing.
    #[arg(long, env = "BROKER_RESEARCH_CORPUS")]
    corpus: Option<PathBuf>,

    /// Qdrant base URL; when set, queries are served from Qdrant.
    #[arg(long, env = "QDRANT_URL")]
    qdrant_url: Option<String>,

    /// Qdrant collection
    #[arg(long, default_value = "broker_research_chunks")]
    qdrant_collection: String,

    /// API key for the answering model.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Chat model used for synthesis.
    #[arg(long, env = "OPENAI_LLM_MODEL")]
    model: Option<String>,

    /// Candidates requested from the retriever.
    #[arg(long)]
    top_k: Option<usize>,

    /// Maximum chunks kept per page.
    #[arg(long)]
    max_per_page: Option<usize>,

    /// Maximum chunks kept per report.
    #[arg(long)]
    max_per_document: Option<usize>,

    /// Token-overlap ratio above which chunks count as duplicates.
    #[arg(long)]
    similarity_threshold: Option<f64>,

    /// Distinct content types wanted before diversification is skipped.
    #[arg(long)]
    min_types: Option<usize>,

    /// Disable content-type diversification.
    #[arg(long, default_value_t = false)]
    no_diversify: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question from the indexed report chunks.
    Query {
        /// Question to answer
        #[arg(long)]
        query: String,
        /// Quote excerpts instead of calling the answering model.
        #[arg(long, default_value_t = false)]
        offline: bool,
        /// Print the answer and its sources as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Embed the corpus and upsert it into Qdrant.
    Index,
    /// Run only the post-processing stages over a candidate file and print the result.
    Postprocess {
        /// Candidate chunks (JSON Lines or JSON array), in retrieval order.
        #[arg(long)]
        candidates: PathBuf,
    },
}

impl Cli {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };

        if let Some(top_k) = self.top_k {
            config.retrieval.similarity_top_k = top_k;
        }
        if let Some(model) = &self.model {
            config.synthesis.model = model.clone();
        }
        let postprocess = &mut config.postprocess;
        if let Some(value) = self.max_per_page {
            postprocess.max_per_page = value;
        }
        if let Some(value) = self.max_per_document {
            postprocess.max_per_document = value;
        }
        if let Some(value) = self.similarity_threshold {
            postprocess.similarity_threshold = value;
        }
        if let Some(value) = self.min_types {
            postprocess.min_types = value;
        }
        if self.no_diversify {
            postprocess.prefer_diverse = false;
        }

        config.validate()?;
        Ok(config)
    }

    fn qdrant_store(&self, url: &str) -> anyhow::Result<QdrantStore> {
        Ok(QdrantStore::new(
            url,
            &self.qdrant_collection,
            HashingEmbedder::default(),
            Duration::from_secs(30),
        )?)
    }

    async fn retriever(&self) -> anyhow::Result<DynRetriever> {
        if let Some(url) = &self.qdrant_url {
            info!(url = %url, collection = %self.qdrant_collection, "using qdrant retriever");
            return Ok(Box::new(self.qdrant_store(url)?));
        }

        let Some(path) = &self.corpus else {
            bail!("either --qdrant-url or --corpus is required");
        };
        let chunks = read_chunks(path)
            .await
            .with_context(|| format!("failed to read corpus {}", path.display()))?;
        info!(path = %path.display(), chunks = chunks.len(), "loaded in-memory corpus");
        Ok(Box::new(InMemoryRetriever::from_chunks(chunks)))
    }

    fn synthesizer(&self, config: &EngineConfig, offline: bool) -> anyhow::Result<DynSynthesizer> {
        match (&self.openai_api_key, offline) {
            (Some(key), false) if !key.trim().is_empty() => Ok(Box::new(OpenAiSynthesizer::new(
                key.clone(),
                config.synthesis.clone(),
            )?)),
            (_, true) => Ok(Box::new(ExtractiveSynthesizer::default())),
            _ => {
                warn!("OPENAI_API_KEY is not set, answering with extracted excerpts");
                Ok(Box::new(ExtractiveSynthesizer::default()))
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.engine_config()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "broker-research boot"
    );

    match &cli.command {
        Command::Query {
            query,
            offline,
            json,
        } => {
            let engine = QueryEngine::new(
                cli.retriever().await?,
                cli.synthesizer(&config, *offline)?,
                &config,
            )?;
            let answer = engine.query_or_fallback(query).await;

            if *json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }
        Command::Index => {
            let Some(url) = &cli.qdrant_url else {
                bail!("--qdrant-url is required for indexing");
            };
            let Some(path) = &cli.corpus else {
                bail!("--corpus is required for indexing");
            };

            let chunks = read_chunks(path)
                .await
                .with_context(|| format!("failed to read corpus {}", path.display()))?;
            if chunks.is_empty() {
                println!("0 chunks indexed (corpus is empty)");
                return Ok(());
            }

            let store = cli.qdrant_store(url)?;
            store.ensure_collection().await?;
            let written = store.index_chunks(&chunks).await?;

            println!("{written} chunks indexed at {}", Utc::now().to_rfc3339());
        }
        Command::Postprocess { candidates } => {
            let chunks = read_chunks(candidates)
                .await
                .with_context(|| format!("failed to read candidates {}", candidates.display()))?;
            let pipeline = PostprocessPipeline::from_config(&config.postprocess)?;
            let kept = pipeline.run(chunks);

            println!("{}", serde_json::to_string_pretty(&kept)?);
        }
    }

    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("query: {}", answer.query);
    println!("{}\n", answer.text);

    for (position, source) in answer.sources.iter().enumerate() {
        let score = source
            .score
            .map(|score| format!("{score:.4}"))
            .unwrap_or_else(|| "-".to_string());
        let page = source
            .page_number
            .map(|page| page.to_string())
            .unwrap_or_default();
        println!(
            "[{}] {} {} {} page={} type={} score={}",
            position + 1,
            source.broker,
            source.ticker,
            source.report_date,
            page,
            source.content_type,
            score
        );
        println!("  {}", source.text_preview);
    }
}
