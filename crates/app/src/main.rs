use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use place_retrieval_core::{
    discover_sources, load_catalog, BoxedEmbedder, Catalog, DataSource, Embedder, HttpEmbedder,
    IntentParser, RetrieverService, SemanticIndex, SourceKind, TrigramEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "place-retrieval", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    data: DataArgs,

    #[command(flatten)]
    embedding: EmbeddingArgs,

    /// Directory holding the semantic index artifacts
    #[arg(long, env = "PLACES_INDEX_DIR", default_value = "index")]
    index_dir: PathBuf,
}

#[derive(Args)]
struct DataArgs {
    /// General places file (JSON array of place records)
    #[arg(long, env = "PLACES_FILE")]
    places: Option<PathBuf>,

    /// Restaurants file
    #[arg(long, env = "RESTAURANTS_FILE")]
    restaurants: Option<PathBuf>,

    /// Hotels file
    #[arg(long, env = "HOTELS_FILE")]
    hotels: Option<PathBuf>,

    /// Directory scanned recursively for *.json place files
    #[arg(long, env = "PLACES_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Args)]
struct EmbeddingArgs {
    /// HTTP embedding endpoint; the offline trigram embedder is used when unset
    #[arg(long, env = "EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Model name sent to the embedding endpoint
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    embedding_model: String,

    /// Embedding vector length
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a query and print the resulting intent.
    Parse {
        #[arg(long)]
        query: String,
    },
    /// Parse a query and print the ranked places.
    Search {
        #[arg(long)]
        query: String,
        /// Override the result count inferred from the query.
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the strategy that produced the results.
        #[arg(long, default_value_t = false)]
        explain: bool,
    },
    /// Embed every catalog place and write the semantic index artifacts.
    BuildIndex,
}

impl DataArgs {
    fn sources(&self) -> anyhow::Result<Vec<DataSource>> {
        let mut sources = Vec::new();
        let named = [
            (&self.places, "places", SourceKind::General),
            (&self.restaurants, "restaurants", SourceKind::Restaurant),
            (&self.hotels, "hotels", SourceKind::Hotel),
        ];
        for (path, tag, kind) in named {
            if let Some(path) = path {
                sources.push(DataSource::new(tag, path.clone(), kind));
            }
        }

        if let Some(dir) = &self.data_dir {
            sources.extend(discover_sources(dir)?);
        }

        if sources.is_empty() {
            anyhow::bail!("no place sources configured; pass --places, --restaurants, --hotels or --data-dir");
        }
        Ok(sources)
    }

    fn catalog(&self) -> anyhow::Result<Catalog> {
        let report = load_catalog(&self.sources()?);
        if !report.skipped_sources.is_empty() {
            warn!(skipped = report.skipped_sources.len(), "some place sources were skipped");
            for skipped in &report.skipped_sources {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped source");
            }
        }
        Ok(report.catalog)
    }
}

impl EmbeddingArgs {
    fn embedder(&self) -> anyhow::Result<BoxedEmbedder> {
        match &self.embedding_url {
            Some(url) => Ok(Box::new(HttpEmbedder::new(
                url,
                self.embedding_model.clone(),
                self.embedding_dimensions,
            )?)),
            None => Ok(Box::new(TrigramEmbedder {
                dimensions: self.embedding_dimensions,
            })),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "place-retrieval boot"
    );

    let parser = IntentParser::new()?;

    match &cli.command {
        Command::Parse { query } => {
            let intent = parser.parse(query);
            println!("{}", serde_json::to_string_pretty(&intent)?);
        }
        Command::Search {
            query,
            top_k,
            explain,
        } => {
            let catalog = cli.data.catalog()?;
            let semantic = SemanticIndex::open(&cli.index_dir, cli.embedding.embedder()?, &catalog);
            let service = RetrieverService::new(catalog, semantic);

            let mut intent = parser.parse(query);
            if let Some(top_k) = top_k {
                intent.top_k = *top_k;
            }

            let result = service.search(&intent);
            if *explain {
                println!("explain: intent={}", serde_json::to_string(&intent)?);
                println!(
                    "explain: strategy={:?} fallback={:?}",
                    result.strategy, result.fallback
                );
            }

            if result.places.is_empty() {
                println!("no places found");
            }
            for (rank, place) in result.places.iter().enumerate() {
                let distance = place
                    .distance_km
                    .map(|km| format!(" distance_km={km:.3}"))
                    .unwrap_or_default();
                println!(
                    "{}. {} [{}] rating={}{} source={}",
                    rank + 1,
                    place.name,
                    place.category,
                    place.rating.as_deref().unwrap_or("N/A"),
                    distance,
                    place.source_file
                );
                if !place.address.is_empty() {
                    println!("   {}", place.address);
                }
            }
        }
        Command::BuildIndex => {
            let catalog = cli.data.catalog()?;
            if catalog.is_empty() {
                anyhow::bail!("catalog is empty; nothing to index");
            }
            let embedder = cli.embedding.embedder()?;
            info!(places = catalog.len(), dimensions = embedder.dimensions(), "building semantic index");

            let index = SemanticIndex::build(&catalog, embedder)?;
            let paths = index.save(&cli.index_dir)?;
            println!(
                "{} places indexed (build {}) at {}",
                index.len(),
                index.build_id(),
                Utc::now().to_rfc3339()
            );
            println!("  index={}", paths.index.display());
            println!("  mapping={}", paths.mapping.display());
        }
    }

    Ok(())
}
