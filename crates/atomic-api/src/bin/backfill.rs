//! atomic-backfill: embed entities and notes that were stored without a vector.
//!
//! Reads `DATABASE_URL`, the `DB_*` pool variables and, for `--mode real`,
//! the OpenAI settings from the environment (and `.env`). Prints the report
//! as JSON on stdout.

use clap::Parser;
use tracing::info;

use atomic_api::{logging, ServerConfig};
use atomic_db::{Database, PoolConfig};
use atomic_inference::{embedding_backend, EmbeddingMode, OpenAIConfig};
use atomic_search::{BackfillScope, EmbeddingBackfill, DEFAULT_BACKFILL_BATCH};

#[derive(Parser)]
#[command(name = "atomic-backfill")]
#[command(author, version, about = "Backfill missing embeddings for atomic notes")]
struct Cli {
    /// Tables to fill: entities, notes or all
    #[arg(short, long, default_value = "all", value_parser = parse_scope)]
    scope: BackfillScope,

    /// Embedding source: mock (deterministic), mock-random or real
    #[arg(short, long, default_value = "mock", value_parser = parse_mode)]
    mode: EmbeddingMode,

    /// Rows embedded per round trip
    #[arg(short, long, default_value_t = DEFAULT_BACKFILL_BATCH)]
    batch_size: i64,
}

fn parse_scope(s: &str) -> Result<BackfillScope, String> {
    BackfillScope::parse(s).ok_or_else(|| format!("unknown scope '{s}' (entities, notes, all)"))
}

fn parse_mode(s: &str) -> Result<EmbeddingMode, String> {
    EmbeddingMode::parse(s).ok_or_else(|| format!("unknown mode '{s}' (mock, mock-random, real)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init();

    let config = ServerConfig::from_env();
    let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;
    let embedder = embedding_backend(cli.mode, OpenAIConfig::from_env())?;
    info!(
        embedding_mode = cli.mode.as_str(),
        scope = ?cli.scope,
        batch_size = cli.batch_size,
        "Starting embedding backfill"
    );

    let report = EmbeddingBackfill::new(db.stores().backfill, embedder)
        .with_batch_size(cli.batch_size)
        .run(cli.scope)
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["atomic-backfill"]).unwrap();
        assert_eq!(cli.scope, BackfillScope::All);
        assert_eq!(cli.mode, EmbeddingMode::Mock);
        assert_eq!(cli.batch_size, DEFAULT_BACKFILL_BATCH);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "atomic-backfill",
            "--scope",
            "entities",
            "--mode",
            "real",
            "--batch-size",
            "25",
        ])
        .unwrap();
        assert_eq!(cli.scope, BackfillScope::Entities);
        assert_eq!(cli.mode, EmbeddingMode::Real);
        assert_eq!(cli.batch_size, 25);

        assert!(Cli::try_parse_from(["atomic-backfill", "--scope", "topics"]).is_err());
        assert!(Cli::try_parse_from(["atomic-backfill", "--mode", "gpt"]).is_err());
    }
}
