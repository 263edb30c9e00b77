use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

use crate::services::grid_store::{
    DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_SIZE, DEFAULT_PREFIX, StoreConfig,
};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub prefix: String,
    pub chunk_size: usize,
    pub batch_size: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked file store on SQLite")]
pub struct Args {
    /// Host to bind to (overrides GRIDSTORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GRIDSTORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides GRIDSTORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Table name prefix (overrides GRIDSTORE_PREFIX)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Bytes per chunk row (overrides GRIDSTORE_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Bytes buffered per write batch (overrides GRIDSTORE_BATCH_SIZE)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Create the collections and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("GRIDSTORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("GRIDSTORE_PORT", 3000u16)?;
        let env_db = env::var("GRIDSTORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/gridstore.db".into());
        let env_prefix = env::var("GRIDSTORE_PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.into());
        let env_chunk = env_parse("GRIDSTORE_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let env_batch = env_parse("GRIDSTORE_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            prefix: args.prefix.unwrap_or(env_prefix),
            chunk_size: args.chunk_size.unwrap_or(env_chunk),
            batch_size: args.batch_size.unwrap_or(env_batch),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validated store settings; fails on a bad prefix or a zero chunk size.
    pub fn store_config(&self) -> Result<StoreConfig> {
        StoreConfig::new(self.prefix.clone(), self.chunk_size, self.batch_size)
            .context("invalid store configuration")
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
