//! cacheproxy CLI
//!
//! Inspect and edit a cache through the proxy, with the same key hashing
//! and value packing the library applies.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

use cacheproxy::{
    multi_get, CacheConfig, CacheProxy, Expiry, KeyDescriptor, KeyHasher, Profile,
};

/// cacheproxy CLI
#[derive(Parser, Debug)]
#[command(name = "cacheproxy-cli")]
#[command(about = "Transparent caching proxy for Redis-compatible stores")]
#[command(version)]
struct Args {
    /// Profile file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Profile to use
    #[arg(short, long, default_value = "production")]
    profile: String,

    /// Store host
    #[arg(long)]
    host: Option<String>,

    /// Store port
    #[arg(long)]
    port: Option<u16>,

    /// Store password
    #[arg(long)]
    password: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read a value
    Get {
        /// Key (JSON object for a structured key)
        key: String,
    },

    /// Write a JSON value
    Set {
        key: String,

        /// Value as JSON; anything unparseable is stored as a string
        value: String,

        /// Expiry in seconds, replacing the profile default
        #[arg(long)]
        ex: Option<u64>,
    },

    /// Delete a value and its fragments
    Del { key: String },

    /// Remaining time-to-live in seconds
    Ttl { key: String },

    /// Read several values in one batch
    Mget {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Print the physical key without contacting the store
    Hash { key: String },

    /// Run the connectivity probe
    Ping,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "info,cacheproxy=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt().with_env_filter(filter).with_target(true).init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args.command, config).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// Profile file (or built-in preset) plus command-line overrides
fn load_config(args: &Args) -> cacheproxy::Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::load(path, &args.profile)?,
        None => {
            let profile = Profile::from_name(&args.profile).ok_or_else(|| {
                cacheproxy::CacheError::Configuration(format!(
                    "unknown profile '{}' (no config file given)",
                    args.profile
                ))
            })?;
            CacheConfig::for_profile(profile)
        }
    };

    if let Some(host) = &args.host {
        config.connection.host = host.clone();
    }
    if let Some(port) = args.port {
        config.connection.port = port;
    }
    if let Some(password) = &args.password {
        config.connection.credential = Some(password.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn run(command: Commands, config: CacheConfig) -> cacheproxy::Result<()> {
    if let Commands::Hash { key } = &command {
        let hasher = KeyHasher::new(config.prefix.clone());
        println!("{}", hasher.hash(&KeyDescriptor::parse_arg(key)));
        return Ok(());
    }

    tracing::info!("cacheproxy-cli v{}", cacheproxy::VERSION);
    let proxy = CacheProxy::connect(config).await?;

    match command {
        Commands::Get { key } => match proxy.get::<Value>(KeyDescriptor::parse_arg(&key)).await? {
            Some(record) => {
                println!("{}", record.value);
                tracing::info!("written at {} ({})", record.timestamp, record.hashed_key);
            }
            None => println!("(nil)"),
        },

        Commands::Set { key, value, ex } => {
            let value: Value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let reply = proxy
                .set_with(KeyDescriptor::parse_arg(&key), &value, ex.map(Expiry::Ex))
                .await?;
            println!("{:?}", reply);
        }

        Commands::Del { key } => {
            let removed = proxy.del(KeyDescriptor::parse_arg(&key)).await?;
            println!("(integer) {}", removed);
        }

        Commands::Ttl { key } => {
            let ttl = proxy.ttl(KeyDescriptor::parse_arg(&key)).await?;
            println!("(integer) {}", ttl);
        }

        Commands::Mget { keys } => {
            let keys: Vec<KeyDescriptor> = keys.iter().map(|k| KeyDescriptor::parse_arg(k)).collect();
            let result = multi_get::<Value>(&proxy, &keys).await?;
            for (key, record) in result {
                match record {
                    Some(record) => println!("{} => {}", key, record.value),
                    None => println!("{} => (nil)", key),
                }
            }
        }

        Commands::Ping => {
            proxy.check_connectivity().await?;
            println!("PONG");
        }

        Commands::Hash { .. } => {}
    }

    Ok(())
}
