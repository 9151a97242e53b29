use std::{env, path::PathBuf};

use anyhow::{Context, Result, anyhow};
use axum::http::HeaderValue;
use clap::Parser;

use crate::auth::PasswordHasher;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

/// Command-line overrides; anything left unset falls back to the environment.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "items-backend")]
#[command(about = "Items list API with session auth and uptime accounting")]
pub struct Cli {
    /// Interface to bind
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind
    #[arg(long)]
    pub port: Option<u16>,
    /// Snapshot file for persistent storage; in-memory when omitted
    #[arg(long)]
    pub data_file: Option<PathBuf>,
    /// Skip creating the demo account
    #[arg(long)]
    pub no_seed: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_file: Option<PathBuf>,
    pub cors_origin: String,
    pub bcrypt_cost: u32,
    pub seed_demo_user: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("APP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup("APP_PORT").or_else(|| lookup("PORT")) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .context("APP_PORT must be a valid u16")?,
            None => DEFAULT_PORT,
        };

        let data_file = lookup("DATA_FILE")
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string());

        let bcrypt_cost = match lookup("BCRYPT_COST") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .context("BCRYPT_COST must be a valid u32")?,
            None => bcrypt::DEFAULT_COST,
        };
        if !(PasswordHasher::MIN_COST..=PasswordHasher::MAX_COST).contains(&bcrypt_cost) {
            return Err(anyhow!(
                "BCRYPT_COST must be between {} and {}",
                PasswordHasher::MIN_COST,
                PasswordHasher::MAX_COST
            ));
        }

        let seed_demo_user = match lookup("SEED_DEMO_USER") {
            Some(raw) => parse_flag(&raw).context("SEED_DEMO_USER must be true or false")?,
            None => true,
        };

        Ok(Self {
            host,
            port,
            data_file,
            cors_origin,
            bcrypt_cost,
            seed_demo_user,
        })
    }

    pub fn with_cli(mut self, cli: Cli) -> Self {
        if let Some(host) = cli.host {
            self.host = host;
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if cli.data_file.is_some() {
            self.data_file = cli.data_file;
        }
        if cli.no_seed {
            self.seed_demo_user = false;
        }
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cors_origin_header(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&self.cors_origin).with_context(|| {
            format!("CORS_ORIGIN '{}' is not a valid header value", self.cors_origin)
        })
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("unrecognized flag value '{other}'")),
    }
}
