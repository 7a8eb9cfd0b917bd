//! CLI subcommands.

pub mod migrate;
pub mod seed;

use secrecy::SecretString;

/// Storefront database URL, with the same fallback the server uses.
fn database_url() -> Result<SecretString, MissingDatabaseUrl> {
    dotenvy::dotenv().ok();

    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| MissingDatabaseUrl)
}

/// Neither database URL variable is set.
#[derive(Debug, thiserror::Error)]
#[error("Missing environment variable: STOREFRONT_DATABASE_URL (or DATABASE_URL)")]
pub struct MissingDatabaseUrl;
