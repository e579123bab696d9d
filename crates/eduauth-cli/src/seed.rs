//! # Seed-Admin Subcommand
//!
//! Connects to `DATABASE_URL`, hydrates the registry and creates the
//! bootstrap administrator unless the email is already registered.

use anyhow::{bail, Context, Result};
use clap::Args;
use zeroize::Zeroizing;

use eduauth_api::registry::{Ledger, Registry, SeedOutcome};

/// Arguments for `eduauth seed-admin`.
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Administrator email.
    #[arg(long, env = "ADMIN_EMAIL")]
    pub email: String,

    /// Administrator password.
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
}

/// Seed against an already-built registry.
pub async fn seed(registry: &Registry, email: &str, password: &str) -> Result<SeedOutcome> {
    registry
        .seed_admin(email, password)
        .await
        .context("failed to seed administrator")
}

/// Execute the seed-admin subcommand.
pub fn run_seed(args: &SeedArgs) -> Result<u8> {
    let Some(url) = args.database_url.as_deref() else {
        bail!("DATABASE_URL is required; an in-memory admin would not outlive this process");
    };
    let password = Zeroizing::new(args.password.clone());

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async {
        let pool = eduauth_api::db::init_pool(Some(url))
            .await
            .context("failed to connect to database")?;
        let registry = Registry::new(Ledger::with_pool(pool));
        registry.hydrate().await.context("failed to load registry")?;

        match seed(&registry, &args.email, password.as_str()).await? {
            SeedOutcome::Created(id) => println!("created administrator {id}"),
            SeedOutcome::AlreadyExists(id) => println!("administrator already exists: {id}"),
        }
        Ok(0)
    })
}
