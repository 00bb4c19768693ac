use std::sync::Arc;

use argon2::Argon2;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use setup::{migrate, status};
use stack::store::RedisStore;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed the placeholder superuser if no superuser exists yet
    Migrate,

    /// Print whether initial admin registration is still open
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let store = Arc::new(RedisStore::connect(&args.redis_url).await?);

    match args.command {
        Command::Migrate => migrate(store, &Argon2::default()).await?,
        Command::Status => status(store).await?,
    }

    Ok(())
}
