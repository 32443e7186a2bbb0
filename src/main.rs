use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use fitness_world_api::config::Config;
use fitness_world_api::http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // This returns an error if the `.env` file doesn't exist, but that's not what we want
    // since we're not going to use a `.env` file if we deploy this application.
    dotenvy::dotenv().ok();

    // Initialize the logger. Use `RUST_LOG=fitness_world_api=debug,tower_http=debug` for details.
    env_logger::init();

    // Parse our configuration from the environment.
    // This will exit with a help message if something is wrong.
    let config = Config::parse();

    // A single pool is shared by every controller in the store.
    let db = PgPoolOptions::new()
        .max_connections(50)
        .connect(&config.database_url)
        .await
        .context("could not connect to database_url")?;

    // This embeds database migrations in the application binary so we can ensure the database
    // is migrated correctly on startup
    sqlx::migrate!().run(&db).await?;

    http::serve(config, db).await?;

    Ok(())
}
