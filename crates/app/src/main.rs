use clap::Parser;
use engine::{Consumer, Store};
use extractor::ChatExtractor;
use migration::{Migrator, MigratorTrait};
use tokio::sync::watch;

mod settings;

#[derive(Debug, Parser)]
#[command(name = "expense_worker", version)]
struct Args {
    /// Optional config file path (TOML), defaults to `config/settings`.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let settings = settings::Settings::new(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "expense_worker={level},engine={level},extractor={level}",
            level = settings.app.level
        ))
        .init();

    let db = sea_orm::Database::connect(settings.database_url.as_str()).await?;
    Migrator::up(&db, None).await?;
    tracing::info!("Connected to the database, migrations applied");

    let store = Store::builder().database(db).build();
    let extractor = ChatExtractor::builder()
        .endpoint(settings.extractor.endpoint)
        .api_key(settings.extractor.api_key)
        .model(settings.extractor.model)
        .temperature(settings.extractor.temperature)
        .timeout(settings.extractor.timeout)
        .build()?;
    tracing::info!("Extracting expenses with model {}", extractor.model());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested, finishing current message");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => {
                tracing::error!("failed to listen for shutdown signal: {err}");
                // Keep the sender alive: dropping it stops the consumer.
                shutdown_tx.closed().await;
            }
        }
    });

    Consumer::new(store, extractor, settings.consumer)
        .run(shutdown_rx)
        .await;

    Ok(())
}
