use std::error::Error;

use clap::{Args, Parser, Subcommand};
use engine::{NewQueueItem, QueueStatus, Store, Timeframe};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};

#[derive(Parser, Debug)]
#[command(name = "expense_admin")]
#[command(about = "Admin utilities for the expense worker (users, queue, reports)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./expenses.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    User(User),
    Queue(Queue),
    /// Totals per category since the start of the timeframe.
    Report(ReportArgs),
    /// Remove every queue item and expense.
    Truncate,
    Migrate(Migrate),
}

#[derive(Args, Debug)]
struct User {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Create(UserCreateArgs),
}

#[derive(Args, Debug)]
struct UserCreateArgs {
    #[arg(long)]
    telegram_id: i64,
}

#[derive(Args, Debug)]
struct Queue {
    #[command(subcommand)]
    command: QueueCommand,
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    /// Enqueue a chat message as the bot would.
    Push(QueuePushArgs),
    List(QueueListArgs),
}

#[derive(Args, Debug)]
struct QueuePushArgs {
    #[arg(long)]
    user_id: i32,
    #[arg(long)]
    chat_id: i64,
    #[arg(long)]
    message_id: i64,
    #[arg(long)]
    text: String,
}

#[derive(Args, Debug)]
struct QueueListArgs {
    /// pending, parsed or failed
    #[arg(long, value_parser = parse_status)]
    status: Option<QueueStatus>,
}

#[derive(Args, Debug)]
struct ReportArgs {
    #[arg(long)]
    user_id: i32,
    /// daily, weekly, monthly or yearly
    #[arg(long, value_parser = parse_timeframe, default_value = "monthly")]
    timeframe: Timeframe,
}

#[derive(Args, Debug)]
struct Migrate {
    #[command(subcommand)]
    command: MigrateCommand,
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Roll back the last migration.
    Down,
    /// Drop every table and reapply all migrations.
    Fresh,
    Status,
}

fn parse_status(raw: &str) -> Result<QueueStatus, String> {
    QueueStatus::try_from(raw).map_err(|err| err.to_string())
}

fn parse_timeframe(raw: &str) -> Result<Timeframe, String> {
    match raw.to_ascii_lowercase().as_str() {
        "daily" => Ok(Timeframe::Daily),
        "weekly" => Ok(Timeframe::Weekly),
        "monthly" => Ok(Timeframe::Monthly),
        "yearly" => Ok(Timeframe::Yearly),
        other => Err(format!("unsupported timeframe: {other}")),
    }
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

async fn migrate(
    database_url: &str,
    command: MigrateCommand,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;

    match command {
        MigrateCommand::Up => migration::Migrator::up(&db, None).await?,
        MigrateCommand::Down => migration::Migrator::down(&db, Some(1)).await?,
        MigrateCommand::Fresh => migration::Migrator::fresh(&db).await?,
        MigrateCommand::Status => {
            for applied in migration::Migrator::get_applied_migrations(&db).await? {
                println!("applied  {}", applied.name());
            }
            for pending in migration::Migrator::get_pending_migrations(&db).await? {
                println!("pending  {}", pending.name());
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Migrate(Migrate { command }) => migrate(&cli.database_url, command).await,
        command => {
            let db = connect_db(&cli.database_url).await?;
            run(Store::builder().database(db).build(), command).await
        }
    }
}

async fn run(store: Store, command: Command) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        Command::User(User {
            command: UserCommand::Create(args),
        }) => {
            let user_id = store.create_user(args.telegram_id).await?;
            println!("created user: {user_id} (telegram id {})", args.telegram_id);
        }
        Command::Queue(Queue {
            command: QueueCommand::Push(args),
        }) => {
            let item_id = store
                .enqueue(NewQueueItem {
                    user_id: args.user_id,
                    chat_id: args.chat_id,
                    telegram_message_id: args.message_id,
                    message: args.text,
                })
                .await?;
            println!("queued message: {item_id}");
        }
        Command::Queue(Queue {
            command: QueueCommand::List(args),
        }) => {
            for item in store.list_queue(args.status).await? {
                println!(
                    "{}\t{}\t{}\tuser={}\tattempts={}\t{}",
                    item.id,
                    item.created_at.format("%Y-%m-%d %H:%M:%S"),
                    item.status.as_str(),
                    item.user_id,
                    item.attempts,
                    item.payload
                );
            }
        }
        Command::Report(args) => {
            let since = args.timeframe.start(chrono::Utc::now());
            let totals = store.category_totals(args.user_id, since).await?;
            if totals.is_empty() {
                println!("no expenses since {}", since.format("%Y-%m-%d %H:%M"));
            }
            for total in totals {
                println!("{:<20} {:>10}", total.category.as_str(), total.total.to_string());
            }
        }
        Command::Truncate => {
            let (expenses, queue) = store.truncate().await?;
            println!("removed {expenses} expenses and {queue} queue items");
        }
        Command::Migrate(_) => {}
    }

    Ok(())
}
