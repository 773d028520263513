use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use rowstream_db::users::{average_user_age, older_than};
use rowstream_db::{
    connection_counters, execute_query, matching_rows, stream, stream_file_in_batches, ConnectionSettings, StoreError,
    Value,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rowstream")]
#[command(about = "Scoped SQLite queries and lazy row streaming")]
struct Args {
    /// SQLite database file (overrides ROWSTREAM_DB_FILE)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a query inside one scoped connection and print every row
    Query {
        sql: String,
        /// Positional parameter for `?` placeholders (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
    /// Stream rows one at a time
    Stream {
        sql: String,
        #[arg(short, long = "param")]
        params: Vec<String>,
        /// Stop after this many rows
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Re-group a JSON array of records into fixed-size batches
    Batches {
        #[arg(long, default_value = "users.json")]
        file: PathBuf,
        #[arg(long, default_value_t = 50)]
        size: usize,
        /// Only print records whose age is strictly above this value
        #[arg(long)]
        min_age: Option<f64>,
    },
    /// Print the average age over user_data
    AverageAge,
}

/// Bind command-line text as integer, then float, then text.
fn parse_param(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    Value::from(raw.to_string())
}

fn settings_for(db: Option<PathBuf>) -> Result<ConnectionSettings, StoreError> {
    match db {
        Some(path) => {
            let mut settings = ConnectionSettings::from_env()?;
            settings.kind = rowstream_db::DbKind::SqliteFile;
            settings.file = path;
            settings.validate()?;
            Ok(settings)
        }
        None => ConnectionSettings::from_env(),
    }
}

async fn run(args: Args) -> Result<(), StoreError> {
    match args.command {
        Command::Query { sql, params } => {
            let settings = settings_for(args.db)?;
            let rows = execute_query(&settings, &sql, params.iter().map(|p| parse_param(p))).await?;
            for row in rows {
                println!("{row}");
            }
        }
        Command::Stream { sql, params, limit } => {
            let settings = settings_for(args.db)?;
            let mut rows = stream(&settings, sql, params.iter().map(|p| parse_param(p))).await?;
            let mut printed = 0;
            while limit.map_or(true, |max| printed < max) {
                match rows.next().await {
                    Some(row) => {
                        println!("{}", row?);
                        printed += 1;
                    }
                    None => break,
                }
            }
            rows.close().await;
        }
        Command::Batches {
            file,
            size,
            min_age,
        } => {
            let batches = stream_file_in_batches(&file, size)?;
            match min_age {
                Some(threshold) => {
                    for row in matching_rows(batches, older_than(threshold)) {
                        println!("{row}");
                    }
                }
                None => {
                    for batch in batches {
                        for row in batch {
                            println!("{row}");
                        }
                    }
                }
            }
        }
        Command::AverageAge => {
            let settings = settings_for(args.db)?;
            match average_user_age(&settings).await? {
                Some(average) => println!("Average age of users: {average:.2}"),
                None => println!("No users found."),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,sea_orm=warn"));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_env_filter(env_filter)
        .init();

    let args = Args::parse();

    let outcome = run(args).await;
    connection_counters::log_snapshot("exit");

    if let Err(e) = outcome {
        eprintln!("rowstream failed: {e}");
        process::exit(1);
    }
}
