use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use hrs_config::Config;
use hrs_consumer::Consumer;
use hrs_relay::OutboxRelay;
use hrs_stream::RedisBroker;

#[derive(Parser)]
#[command(name = "hrs")]
#[command(about = "hrsync replication pipeline CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Outbox relay commands
    Relay {
        #[command(subcommand)]
        cmd: RelayCmd,
    },

    /// Run the stream consumer until killed
    Consume,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DbTarget {
    /// Origin database (outbox)
    Origin,
    /// Replica database (aggregates + bookkeeping)
    Replica,
}

#[derive(Subcommand)]
enum DbCmd {
    /// Connectivity + schema-presence check
    Status {
        #[arg(value_enum)]
        target: DbTarget,
    },

    /// Apply embedded SQL migrations
    Migrate {
        #[arg(value_enum)]
        target: DbTarget,
    },
}

#[derive(Subcommand)]
enum RelayCmd {
    /// Drain the outbox into the broker stream once. Meant to be invoked
    /// on a schedule by an external scheduler, which owns retries.
    Run {
        /// Rows per page transaction
        #[arg(long)]
        chunk: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    hrs_config::bootstrap_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status { target } => {
                let (pool, marker) = match target {
                    DbTarget::Origin => (hrs_db::connect_origin_from_env().await?, "outbox"),
                    DbTarget::Replica => {
                        (hrs_db::connect_replica_from_env().await?, "processed_events")
                    }
                };
                let s = hrs_db::status(&pool, marker).await?;
                println!("db_ok={} has_schema={}", s.ok, s.has_schema);
            }

            DbCmd::Migrate { target } => {
                match target {
                    DbTarget::Origin => {
                        let pool = hrs_db::connect_origin_from_env().await?;
                        hrs_db::migrate_origin(&pool).await?;
                    }
                    DbTarget::Replica => {
                        let pool = hrs_db::connect_replica_from_env().await?;
                        hrs_db::migrate_replica(&pool).await?;
                    }
                }
                println!("migrations_applied=true");
            }
        },

        Commands::Relay { cmd } => match cmd {
            RelayCmd::Run { chunk } => {
                let cfg = Config::from_env();
                let chunk = chunk.filter(|n| *n > 0).unwrap_or(cfg.chunk_size);

                let origin = hrs_db::connect_origin_from_env().await?;
                let mut broker = RedisBroker::connect(&cfg.redis_url).await?;

                let relay = OutboxRelay::new(origin, cfg.stream_name.clone());
                let summary = relay.publish(&mut broker, chunk).await?;

                println!(
                    "processed={} elapsed_secs={:.2}",
                    summary.processed,
                    summary.elapsed.as_secs_f64()
                );
            }
        },

        Commands::Consume => {
            let cfg = Config::from_env();

            let replica = hrs_db::connect_replica_from_env().await?;
            let mut broker = RedisBroker::connect(&cfg.redis_url).await?;

            let consumer = Consumer::new(
                replica,
                cfg.stream_name.clone(),
                cfg.consumer_group.clone(),
                cfg.consumer_name.clone(),
                cfg.block_ms,
            );

            let ctrl_c = tokio::signal::ctrl_c();

            tokio::select! {
                result = consumer.run(&mut broker) => {
                    // Only a fatal bootstrap failure gets here.
                    result?;
                }
                _ = ctrl_c => {
                    info!("received shutdown signal, exiting");
                }
            }
        }
    }

    Ok(())
}
