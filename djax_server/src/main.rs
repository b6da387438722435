use clap::Parser;
use djax_core::{AxilentConfig, SyncConfig, SyncOutcome};
use djax_server::cli::{Cli, Commands, redact};
use std::net::SocketAddr;

const LOCKED_HINT: &str = "Local content is sync-locked, suggesting a concurrent sync is underway.\n\
If you think this is an error, clear the lock by running `djax clear-locks`.";

#[tokio::main]
#[tracing::instrument(level = "info")]
async fn main() -> anyhow::Result<()> {
    djax_core::o11y::init_global_from_env()?;
    let cli = Cli::parse();
    let axilent = AxilentConfig::from_env()?;
    let sync_config = SyncConfig::from_env()?;

    let cmd = cli.command.unwrap_or(Commands::Serve {
        host: "0.0.0.0".to_string(),
        port: 8000,
    });

    match cmd {
        Commands::Serve { host, port } => {
            let addr: SocketAddr = format!("{host}:{port}").parse()?;
            let state =
                djax_server::backends::build_state(&cli.database, &axilent, sync_config).await?;
            djax_server::server::serve(addr, state).await?;
        }
        Commands::Sync {
            content_type,
            token,
        } => {
            let state =
                djax_server::backends::build_state(&cli.database, &axilent, sync_config).await?;
            println!("Syncing local content with Axilent");
            match state.sync.sync_content(token, content_type.as_deref()).await? {
                SyncOutcome::Completed(report) => {
                    println!("Content has been synced with Axilent");
                    println!(
                        "created: {}  updated: {}  unchanged: {}  failed: {}",
                        report.created, report.updated, report.unchanged, report.failed
                    );
                    if !report.skipped_types.is_empty() {
                        println!("skipped unknown types: {}", report.skipped_types.join(", "));
                    }
                    if report.field_errors > 0 {
                        println!("field errors: {} (see logs)", report.field_errors);
                    }
                }
                SyncOutcome::Locked => println!("{LOCKED_HINT}"),
            }
        }
        Commands::ClearLocks => {
            let state =
                djax_server::backends::build_state(&cli.database, &axilent, sync_config).await?;
            let cleared = state.sync.clear_locks().await?;
            println!("cleared {cleared} sync lock(s)");
        }
        Commands::CreateToken {
            name,
            origin_domain,
        } => {
            let state =
                djax_server::backends::build_state(&cli.database, &axilent, sync_config).await?;
            let issued =
                djax_server::auth::issue_token(state.db.as_ref(), &name, origin_domain.as_deref())
                    .await?;
            println!("token: {}", issued.token);
            println!("id: {}", issued.record.id);
            if let Some(domain) = issued.record.origin_domain {
                println!("origin_domain: {domain}");
            }
        }
        Commands::Config => {
            let cfg = serde_json::json!({
                "DJAX_DATABASE": cli.database.display().to_string(),
                "AXILENT_ENDPOINT": axilent.endpoint,
                "AXILENT_API_VERSION": axilent.api_version,
                "AXILENT_API_KEY": axilent.api_key.as_deref().map(redact),
                "AXILENT_TIMEOUT_SECS": axilent.timeout.as_secs(),
                "DJAX_SYNC_LOCK_TTL_SECS": sync_config.lock_ttl.map(|d| d.as_secs()),
            });
            println!("{}", serde_json::to_string_pretty(&cfg)?);
        }
    }

    Ok(())
}
