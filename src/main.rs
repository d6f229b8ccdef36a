use clap::Parser;
use dotenv::dotenv;
use gcs_share::cli::{Cli, Commands};
use gcs_share::config::Config;
use gcs_share::mcp::{self, ShareServer};
use gcs_share::models::{BucketListing, PublishRequest};
use gcs_share::operations::ShareManager;
use log::info;
use rmcp::{ServiceExt, transport::stdio};
use serde_json::Value;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // stdout is the protocol channel, so logs stay on stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = Cli::parse();
    let config = Config::from_env()?
        .with_project(args.project)
        .with_endpoint(args.endpoint)?;
    let manager = ShareManager::from_config(&config);

    let (document, is_error) = match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!(
                "Starting {} (endpoint {})",
                mcp::SERVER_NAME,
                config.endpoint.as_deref().unwrap_or("default")
            );
            let service = ShareServer::new(manager).serve(stdio()).await?;
            service.waiting().await?;
            return Ok(());
        }
        Commands::Share {
            file_path,
            bucket,
            destination,
        } => {
            let request = PublishRequest {
                file_path,
                bucket_name: bucket,
                destination_name: destination,
            };
            mcp::render(manager.share_file_public(&request).await, true)
        }
        Commands::Auth => mcp::render(manager.check_auth().await, false),
        Commands::Buckets => mcp::render(
            manager.list_buckets().await.map(BucketListing::from),
            true,
        ),
    };

    print_document(&document)?;
    if is_error {
        std::process::exit(1);
    }
    Ok(())
}

fn print_document(document: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(document)?);
    Ok(())
}
