mod cli;
mod config;
mod upload;

use clap::Parser;
use filebay_upload_queue::StateFile;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,filebay=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Upload(args) => upload::run(args, config).await,
        Command::Status => {
            let state = StateFile::new(config.state_file_path()?).load()?;
            if state.items.is_empty() {
                println!("No interrupted uploads.");
            }
            for item in state.items {
                let reason = item.error.map(|e| e.to_string()).unwrap_or_default();
                println!(
                    "{}\t/{}\t{}% {}",
                    item.file_name, item.target_path, item.progress, reason
                );
            }
            Ok(())
        }
        Command::Clear => {
            StateFile::new(config.state_file_path()?).clear()?;
            println!("Cleared interrupted uploads.");
            Ok(())
        }
    }
}
