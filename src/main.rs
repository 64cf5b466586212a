use clap::Parser;
use tracing_subscriber::EnvFilter;

use unisearch::sources::ConnectivityMonitor;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    let cli = unisearch::cli::Cli::parse();
    let result = unisearch::cli::run(cli).await;
    ConnectivityMonitor::global().stop();

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            std::process::ExitCode::SUCCESS
        }
        Err(err) => {
            if let Some(search_err) = err.downcast_ref::<unisearch::error::UniSearchError>() {
                eprintln!("Error: {search_err}");
            } else {
                eprintln!("Error: {err}");
            }
            std::process::ExitCode::from(1)
        }
    }
}
