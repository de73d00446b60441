use clap::Parser;
use tracing_subscriber::EnvFilter;

use scara_servo::runtime::{self, Cli};

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=debug or trace for per-phase events)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = runtime::run(cli).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
