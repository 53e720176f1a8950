use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    if let Err(e) = clawdhub::cli::run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
