use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = poolroute::cli::Cli::parse();
    if let Err(e) = poolroute::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
