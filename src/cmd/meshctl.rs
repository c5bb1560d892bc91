use clap::Parser;

#[tokio::main]
async fn main() {
    let args = meshtun::cli::Args::parse();
    if let Err(e) = meshtun::cli::run(args).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
