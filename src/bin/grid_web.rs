use binance_grid::GridRunner;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Environment (.env may carry BINANCE_API_KEY / BINANCE_API_SECRET)
    let dotenv = dotenvy::dotenv();

    // 2. Create Runner
    let args: Vec<String> = std::env::args().collect();
    let default_config = "config.toml".to_string();
    let config_path = args.get(1).unwrap_or(&default_config);
    if !std::path::Path::new(config_path).exists() {
        eprintln!(
            "Config file '{}' not found, using defaults and APP_* environment",
            config_path
        );
    }

    let runner = match GridRunner::new(config_path) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if dotenv.is_err() {
        eprintln!("No .env file found, using system environment variables");
    }

    // 3. Run
    if let Err(e) = runner.run().await {
        eprintln!("Grid service error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
