//! Runs one investigation against a dispatcher server and prints every stage.

use std::sync::Arc;

use clap::Parser;
use investigator_dispatch::{
    client::{HttpTransport, Orchestrator, DEFAULT_SERVER_URL},
    logging,
    upstream::{gemini::GeminiClient, http_client},
};

#[derive(Parser)]
#[command(name = "investigate")]
#[command(about = "Turn a question into a batch of tool calls and summarise the results")]
struct Cli {
    /// Natural-language question, e.g. "Is Acme Corp a safe supplier?"
    query: String,
    /// Dispatcher endpoint receiving the request envelope
    #[arg(long, env = "SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server_url: String,
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.0-flash")]
    gemini_model: String,
    /// Bearer token, when the server requires one
    #[arg(long, env = "DISPATCH_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Must run before clap reads `env` defaults.
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err.into());
        }
    }
    logging::init_logging("warn");

    let cli = Cli::parse();
    if cli.gemini_api_key.is_none() {
        return Err("GEMINI_API_KEY is not set; pass --gemini-api-key or add it to .env".into());
    }

    let http = http_client();
    let model = Arc::new(GeminiClient::new(
        http.clone(),
        cli.gemini_api_key,
        cli.gemini_model,
    ));
    let transport = Arc::new(HttpTransport::new(http, cli.server_url, cli.api_token));
    let orchestrator = Orchestrator::new(model, transport);

    let investigation = orchestrator.run(&cli.query).await?;
    println!(
        "Generated request:\n{}\n",
        serde_json::to_string_pretty(&investigation.request)?
    );
    println!(
        "Server response:\n{}\n",
        serde_json::to_string_pretty(&investigation.response)?
    );
    println!("Final answer:\n{}", investigation.answer);
    Ok(())
}
