use investigator_dispatch::{
    build_app,
    config::Config,
    domain::{resources::ResourceRegistry, tools::ToolRegistry},
    logging,
    protocol::dispatcher::Dispatcher,
    upstream::Upstreams,
    AppState,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err.into());
        }
    }
    logging::init_logging("info");

    let config = Config::from_env()?;
    if config.upstream.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; tools/gemini will report upstream_unavailable");
    }

    let upstreams = Upstreams::from_config(&config.upstream);
    let dispatcher = Dispatcher::new(
        ToolRegistry::new(upstreams),
        ResourceRegistry::new(),
        config.dispatch,
    );

    let policy = dispatcher.policy();
    let bind_socket = config.bind_socket()?;
    let state = AppState::new(config.api_token.clone(), dispatcher);
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        failure_policy = ?policy.failure,
        unknown_method = ?policy.unknown_method,
        max_concurrency = policy.max_concurrency,
        tool_timeout = ?policy.timeout,
        auth = config.api_token.is_some(),
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
