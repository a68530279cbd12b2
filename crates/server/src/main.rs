use std::sync::Arc;

use tracing::info;

use werkbank_core::Config;
use werkbank_dispatch::{
    DispatchConfig, Dispatcher, EchoTool, ResourceCache, ToolCatalog, ToolDescriptor,
};
use werkbank_server::Server;
use werkbank_transport::{HttpTransport, StdioTransport, Transport, WsTransport};

fn load_config() -> Config {
    werkbank_core::config::load_dotenv();
    Config::from_env()
}

fn build_catalog() -> anyhow::Result<ToolCatalog> {
    let mut catalog = ToolCatalog::new();
    catalog.register(ToolDescriptor::new(
        "echo",
        "Returns its arguments unchanged",
        serde_json::json!({"type": "object"}),
        EchoTool,
    ))?;
    Ok(catalog)
}

async fn serve(config: Config, transport: Arc<dyn Transport>) -> anyhow::Result<()> {
    let catalog = Arc::new(build_catalog()?);
    let cache = Arc::new(ResourceCache::new(config.cache.ttl));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&catalog),
        cache,
        DispatchConfig {
            default_timeout: config.dispatch.tool_timeout,
        },
    ));
    let server = Server::new(transport, catalog, dispatcher, config.budget.clone())
        .with_name(config.server.name.clone());

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            server.shutdown().await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries protocol frames in stdio mode; logs go to stderr.
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config();
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("stdio") => {
            serve(config, Arc::new(StdioTransport::new())).await?;
        }
        Some("http") => {
            config.log_summary();
            let transport = HttpTransport::new(&config.http);
            serve(config, Arc::new(transport)).await?;
        }
        Some("ws") => {
            config.log_summary();
            let transport = WsTransport::new(&config.http);
            serve(config, Arc::new(transport)).await?;
        }
        _ => {
            println!("werkbank v{}", env!("CARGO_PKG_VERSION"));
            println!("Usage: werkbank-server <command>");
            println!("  stdio   Serve over stdin/stdout, one JSON frame per line");
            println!("  http    Serve over HTTP (POST /rpc, GET /health)");
            println!("  ws      Serve a standalone WebSocket listener (/ws, /health)");
        }
    }

    Ok(())
}
