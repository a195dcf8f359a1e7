use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use directories::ProjectDirs;
use relay_mcp::{McpDispatcher, McpHandler, McpServerConfig};
use tracing::info;

use relay_gateway::agent::AgentClient;
use relay_gateway::http::{router, HttpState, SSE_HEARTBEAT};
use relay_gateway::memory::MemoryStore;
use relay_gateway::tools::ToolRegistry;

#[derive(Debug, Parser)]
#[command(
    name = "relay-gateway",
    version,
    about = "MCP streamable-HTTP gateway for a command-line agent"
)]
struct Args {
    /// Display name reported by the descriptor and health endpoints.
    #[arg(long, env = "RELAY_DISPLAY_NAME", default_value = "agent-relay")]
    display_name: String,

    /// Session label passed to the agent's `sessions send`.
    #[arg(long, env = "RELAY_SESSION_LABEL", default_value = "relay")]
    session_label: String,

    /// Shared secret required as `Authorization: Bearer <token>`.
    #[arg(long, env = "RELAY_AUTH_TOKEN")]
    auth_token: Option<String>,

    /// Listening port.
    #[arg(long, env = "RELAY_PORT", default_value_t = 3721)]
    port: u16,

    /// Bind address.
    #[arg(long, env = "RELAY_BIND_ADDR", default_value = "0.0.0.0")]
    bind_addr: IpAddr,

    /// Workspace directory holding the memory document.
    #[arg(long, env = "RELAY_WORKSPACE_DIR")]
    workspace_dir: Option<PathBuf>,

    /// Agent program to invoke for `ask` and `sessions_status`.
    #[arg(long, env = "RELAY_AGENT_BIN", default_value = "agent")]
    agent_bin: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hyper=warn".into()),
        )
        .json()
        .init();

    let args = Args::parse();

    // Refuse to open a socket without a shared secret.
    let Some(auth_token) = args.auth_token.filter(|t| !t.trim().is_empty()) else {
        anyhow::bail!("RELAY_AUTH_TOKEN is required");
    };

    let workspace_dir = resolve_workspace_dir(args.workspace_dir.as_deref())?;

    let agent = AgentClient::new(args.agent_bin, args.session_label);
    let memory = MemoryStore::new(&workspace_dir);
    info!(memory = %memory.path().display(), "using workspace memory document");

    let handler: Arc<dyn McpHandler> = Arc::new(ToolRegistry::new(agent, memory));
    let cfg = McpServerConfig::default_for_binary(&args.display_name, env!("CARGO_PKG_VERSION"));

    let state = HttpState {
        cfg: cfg.clone(),
        dispatcher: Arc::new(McpDispatcher::new(cfg, handler)),
        display_name: args.display_name,
        auth_token,
        sse_heartbeat: SSE_HEARTBEAT,
    };

    let addr = SocketAddr::new(args.bind_addr, args.port);
    info!(addr = %addr, "starting relay gateway");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn resolve_workspace_dir(cli: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(p) = cli {
        return Ok(p.to_path_buf());
    }

    let proj =
        ProjectDirs::from("com", "agent-relay", "agent-relay").context("resolve platform data dir")?;
    Ok(proj.data_local_dir().to_path_buf())
}
