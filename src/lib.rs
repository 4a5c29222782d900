//! Airflow MCP Server: exposes an Airflow HTTP API as a catalogue of MCP
//! tools. See `SPEC_FULL.md` for the component design this crate follows.

pub mod category_mapper;
pub mod cli;
pub mod error;
pub mod hierarchical;
pub mod http_client;
pub mod logging;
pub mod mcp_service;
pub mod openapi_doc;
pub mod resources;
pub mod schema_compiler;
pub mod toolset;

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::ServiceExt;
use tokio::signal;
use tracing::info;

use cli::{Cli, Transport};
use hierarchical::{CategoryIndex, HierarchicalManager};
use http_client::HttpClientHandle;
use mcp_service::{AirflowMcpService, Dispatch};
use resources::KnowledgeResources;
use toolset::Toolset;

const ALLOWED_METHODS_SAFE: &[&str] = &["GET"];
const ALLOWED_METHODS_UNSAFE: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];

/// Everything shared across every session, built once at startup. A new
/// [`AirflowMcpService`] (and, in hierarchical mode, a fresh per-session
/// navigation state) is built from this for each accepted connection.
struct ServerContext {
    toolset: Arc<Toolset>,
    category_index: Option<Arc<CategoryIndex>>,
    resources: Arc<KnowledgeResources>,
    http: HttpClientHandle,
}

impl ServerContext {
    fn build_handler(&self) -> AirflowMcpService {
        let dispatch = match &self.category_index {
            Some(index) => Dispatch::Hierarchical(HierarchicalManager::new(
                self.toolset.clone(),
                index.clone(),
            )),
            None => Dispatch::Static(self.toolset.clone()),
        };
        AirflowMcpService::new(dispatch, self.http.clone(), self.resources.clone())
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let resolved = cli.resolve().context("invalid configuration")?;
    logging::init(resolved.verbosity, resolved.log_file.as_deref());

    info!(base_url = %resolved.base_url, allow_mutations = resolved.allow_mutations, "starting airflow-mcp-server");

    let http = HttpClientHandle::new(resolved.base_url.clone(), resolved.auth_token.clone())
        .context("failed to build HTTP client")?;

    let document = openapi_doc::fetch_document(http.client(), &resolved.base_url, &resolved.auth_token)
        .await
        .context("failed to load upstream OpenAPI document")?;

    let toolset = Arc::new(Toolset::from_document(&document, resolved.allow_mutations));
    info!(tool_count = toolset.list_tools().len(), "compiled toolset");

    let category_index = if resolved.hierarchical {
        let allowed = if resolved.allow_mutations {
            ALLOWED_METHODS_UNSAFE
        } else {
            ALLOWED_METHODS_SAFE
        };
        Some(Arc::new(CategoryIndex::build(&document, allowed)))
    } else {
        None
    };

    let context = Arc::new(ServerContext {
        toolset,
        category_index,
        resources: Arc::new(KnowledgeResources::new(resolved.resources_dir.clone())),
        http: http.clone(),
    });

    let result = match resolved.transport {
        Transport::Stdio => run_stdio(&context).await,
        Transport::Http => run_http(&context, &resolved.host, resolved.port).await,
        Transport::Sse => run_sse(&context, &resolved.host, resolved.port).await,
    };

    http.shutdown();
    result
}

async fn run_stdio(context: &ServerContext) -> Result<()> {
    let service = context
        .build_handler()
        .serve(rmcp::transport::stdio())
        .await
        .context("failed to start stdio transport")?;

    wait_for_shutdown().await;
    service.waiting().await.context("server exited with an error")?;
    Ok(())
}

async fn run_http(context: &Arc<ServerContext>, host: &str, port: u16) -> Result<()> {
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    };

    let ctx = context.clone();
    let service = StreamableHttpService::<AirflowMcpService, LocalSessionManager>::new(
        move || Ok(ctx.build_handler()),
        Default::default(),
        StreamableHttpServerConfig::default(),
    );

    let addr: std::net::SocketAddr = format!("{host}:{port}")
        .parse()
        .context("invalid --host/--port combination")?;
    info!(%addr, "listening for streamable HTTP connections");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind HTTP listener")?;
    let router = axum::Router::new().nest_service("/mcp", service);

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("HTTP server exited with an error")
}

async fn run_sse(context: &Arc<ServerContext>, host: &str, port: u16) -> Result<()> {
    use rmcp::transport::sse_server::SseServer;

    let addr: std::net::SocketAddr = format!("{host}:{port}")
        .parse()
        .context("invalid --host/--port combination")?;
    info!(%addr, "listening for SSE connections");

    let ctx = context.clone();
    let server = SseServer::serve(addr)
        .await
        .context("failed to bind SSE listener")?;
    let cancellation = server.with_service(move || ctx.build_handler());

    wait_for_shutdown().await;
    cancellation.cancel();
    Ok(())
}

/// Waits for Ctrl+C or, on unix, SIGTERM. In-flight calls are left to finish
/// naturally -- futures already in progress are simply not interrupted by
/// this resolving; the transport's own shutdown drains them.
async fn wait_for_shutdown() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C, shutting down"),
            _ = terminate.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received Ctrl+C, shutting down");
    }
}
