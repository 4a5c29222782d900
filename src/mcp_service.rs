//! The `rmcp::ServerHandler` implementation: wires the Toolset (or
//! Hierarchical Manager) and the knowledge resources loader behind one MCP
//! session. See §4.6.

use std::sync::Arc;

use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, ErrorData as McpError, Implementation,
    ListResourcesResult, ListToolsResult, PaginatedRequestParams, ProtocolVersion,
    ReadResourceRequestParams, ReadResourceResult, Resource, ResourceContents, ResourcesCapability,
    ServerCapabilities, ServerInfo, Tool, ToolsCapability,
};
use rmcp::service::{NotificationContext, Peer, RequestContext, RoleServer};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::AirflowMcpError;
use crate::hierarchical::HierarchicalManager;
use crate::http_client::HttpClientHandle;
use crate::resources::KnowledgeResources;
use crate::toolset::{CallResult, ToolDescriptor, Toolset};

/// Static mode delegates straight to the Toolset; hierarchical mode lets a
/// `HierarchicalManager` own `list_tools`/`call_tool` and inject navigation.
pub enum Dispatch {
    Static(Arc<Toolset>),
    Hierarchical(HierarchicalManager),
}

pub struct AirflowMcpService {
    dispatch: Dispatch,
    http: HttpClientHandle,
    resources: Arc<KnowledgeResources>,
    /// Populated from the first `on_initialized` notification; one instance
    /// per accepted connection, so this is effectively per-session state.
    peer: RwLock<Option<Peer<RoleServer>>>,
}

impl AirflowMcpService {
    pub fn new(dispatch: Dispatch, http: HttpClientHandle, resources: Arc<KnowledgeResources>) -> Self {
        Self {
            dispatch,
            http,
            resources,
            peer: RwLock::new(None),
        }
    }

    async fn tool_descriptors(&self) -> Vec<ToolDescriptor> {
        match &self.dispatch {
            Dispatch::Static(toolset) => toolset.list_tools(),
            Dispatch::Hierarchical(manager) => manager.list_tools().await,
        }
    }

    async fn dispatch_call(
        &self,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<CallResult, AirflowMcpError> {
        match &self.dispatch {
            Dispatch::Static(toolset) => toolset.call_tool(name, args, &self.http).await,
            Dispatch::Hierarchical(manager) => {
                let peer_guard = self.peer.read().await;
                let peer = peer_guard.as_ref().ok_or_else(|| {
                    AirflowMcpError::UpstreamError(
                        "peer handle not yet captured for this session".to_string(),
                    )
                })?;
                manager.call_tool(name, args, &self.http, peer).await
            }
        }
    }
}

#[async_trait::async_trait]
#[allow(clippy::manual_async_fn)]
impl ServerHandler for AirflowMcpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(true),
                }),
                resources: Some(ResourcesCapability {
                    subscribe: Some(false),
                    list_changed: Some(false),
                }),
                ..Default::default()
            },
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                title: Some("Airflow MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Exposes an Airflow REST API as MCP tools. Call browse_categories to see \
                 what's available, or list_tools directly in static mode."
                    .to_string(),
            ),
        }
    }

    fn on_initialized(
        &self,
        context: NotificationContext<RoleServer>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            info!("client connected");
            let mut peer_guard = self.peer.write().await;
            if peer_guard.is_none() {
                *peer_guard = Some(context.peer.clone());
            }
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            let tools = self.tool_descriptors().await.into_iter().map(to_tool).collect();
            Ok(ListToolsResult {
                meta: None,
                tools,
                next_cursor: None,
            })
        }
    }

    fn call_tool(
        &self,
        params: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let name = params.name.to_string();
            let args = params.arguments.unwrap_or_default();
            match self.dispatch_call(&name, args).await {
                Ok(result) => Ok(to_call_tool_result(result)),
                Err(err) => Ok(error_call_tool_result(&err)),
            }
        }
    }

    fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        async move {
            let entries = self.resources.list().await;
            let resources = entries
                .into_iter()
                .map(|entry| Resource::new(
                    rmcp::model::RawResource {
                        uri: entry.uri,
                        name: entry.title,
                        description: None,
                        mime_type: Some("text/markdown".to_string()),
                        size: None,
                        icons: None,
                        title: None,
                    },
                    None,
                ))
                .collect();

            Ok(ListResourcesResult {
                meta: None,
                resources,
                next_cursor: None,
            })
        }
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            let text = self.resources.read(&request.uri).await.map_err(|e| {
                McpError::invalid_params(e.to_string(), Some(serde_json::json!({ "uri": request.uri })))
            })?;

            Ok(ReadResourceResult {
                contents: vec![ResourceContents::TextResourceContents {
                    uri: request.uri,
                    mime_type: Some("text/markdown".to_string()),
                    text,
                }],
            })
        }
    }
}

fn to_tool(descriptor: ToolDescriptor) -> Tool {
    Tool {
        name: descriptor.name.into(),
        title: None,
        icons: None,
        description: Some(descriptor.description.into()),
        input_schema: Arc::new(descriptor.input_schema),
        output_schema: None,
        annotations: None,
        execution: None,
        meta: None,
    }
}

fn to_call_tool_result(result: CallResult) -> CallToolResult {
    let mut content = Vec::new();
    if let Some(text) = result.text {
        content.push(Content::text(text));
    }
    CallToolResult {
        content,
        structured_content: result.structured,
        is_error: Some(result.is_error),
        meta: None,
    }
}

fn error_call_tool_result(err: &AirflowMcpError) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(err.to_string())],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}
