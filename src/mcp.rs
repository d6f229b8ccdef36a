//! Model Context Protocol server exposing the share tools.
//!
//! Served over stdio by `main`. Log output goes to stderr; stdout carries
//! nothing but protocol messages.

use log::{error, info, warn};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{BucketListing, ErrorDescriptor, PublishRequest};
use crate::operations::ShareManager;

pub const SERVER_NAME: &str = "gcs-public-share";
pub const INSTRUCTIONS: &str = "Share files publicly via Google Cloud Storage. \
If share_file_public reports needs_input=bucket_name, ask the user for a bucket name and call it again. \
If a tool reports needs_auth, show the user the remediation commands.";

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ShareFileParams {
    /// Path to the local file to upload
    pub file_path: String,
    /// Name of the GCS bucket. If not provided, you must ask the user for a bucket name.
    #[serde(default)]
    pub bucket_name: Option<String>,
    /// Name for the file in GCS. Defaults to the original filename.
    #[serde(default)]
    pub destination_name: Option<String>,
}

impl From<ShareFileParams> for PublishRequest {
    fn from(params: ShareFileParams) -> Self {
        Self {
            file_path: params.file_path,
            bucket_name: params.bucket_name,
            destination_name: params.destination_name,
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct NoParams {}

/// Serializes an operation outcome into the document handed to the host.
///
/// Successes get `"success": true` when `mark_success` is set; failures
/// always become an [`ErrorDescriptor`].
pub fn render<T: Serialize>(outcome: crate::Result<T>, mark_success: bool) -> (Value, bool) {
    match outcome {
        Ok(value) => {
            let mut document = serde_json::to_value(value).unwrap_or(Value::Null);
            if mark_success {
                if let Value::Object(map) = &mut document {
                    map.insert("success".to_string(), Value::Bool(true));
                }
            }
            (document, false)
        }
        Err(err) => {
            if err.is_auth() {
                warn!("Authentication required: {}", err);
            } else {
                error!("Operation failed: {}", err);
            }
            let descriptor = ErrorDescriptor::from(&err);
            (serde_json::to_value(descriptor).unwrap_or(Value::Null), true)
        }
    }
}

fn mcp_err(msg: impl std::fmt::Display) -> McpError {
    McpError::internal_error(msg.to_string(), None)
}

/// Operation failures are tool results with `isError`, never protocol errors.
fn tool_result((document, is_error): (Value, bool)) -> std::result::Result<CallToolResult, McpError> {
    let content = vec![Content::text(
        serde_json::to_string_pretty(&document).map_err(mcp_err)?,
    )];
    Ok(if is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    })
}

#[derive(Clone)]
pub struct ShareServer {
    manager: ShareManager,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ShareServer {
    pub fn new(manager: ShareManager) -> Self {
        Self {
            manager,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Upload a file to Google Cloud Storage and make it publicly accessible. Creates the bucket (US-EAST1, STANDARD) if it does not exist and returns the public URL. If no bucket name is known, ask the user for one before calling."
    )]
    async fn share_file_public(
        &self,
        Parameters(p): Parameters<ShareFileParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        info!("Tool call: share_file_public");
        let request = PublishRequest::from(p);
        tool_result(render(self.manager.share_file_public(&request).await, true))
    }

    #[tool(description = "Check Google Cloud authentication status and explain how to log in if needed.")]
    async fn check_gcs_auth(
        &self,
        Parameters(_p): Parameters<NoParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        info!("Tool call: check_gcs_auth");
        tool_result(render(self.manager.check_auth().await, false))
    }

    #[tool(description = "List all accessible Google Cloud Storage buckets.")]
    async fn list_buckets(
        &self,
        Parameters(_p): Parameters<NoParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        info!("Tool call: list_buckets");
        tool_result(render(
            self.manager.list_buckets().await.map(BucketListing::from),
            true,
        ))
    }
}

#[tool_handler]
impl ServerHandler for ShareServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }
}
