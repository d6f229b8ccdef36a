
mod mcp_protocol;
mod publish_ops;
