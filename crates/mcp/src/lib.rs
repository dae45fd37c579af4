// MCP (Model Context Protocol) server implementation
// Exposes tools, resources and prompts to agent clients

pub mod capabilities;
pub mod protocol;
pub mod server;

pub use capabilities::{build_registry, CapabilityConfig, Profile};
pub use server::McpServer;
