pub mod auth; // API key identity layer
pub mod config_parser; // gateway config file
pub mod endpoints; // API endpoints
pub mod error; // error handling
pub mod gateway_util; // utilities for gateway
pub mod observability; // utilities for observability (logs, metrics, etc.)
pub mod store; // document store client (Redis or in-memory)
pub mod subscription; // subscription lookup
mod testing;
pub mod usage_limit; // free-tier usage gating and accounting
