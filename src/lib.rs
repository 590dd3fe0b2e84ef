pub mod api;
pub mod bridge;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod mcp;
pub mod model;
pub mod parser;
pub mod paths;
pub mod prompt;
pub mod provider;
pub mod util;
pub mod xmp;
