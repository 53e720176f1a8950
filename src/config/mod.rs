mod server;

pub use server::{ServerConfig, ServerConfigOverrides};
