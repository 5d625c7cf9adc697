pub mod data;
pub mod defaults;
pub mod io;
pub mod printing;

#[cfg(test)]
pub mod tests;

pub use data::{Config, ImagePolicy, ServerConfig};
pub use io::ConfigError;
