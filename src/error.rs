use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    /// Fatal problem in the line-oriented router configuration.
    #[error("node {node}: {message}\n'{line}'")]
    RouterConfig {
        node: u32,
        line: String,
        message: String,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("interface {index} not found")]
    InterfaceNotFound { index: usize },

    #[error("invalid packet: {0}")]
    InvalidPacket(String),
}

impl Error {
    /// Shorthand for a router configuration error.
    pub fn router_config(node: u32, line: &str, message: impl Into<String>) -> Self {
        Error::RouterConfig {
            node,
            line: line.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
