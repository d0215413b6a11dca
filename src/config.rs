/// Configuration management for the chat server.
/// Handles command-line argument parsing and config structure.
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "Chat Server")]
#[command(about = "Real-time group/private chat server", long_about = None)]
pub struct Config {
    /// Address to bind (default: 0.0.0.0)
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Server port (default: 5000)
    #[arg(long, default_value = "5000")]
    pub port: u16,

    /// SQLite database file path (default: chat.db)
    #[arg(long, default_value = "chat.db")]
    pub database: PathBuf,

    /// PID file path (optional) - write server PID to this file on startup
    #[arg(long)]
    pub pidfile: Option<PathBuf>,
}

impl Config {
    /// Parse command-line arguments into Config
    pub fn from_args() -> Self {
        Config::parse()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 5000,
            database: PathBuf::from("chat.db"),
            pidfile: None,
        };
        assert_eq!(config.port, 5000);
        assert_eq!(config.database.to_str().unwrap(), "chat.db");
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_custom_port() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database: PathBuf::from("chat.db"),
            pidfile: None,
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_custom_database() {
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 5000,
            database: PathBuf::from("/tmp/custom.db"),
            pidfile: None,
        };
        assert_eq!(config.database.to_str().unwrap(), "/tmp/custom.db");
    }
}
