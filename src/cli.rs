// CLI definitions using clap

use clap::Parser;
use std::path::PathBuf;

use crate::config::ListenerConfig;

#[derive(Parser, Debug)]
#[command(name = "rawhid_listener")]
#[command(author, version, about = "Console bridge to raw HID packet devices")]
pub struct Cli {
    /// Config file path (default: ~/.config/rawhid-listener/config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Receive timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub rx_timeout: Option<u32>,

    /// Send timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub tx_timeout: Option<u32>,

    /// Truncate console lines to this many characters
    #[arg(long, value_name = "CHARS")]
    pub max_line: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// List every HID device visible to hidapi and exit
    #[arg(long)]
    pub list: bool,
}

impl Cli {
    /// Config file to load
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(ListenerConfig::default_path)
    }

    /// Apply command-line overrides on top of file settings
    pub fn apply(&self, config: &mut ListenerConfig) {
        if let Some(ms) = self.rx_timeout {
            config.rx_timeout_ms = ms;
        }
        if let Some(ms) = self.tx_timeout {
            config.tx_timeout_ms = ms;
        }
        if let Some(chars) = self.max_line {
            config.max_line_len = chars;
        }
    }
}
