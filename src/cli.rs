use clap::{Parser, Subcommand};

// ///////////// //
// CLI interface //
// ///////////// //

/// cups-indicator - A service that follows CUPS job notifications and exports a "what is printing right now" menu over MQTT.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Subscribes to CUPS and dumps every decoded notification to stdout as JSON.
    Dump,
}
