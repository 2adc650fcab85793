use clap::{Parser, Subcommand};

/// Paper-trading execution engine for the algotrader platform
#[derive(Parser)]
#[command(name = "algex", version, about)]
pub struct Cli {
    /// Configuration directory
    #[arg(short, long, default_value = "config")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the execution engine
    Run,
    /// Load and validate configuration, then exit
    CheckConfig,
}
