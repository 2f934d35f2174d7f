pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "cidstore")]
#[command(about = "Record and look up who owns which content fingerprints")]
pub struct Args {
    /// Daemon API URL (defaults to localhost on the configured api_port)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the cidstore config directory (defaults to ~/.cidstore)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Bearer token of the identity to act as (defaults to the default
    ///  identity's token from the config file, if any)
    #[arg(long, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
