use std::path::PathBuf;

use clap::Parser;

/// Conduit completion gateway
#[derive(Debug, Parser)]
#[command(name = "conduit", about = "Run one completion against a configured Gemini or HuggingFace provider")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "conduit.toml", env = "CONDUIT_CONFIG")]
    pub config: PathBuf,

    /// Configured provider name; defaults to the first provider
    #[arg(short, long, env = "CONDUIT_PROVIDER")]
    pub provider: Option<String>,

    /// Model identifier
    #[arg(short, long)]
    pub model: String,

    /// System instruction
    #[arg(short, long)]
    pub system: Option<String>,

    /// JSON file holding an array of tool declarations
    #[arg(long)]
    pub tools: Option<PathBuf>,

    /// Print text as it arrives
    #[arg(long)]
    pub stream: bool,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Print tool invocations as JSON instead of markup
    #[arg(long)]
    pub json: bool,

    /// Prompt text; read from stdin when omitted
    pub prompt: Option<String>,
}
