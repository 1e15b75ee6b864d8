use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "spector", about = "Verify NL requirements against a running GUI application")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify a single requirement synchronously and print the verdicts.
    Run(RunArgs),
    /// Verify every unprocessed requirement of a setup against the shared
    /// display pool; results are reported in submission order.
    Batch(BatchArgs),
    /// Serve the tool-invocation HTTP surface.
    Serve(ServeArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Requirement file (TOML: title, description, criteria).
    #[arg(long)]
    pub requirement: String,

    /// Start URL of the application under test.
    #[arg(long)]
    pub url: String,

    /// Named input values (KEY=VALUE). Can be specified multiple times.
    #[arg(long = "input", action = clap::ArgAction::Append)]
    pub input: Vec<String>,

    /// Override the configured step budget.
    #[arg(long)]
    pub step_budget: Option<usize>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct BatchArgs {
    /// Setup file (TOML: start_url, inputs, requirements).
    #[arg(long)]
    pub setup: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Setup file to preload into the registry.
    #[arg(long)]
    pub setup: Option<String>,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8750)]
    pub port: u16,
}

/// Parse repeated KEY=VALUE flags, preserving order.
pub fn parse_input_pairs(pairs: &[String]) -> Result<Vec<(String, String)>, String> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| format!("invalid --input '{pair}', expected KEY=VALUE"))
        })
        .collect()
}
