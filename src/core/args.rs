use clap::Parser;
use log::kv::{ToValue, Value};

#[derive(Parser, Debug, PartialEq)]
#[command(version, about)]
pub struct CliArgs {
    /// Path to the benchmark config (yaml, toml or json).
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: String,

    /// Start the benchmark without probing every warehouse first.
    #[arg(long, conflicts_with = "check_only")]
    pub skip_check: bool,

    /// Check every enabled warehouse with `SELECT 1` and exit.
    #[arg(long)]
    pub check_only: bool,
}

impl ToValue for CliArgs {
    fn to_value(&self) -> Value<'_> {
        Value::from_debug(self)
    }
}
