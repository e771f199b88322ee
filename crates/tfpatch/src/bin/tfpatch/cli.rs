//! tfpatch cli interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Override attributes of every `provider "aws"` block
    ///
    /// Replaces each named attribute with the given literal value, appending
    /// attributes that do not exist yet. Other providers and all formatting
    /// are left untouched.
    Provider(ProviderCommand),

    /// Rewrite the remote state location of `terraform { backend ... }`
    ///
    /// Derives a per-module state path (or workspace name, for the `remote`
    /// backend) from the module name and optional environment name.
    Backend(BackendCommand),
}

#[derive(Parser, Debug)]
pub struct ProviderCommand {
    /// Attribute to override, as NAME=VALUE. May be given multiple times.
    #[arg(
        short = 'o',
        long = "override",
        value_name = "NAME=VALUE",
        value_parser = parse_override
    )]
    pub overrides: Vec<(String, String)>,

    /// Files to patch
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct BackendCommand {
    /// Name of the module whose state is being relocated
    #[arg(short = 'm', long = "module-name")]
    pub module_name: String,

    /// Environment name to prefix the state location with
    #[arg(short = 'e', long = "env")]
    pub env: Option<String>,

    /// Files to patch
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

fn parse_override(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got `{raw}`")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn override_values_may_contain_equals_signs() {
        assert_eq!(
            parse_override("key=a=b").unwrap(),
            ("key".to_string(), "a=b".to_string())
        );
        assert!(parse_override("no-equals").is_err());
        assert!(parse_override("=value").is_err());
    }
}
