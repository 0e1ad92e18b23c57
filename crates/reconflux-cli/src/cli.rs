//! CLI argument definitions for reconflux.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `query` | Fan a target out to several sources |
//! | `sources` | Show source configuration and credential status |
//! | `store` | Read and write top-level store keys |
//! | `history` | List recorded events for an operation |
//!
//! # Examples
//!
//! ```bash
//! reconflux query example.com --source whois,crtsh --pretty
//! reconflux query 8.8.8.8 --source shodan,censys --deadline-ms 15000
//! reconflux history recon multi-source --limit 5
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Multi-source reconnaissance from the command line.
#[derive(Debug, Parser)]
#[command(
    name = "reconflux",
    author,
    version,
    about = "Multi-source reconnaissance CLI",
    long_about = "reconflux queries several intelligence sources (Shodan, Censys, VirusTotal, \
Hunter.io, WHOIS, crt.sh) concurrently and returns one aggregated result.\n\
\n\
Credentials are read from the environment (or a .env file). Results are \
recorded in a local JSON store."
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Emit logs on stderr as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    /// Directory holding db.json (defaults to RECONFLUX_HOME or ~/.reconflux).
    #[arg(long, global = true)]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Query one target against several sources.
    ///
    /// Exits with code 3 when at least one source reported an error.
    ///
    ///   reconflux query example.com --source whois,crtsh
    Query(QueryArgs),

    /// Show every source with its settings and credential status.
    Sources,

    /// Read or write top-level store keys.
    Store(StoreArgs),

    /// List recorded events for a category and operation.
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Domain, IP address or CIDR range.
    pub target: String,

    /// Comma separated source names (shodan, censys, virustotal, hunter, whois, crtsh).
    #[arg(long = "source", short = 's', required = true, value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Overall deadline for the query in milliseconds.
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Do not record the result in the store.
    #[arg(long, default_value_t = false)]
    pub no_store: bool,
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub command: StoreCommand,
}

#[derive(Debug, Subcommand)]
pub enum StoreCommand {
    /// Print the value stored under a key.
    Get(StoreKeyArgs),

    /// Replace the value under a key with a JSON value.
    Set(StoreValueArgs),

    /// Merge a JSON object into the object under an existing key.
    Update(StoreValueArgs),
}

#[derive(Debug, Args)]
pub struct StoreKeyArgs {
    pub key: String,
}

#[derive(Debug, Args)]
pub struct StoreValueArgs {
    pub key: String,

    /// JSON text, e.g. '{"theme": "dark"}'.
    pub value: String,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Category such as `recon` or `vulnerability`.
    pub category: String,

    /// Operation such as `multi-source` or `whois`.
    pub operation: String,

    /// Most recent events to show.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_accepts_comma_separated_sources() {
        let cli = Cli::try_parse_from([
            "reconflux",
            "query",
            "example.com",
            "--source",
            "whois,crtsh",
            "--pretty",
        ])
        .expect("valid arguments");

        assert!(cli.pretty);
        let Command::Query(args) = cli.command else {
            panic!("expected query command");
        };
        assert_eq!(args.target, "example.com");
        assert_eq!(args.sources, vec!["whois", "crtsh"]);
        assert_eq!(args.deadline_ms, None);
    }

    #[test]
    fn query_requires_at_least_one_source() {
        assert!(Cli::try_parse_from(["reconflux", "query", "example.com"]).is_err());
    }

    #[test]
    fn store_subcommands_parse() {
        let cli = Cli::try_parse_from(["reconflux", "store", "set", "settings", "{\"a\":1}"])
            .expect("valid arguments");

        assert!(matches!(
            cli.command,
            Command::Store(StoreArgs {
                command: StoreCommand::Set(StoreValueArgs { ref key, .. })
            }) if key == "settings"
        ));
    }
}
