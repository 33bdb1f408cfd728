use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(name = "f13", version, about = "Command-line client for the f13 platform")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config.toml (defaults to the user config directory)
    #[arg(long, global = true, env = "F13_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the API base URL, e.g. https://f13.example/api
    #[arg(long, global = true, env = "F13_BASE_URL")]
    pub base_url: Option<String>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Log in and store the session
    Login {
        #[arg(short, long)]
        username: String,
        /// Read from stdin when omitted
        #[arg(short, long, env = "F13_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Solve a CAPTCHA and send it with the login
        #[arg(long)]
        captcha: bool,
    },

    /// Create an account and store the session
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "F13_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long)]
        captcha: bool,
    },

    /// Show the logged-in user
    Whoami,

    /// Forget the stored session
    Logout,

    /// Solve a CAPTCHA interactively and print the solution
    Captcha,

    /// Authenticated GET of an API path, printed as JSON
    Get {
        /// Path relative to the base URL, e.g. /posts
        path: String,
        /// Query parameters as key=value
        #[arg(short = 'Q', long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Show or reset the configuration
    Config {
        #[arg(long)]
        show: bool,
        #[arg(long)]
        reset: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("page=2"),
            Ok(("page".to_string(), "2".to_string()))
        );
        assert!(parse_key_value("page").is_err());
    }

    #[test]
    fn test_get_with_query() {
        let args = Args::parse_from(["f13", "get", "/posts", "-Q", "page=2", "-Q", "sort=new"]);
        match args.command {
            Commands::Get { path, query } => {
                assert_eq!(path, "/posts");
                assert_eq!(query.len(), 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["f13", "-v", "-q", "whoami"]).is_err());
    }
}
