//! Command-line interface definition for aihuman
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aihuman - interactive AI human avatar sessions
///
/// Runs live avatar sessions from the terminal, saves projects, extracts
/// knowledge-base text from documents and serves the extraction proxy.
#[derive(Parser, Debug, Clone)]
#[command(name = "aihuman")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "AIHUMAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive avatar session
    Session {
        /// Session configuration file (YAML)
        #[arg(short, long, conflicts_with = "published")]
        project: Option<PathBuf>,

        /// Name of a published project to load instead
        #[arg(long)]
        published: Option<String>,

        /// Supersede the knowledge base with text extracted from a document
        #[arg(long)]
        document: Option<PathBuf>,

        /// Bearer token for the backend
        #[arg(long, env = "AIHUMAN_AUTH_TOKEN", hide_env_values = true)]
        auth_token: Option<String>,

        /// Run without the soft and hard timers
        #[arg(long)]
        no_timers: bool,
    },

    /// Save a project without starting a session
    Save {
        /// Session configuration file (YAML)
        #[arg(short, long)]
        project: PathBuf,

        /// Bearer token for the backend
        #[arg(long, env = "AIHUMAN_AUTH_TOKEN", hide_env_values = true)]
        auth_token: Option<String>,
    },

    /// Extract knowledge-base text from a PDF or DOCX file
    Extract {
        /// Document to extract
        file: PathBuf,

        /// Bearer token for the backend
        #[arg(long, env = "AIHUMAN_AUTH_TOKEN", hide_env_values = true)]
        auth_token: Option<String>,

        /// Write the text to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the embed snippet of a published project
    Embed {
        /// Published project name
        project_name: String,

        /// Print the preview URL instead of the snippet
        #[arg(long)]
        preview: bool,
    },

    /// Serve the document extraction proxy
    Serve {
        /// Address to bind, overriding the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Store, inspect or clear the login used for backend calls
    Login {
        /// Bearer token to store
        #[arg(long, conflicts_with_all = ["record", "clear"])]
        token: Option<String>,

        /// Full login response (JSON) to store
        #[arg(long, conflicts_with = "clear")]
        record: Option<PathBuf>,

        /// Remove the stored login
        #[arg(long)]
        clear: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_session_command() {
        let cli = Cli::try_parse_from(["aihuman", "session", "--project", "demo.yaml"]).unwrap();
        match cli.command {
            Commands::Session {
                project,
                published,
                no_timers,
                ..
            } => {
                assert_eq!(project, Some(PathBuf::from("demo.yaml")));
                assert_eq!(published, None);
                assert!(!no_timers);
            }
            _ => panic!("Expected Session command"),
        }
    }

    #[test]
    fn test_cli_project_and_published_conflict() {
        let cli = Cli::try_parse_from([
            "aihuman",
            "session",
            "--project",
            "demo.yaml",
            "--published",
            "Demo",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_parse_embed_with_preview() {
        let cli = Cli::try_parse_from(["aihuman", "embed", "Math Tutor", "--preview"]).unwrap();
        if let Commands::Embed {
            project_name,
            preview,
        } = cli.command
        {
            assert_eq!(project_name, "Math Tutor");
            assert!(preview);
        } else {
            panic!("Expected Embed command");
        }
    }

    #[test]
    fn test_cli_parse_extract_with_output() {
        let cli =
            Cli::try_parse_from(["aihuman", "extract", "notes.pdf", "-o", "kb.txt"]).unwrap();
        if let Commands::Extract { file, output, .. } = cli.command {
            assert_eq!(file, PathBuf::from("notes.pdf"));
            assert_eq!(output, Some(PathBuf::from("kb.txt")));
        } else {
            panic!("Expected Extract command");
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli =
            Cli::try_parse_from(["aihuman", "-v", "--json-logs", "serve", "--bind", "0.0.0.0:80"])
                .unwrap();
        assert!(cli.verbose);
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Commands::Serve { bind: Some(_) }));
    }

    #[test]
    fn test_cli_login_clear_conflicts_with_token() {
        assert!(Cli::try_parse_from(["aihuman", "login", "--token", "t", "--clear"]).is_err());
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["aihuman"]).is_err());
    }
}
