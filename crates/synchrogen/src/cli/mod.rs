//! Command-line interface for synchrogen.
//!
//! This module provides the CLI structure for the `synchrogen` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, RenderCommand, ServeCommand};

/// synchrogen - Generate Synchro network files from intersection details
///
/// Serves a web form that turns an intersection description into a Synchro
/// UTDF network file and CSV summary, backing both up to Google Drive and
/// logging each generation to a Google Sheet.
#[derive(Debug, Parser)]
#[command(name = "synchrogen")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the web form and JSON API
    Serve(ServeCommand),

    /// Generate the files for one intersection into a directory
    Render(RenderCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Serve(ServeCommand {
                bind: None,
                port: None,
            }),
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "synchrogen");
    }

    #[test]
    fn test_verbosity_levels() {
        use crate::logging::Verbosity;
        assert_eq!(cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["synchrogen", "serve", "--bind", "0.0.0.0", "-p", "9000"]).unwrap();
        match cli.command {
            Command::Serve(cmd) => {
                assert_eq!(cmd.bind.as_deref(), Some("0.0.0.0"));
                assert_eq!(cmd.port, Some(9000));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_render() {
        let cli = Cli::try_parse_from([
            "synchrogen",
            "render",
            "--name",
            "Intersection A",
            "--lanes",
            "4",
            "--cycle-length",
            "90",
            "--out-dir",
            "/tmp/out",
            "--no-geocode",
        ])
        .unwrap();
        match cli.command {
            Command::Render(cmd) => {
                assert_eq!(cmd.name, "Intersection A");
                assert_eq!(cmd.lanes, 4);
                assert_eq!(cmd.cycle_length, 90);
                assert_eq!(cmd.speed, 30);
                assert!(cmd.no_geocode);
                assert!(!cmd.record);
                assert_eq!(cmd.out_dir, PathBuf::from("/tmp/out"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_render_negative_lanes() {
        let cli = Cli::try_parse_from([
            "synchrogen", "render", "-n", "A", "-l", "-1", "-C", "90",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Render(RenderCommand { lanes: -1, .. })));
    }

    #[test]
    fn test_parse_render_requires_cycle_length() {
        let result = Cli::try_parse_from(["synchrogen", "render", "--name", "A", "--lanes", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = Cli::try_parse_from(["synchrogen", "config", "validate", "--file", "/x.toml"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = Cli::try_parse_from(["synchrogen", "-c", "/custom/config.toml", "config", "path"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose_and_quiet() {
        let cli = Cli::try_parse_from(["synchrogen", "-v", "config", "path"]).unwrap();
        assert_eq!(cli.verbose, 1);
        let cli = Cli::try_parse_from(["synchrogen", "-q", "config", "path"]).unwrap();
        assert!(cli.quiet);
    }
}
