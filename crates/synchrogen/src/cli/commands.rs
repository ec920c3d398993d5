//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::intake::{IntersectionForm, DEFAULT_SPEED_MPH};

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind (overrides `server.bind`)
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on (overrides `server.port`)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Render command arguments.
#[derive(Debug, Args)]
pub struct RenderCommand {
    /// Intersection name, e.g. "Main St and Oak Ave, Novi, MI"
    #[arg(short, long)]
    pub name: String,

    /// Lanes per approach
    #[arg(short, long, allow_negative_numbers = true)]
    pub lanes: i64,

    /// Signal cycle length in seconds
    #[arg(short = 'C', long, allow_negative_numbers = true)]
    pub cycle_length: i64,

    /// Speed limit in mph
    #[arg(short, long, default_value_t = i64::from(DEFAULT_SPEED_MPH), allow_negative_numbers = true)]
    pub speed: i64,

    /// Add a two-way left-turn lane on every approach
    #[arg(long)]
    pub twltl: bool,

    /// Requester e-mail recorded with backups and the usage log
    #[arg(short, long)]
    pub email: Option<String>,

    /// Directory to write the files into
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Skip geocoding and place the intersection at the origin
    #[arg(long)]
    pub no_geocode: bool,

    /// Also back up the files and append a usage row
    #[arg(long)]
    pub record: bool,
}

impl RenderCommand {
    /// The intersection as a form, ready for validation.
    #[must_use]
    pub fn form(&self) -> IntersectionForm {
        IntersectionForm {
            name: Some(self.name.clone()),
            lanes: Some(self.lanes),
            speed: Some(self.speed),
            cycle_length: Some(self.cycle_length),
            twltl: Some(self.twltl),
            ..IntersectionForm::default()
        }
    }
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
