//! `synchrogen` - CLI for the Synchro network generator
//!
//! Runs the web form, renders files from the command line, and inspects
//! configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;

use synchrogen::cli::{Cli, Command, ConfigCommand, RenderCommand, ServeCommand};
use synchrogen::geocode::DisabledGeocoder;
use synchrogen::{delivery, init_logging, intake, pipeline, server, Config, Generator, StepOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Execute the command
    match cli.command {
        Command::Serve(serve_cmd) => handle_serve(config, &serve_cmd).await,
        Command::Render(render_cmd) => handle_render(&config, &render_cmd).await,
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

async fn handle_serve(mut config: Config, cmd: &ServeCommand) -> anyhow::Result<()> {
    if let Some(bind) = &cmd.bind {
        config.server.bind.clone_from(bind);
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    config.validate()?;

    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .with_context(|| format!("invalid listen address {}", config.listen_addr()))?;
    let generator = Arc::new(Generator::from_config(&config)?);
    server::serve(generator, addr).await?;
    Ok(())
}

async fn handle_render(config: &Config, cmd: &RenderCommand) -> anyhow::Result<()> {
    let request = intake::validate_single(cmd.email.as_deref(), &cmd.form())?;

    let mut generator = if cmd.record {
        config.validate()?;
        Generator::from_config(config)?
    } else {
        Generator::offline().with_geocoder(pipeline::geocoder_from_config(config)?)
    };
    if cmd.no_geocode {
        generator = generator.with_geocoder(Arc::new(DisabledGeocoder));
    }

    let artifact = generator.prepare(&request).await?;
    for path in delivery::write_to_dir(&artifact, &cmd.out_dir)? {
        println!("{}", path.display());
    }
    println!("digest: {}", artifact.digest());

    if cmd.record {
        let report = generator.record(&request, &artifact, Utc::now()).await;
        println!("backup: {}", describe(&report.backup));
        println!("usage log: {}", describe(&report.usage));
    }
    Ok(())
}

fn describe(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Done { detail } => format!("done ({detail})"),
        StepOutcome::Skipped => "skipped (not configured)".to_string(),
        StepOutcome::Failed { error } => format!("failed: {error}"),
    }
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Listen address:     {}", config.listen_addr());
                println!();
                println!("[Google]");
                println!("  Enabled:            {}", config.google.enabled);
                println!("  Credential:         {}", configured(config.google.has_credential()));
                println!(
                    "  Drive folder:       {}",
                    config.google.drive_folder_id.as_deref().unwrap_or("(none)")
                );
                println!(
                    "  Sheet:              {}",
                    config.google.sheet_id.as_deref().unwrap_or("(none)")
                );
                println!("  Sheet range:        {}", config.google.sheet_range);
                println!("  Backup active:      {}", config.google.backup_enabled());
                println!("  Usage log active:   {}", config.google.usage_enabled());
                println!();
                println!("[Geocoder]");
                println!("  Enabled:            {}", config.geocoder.enabled);
                println!("  Endpoint:           {}", config.geocoder.endpoint);
                println!();
                println!("[Remote]");
                println!("  Timeout (s):        {}", config.remote.timeout_secs);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            Config::check(path).context("configuration is invalid")?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

fn configured(present: bool) -> &'static str {
    if present {
        "configured"
    } else {
        "(none)"
    }
}
