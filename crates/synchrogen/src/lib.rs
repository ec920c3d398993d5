//! `synchrogen` - Synchro network files from a web form
//!
//! This library turns an intersection description (name, lanes, speed,
//! cycle length) into a Synchro UTDF network file and a CSV summary, hands
//! both back to the requester, and then backs them up to Google Drive and
//! appends a usage row to a Google Sheet without holding up the response.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod artifact;
pub mod backup;
pub mod cli;
pub mod config;
pub mod credential;
pub mod delivery;
pub mod error;
pub mod geocode;
pub mod google;
pub mod intake;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod synchro;
pub mod usage;

pub use artifact::GeneratedArtifact;
pub use config::Config;
pub use error::{Error, RenderError, Result, SinkError, ValidationError};
pub use intake::GenerationRequest;
pub use logging::init_logging;
pub use pipeline::{Generator, SideEffectReport, StepOutcome};
