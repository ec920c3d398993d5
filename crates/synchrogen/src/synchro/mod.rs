//! Synchro file rendering.
//!
//! Turns a validated [`GenerationRequest`] into the two deliverables: the
//! UTDF network text Synchro imports and a CSV summary of the intersections.
//! Rendering never reads the clock or the network, so the same request and
//! sites always produce byte-identical files.

pub mod network;
pub mod summary;
pub mod utdf;

pub use network::{parse_streets, Network, Streets};

use crate::artifact::GeneratedArtifact;
use crate::error::RenderError;
use crate::geocode::Site;
use crate::intake::GenerationRequest;

/// Render `request` into a network file and summary.
///
/// `sites[i]` positions intersection `i`; missing entries use the fallback
/// grid.
///
/// # Errors
///
/// Returns an error if a request value cannot be represented in the output.
pub fn render(
    request: &GenerationRequest,
    sites: &[Option<Site>],
) -> Result<GeneratedArtifact, RenderError> {
    let network = Network::build(request, sites)?;
    let text = utdf::write(&network)?;
    let csv = summary::write(&network)?;
    Ok(GeneratedArtifact::new(
        file_stem(&request.intersection_names()),
        text.into_bytes(),
        csv,
    ))
}

/// File stem shared by both outputs, e.g. `synchro_main_st_and_oak_ave`.
#[must_use]
pub fn file_stem(names: &[&str]) -> String {
    let slug = names.first().map(|n| slugify(n)).unwrap_or_default();
    let mut stem = if slug.is_empty() {
        "synchro_network".to_string()
    } else {
        format!("synchro_{slug}")
    };
    if names.len() > 1 {
        stem.push_str(&format!("_plus_{}", names.len() - 1));
    }
    stem
}

const MAX_SLUG_LEN: usize = 60;

fn slugify(name: &str) -> String {
    static NON_ALNUM: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| regex::Regex::new("[^a-z0-9]+").expect("Invalid regex pattern"));
    let lowered = name.to_lowercase();
    let slug = re.replace_all(&lowered, "_");
    let slug = slug.trim_matches('_');
    slug.chars()
        .take(MAX_SLUG_LEN)
        .collect::<String>()
        .trim_end_matches('_')
        .to_string()
}
