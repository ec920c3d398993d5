//! Handing generated files back to the requester.
//!
//! The server is stateless, so the browser flow embeds both files in the
//! result page as `data:` URIs and the JSON API returns them inline. The CLI
//! writes them to a directory instead.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::artifact::GeneratedArtifact;
use crate::error::{Error, Result};
use crate::intake::{CYCLE_LENGTH_RANGE, DEFAULT_SPEED_MPH, LANES_RANGE, SPEED_RANGE};

/// A file ready to hand to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Suggested filename.
    pub filename: String,
    /// MIME type, e.g. `text/csv; charset=utf-8`.
    pub content_type: &'static str,
    /// File contents.
    pub body: Vec<u8>,
}

impl Download {
    /// Both files of `artifact`, network text first.
    #[must_use]
    pub fn from_artifact(artifact: &GeneratedArtifact) -> [Self; 2] {
        artifact.files().map(|(filename, content_type, body)| Self {
            filename,
            content_type,
            body: body.to_vec(),
        })
    }

    /// `data:` URI carrying the file base64-encoded.
    #[must_use]
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type.replace(' ', ""),
            STANDARD.encode(&self.body)
        )
    }
}

/// One file in a JSON response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBody {
    /// Suggested filename.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// File contents as UTF-8 text.
    pub content: String,
}

/// JSON body of a successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Network text and CSV summary, in that order.
    pub files: Vec<FileBody>,
    /// Digest over both files.
    pub digest: String,
}

impl GenerateResponse {
    /// Build the response body for `artifact`.
    #[must_use]
    pub fn from_artifact(artifact: &GeneratedArtifact) -> Self {
        Self {
            files: Download::from_artifact(artifact)
                .into_iter()
                .map(|d| FileBody {
                    content: String::from_utf8_lossy(&d.body).into_owned(),
                    filename: d.filename,
                    content_type: d.content_type.to_string(),
                })
                .collect(),
            digest: artifact.digest(),
        }
    }
}

/// Write both files into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or a file cannot be
/// written.
pub fn write_to_dir(artifact: &GeneratedArtifact, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| Error::DirectoryCreate {
        path: dir.to_path_buf(),
        source: e,
    })?;
    Download::from_artifact(artifact)
        .into_iter()
        .map(|download| -> Result<PathBuf> {
            let path = dir.join(&download.filename);
            std::fs::write(&path, &download.body)?;
            Ok(path)
        })
        .collect()
}

const PAGE_STYLE: &str = "body{font-family:sans-serif;max-width:40rem;margin:2rem auto;padding:0 1rem}\
label{display:block;margin:.6rem 0}input[type=number]{width:6rem}\
fieldset{margin:1rem 0}.error{color:#a00}code{word-break:break-all}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{PAGE_STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        title = escape_html(title),
    )
}

/// The intersection form.
#[must_use]
pub fn form_page() -> String {
    let mut body = String::from("<h1>Synchro Network Generator</h1>\n");
    body.push_str("<form method=\"post\" action=\"/generate\">\n");
    body.push_str("<label>E-mail (optional) <input type=\"email\" name=\"email\"></label>\n");
    body.push_str(
        "<label>Intersection <input type=\"text\" name=\"name\" required maxlength=\"200\" \
         placeholder=\"Haggerty Road and 10 Mile Road, Novi, Michigan\"></label>\n",
    );
    let _ = writeln!(
        body,
        "<label>Lanes per approach <input type=\"number\" name=\"lanes\" required min=\"{}\" max=\"{}\" value=\"2\"></label>",
        LANES_RANGE.start(),
        LANES_RANGE.end()
    );
    let _ = writeln!(
        body,
        "<label>Speed (mph) <input type=\"number\" name=\"speed\" min=\"{}\" max=\"{}\" value=\"{DEFAULT_SPEED_MPH}\"></label>",
        SPEED_RANGE.start(),
        SPEED_RANGE.end()
    );
    let _ = writeln!(
        body,
        "<label>Cycle length (s) <input type=\"number\" name=\"cycle_length\" required min=\"{}\" max=\"{}\" value=\"90\"></label>",
        CYCLE_LENGTH_RANGE.start(),
        CYCLE_LENGTH_RANGE.end()
    );
    body.push_str("<label><input type=\"checkbox\" name=\"twltl\"> Two-way left-turn lane</label>\n");

    body.push_str("<details><summary>Per-approach overrides</summary>\n");
    for (prefix, label) in [("nb", "Northbound"), ("sb", "Southbound"), ("eb", "Eastbound"), ("wb", "Westbound")] {
        let _ = writeln!(
            body,
            "<fieldset><legend>{label}</legend>\
             <label>Lanes <input type=\"number\" name=\"{prefix}_lanes\" min=\"{}\" max=\"{}\"></label>\
             <label>Speed <input type=\"number\" name=\"{prefix}_speed\" min=\"{}\" max=\"{}\"></label>\
             <label><input type=\"checkbox\" name=\"{prefix}_twltl\"> TWLTL</label></fieldset>",
            LANES_RANGE.start(),
            LANES_RANGE.end(),
            SPEED_RANGE.start(),
            SPEED_RANGE.end()
        );
    }
    body.push_str("</details>\n<p><button type=\"submit\">Generate</button></p>\n</form>\n");
    page("Synchro Network Generator", &body)
}

/// Result page with both downloads.
#[must_use]
pub fn result_page(artifact: &GeneratedArtifact) -> String {
    let mut body = String::from("<h1>Network generated</h1>\n<ul>\n");
    for download in Download::from_artifact(artifact) {
        let filename = escape_html(&download.filename);
        let _ = writeln!(
            body,
            "<li><a href=\"{}\" download=\"{filename}\">{filename}</a></li>",
            download.data_uri()
        );
    }
    let _ = writeln!(
        body,
        "</ul>\n<p>Digest: <code>{}</code></p>\n<p><a href=\"/\">Generate another</a></p>",
        artifact.digest()
    );
    page("Network generated", &body)
}

/// Error page. `field` is named when the submitter can fix it.
#[must_use]
pub fn error_page(message: &str, field: Option<&str>) -> String {
    let mut body = String::from("<h1>Could not generate network</h1>\n");
    if let Some(field) = field {
        let _ = writeln!(body, "<p class=\"error\">Field <code>{}</code>:", escape_html(field));
    } else {
        body.push_str("<p class=\"error\">");
    }
    let _ = writeln!(body, "{}</p>\n<p><a href=\"/\">Back to the form</a></p>", escape_html(message));
    page("Could not generate network", &body)
}

/// Escape text for HTML element content and quoted attributes.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{CSV_CONTENT_TYPE, TEXT_CONTENT_TYPE};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn artifact() -> GeneratedArtifact {
        GeneratedArtifact::new(
            "synchro_intersection_a",
            b"[Network]\tx\n".to_vec(),
            b"intersection,node_id\nIntersection A,1\n".to_vec(),
        )
    }

    #[test]
    fn test_downloads() {
        let [text, csv] = Download::from_artifact(&artifact());
        assert_eq!(text.filename, "synchro_intersection_a.txt");
        assert_eq!(text.content_type, TEXT_CONTENT_TYPE);
        assert_eq!(csv.filename, "synchro_intersection_a.csv");
        assert_eq!(csv.content_type, CSV_CONTENT_TYPE);
        assert_eq!(csv.body, b"intersection,node_id\nIntersection A,1\n");
    }

    #[test]
    fn test_data_uri_round_trips() {
        let [text, _] = Download::from_artifact(&artifact());
        let uri = text.data_uri();
        let encoded = uri
            .strip_prefix("data:text/plain;charset=utf-8;base64,")
            .unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), b"[Network]\tx\n");
    }

    #[test]
    fn test_generate_response() {
        let response = GenerateResponse::from_artifact(&artifact());
        assert_eq!(response.files.len(), 2);
        assert_eq!(response.files[0].content, "[Network]\tx\n");
        assert_eq!(response.files[1].content_type, CSV_CONTENT_TYPE);
        assert_eq!(response.digest, artifact().digest());
    }

    #[test]
    fn test_result_page_links() {
        let html = result_page(&artifact());
        assert!(html.contains("download=\"synchro_intersection_a.txt\""));
        assert!(html.contains("download=\"synchro_intersection_a.csv\""));
        assert!(html.contains("href=\"data:text/csv;charset=utf-8;base64,"));
        assert!(html.contains(&artifact().digest()));
    }

    #[test]
    fn test_error_page_names_field() {
        let html = error_page("must be between 1 and 6", Some("lanes"));
        assert!(html.contains("<code>lanes</code>"));
        assert!(html.contains("must be between 1 and 6"));
    }

    #[test]
    fn test_error_page_escapes() {
        let html = error_page("<script>alert(1)</script>", None);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_form_page_fields() {
        let html = form_page();
        for field in ["email", "name", "lanes", "speed", "cycle_length", "twltl", "nb_lanes", "wb_twltl"] {
            assert!(html.contains(&format!("name=\"{field}\"")), "missing {field}");
        }
        assert!(html.contains("action=\"/generate\""));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"A & B <"x">'"#), "A &amp; B &lt;&quot;x&quot;&gt;&#39;");
    }

    #[test]
    fn test_write_to_dir() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");

        let paths = write_to_dir(&artifact(), &out).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(std::fs::read(&paths[0]).unwrap(), b"[Network]\tx\n");
        assert!(paths[1].ends_with("synchro_intersection_a.csv"));
    }
}
