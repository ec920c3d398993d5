//! The generated file pair.

/// Content type of the network text file.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Content type of the summary CSV.
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// A rendered network text file and its CSV summary.
///
/// Immutable once built. Delivery, backup and the usage log all read the
/// same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    stem: String,
    network_text: Vec<u8>,
    summary_csv: Vec<u8>,
}

impl GeneratedArtifact {
    /// Create an artifact from its file stem and contents.
    #[must_use]
    pub fn new(stem: impl Into<String>, network_text: Vec<u8>, summary_csv: Vec<u8>) -> Self {
        Self {
            stem: stem.into(),
            network_text,
            summary_csv,
        }
    }

    /// File stem shared by both files.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// `<stem>.txt`
    #[must_use]
    pub fn text_filename(&self) -> String {
        format!("{}.txt", self.stem)
    }

    /// `<stem>.csv`
    #[must_use]
    pub fn csv_filename(&self) -> String {
        format!("{}.csv", self.stem)
    }

    /// UTDF network text.
    #[must_use]
    pub fn network_text(&self) -> &[u8] {
        &self.network_text
    }

    /// CSV summary.
    #[must_use]
    pub fn summary_csv(&self) -> &[u8] {
        &self.summary_csv
    }

    /// `(filename, content type, bytes)` for both files, text first.
    #[must_use]
    pub fn files(&self) -> [(String, &'static str, &[u8]); 2] {
        [
            (self.text_filename(), TEXT_CONTENT_TYPE, self.network_text.as_slice()),
            (self.csv_filename(), CSV_CONTENT_TYPE, self.summary_csv.as_slice()),
        ]
    }

    /// BLAKE3 digest over both files, hex encoded.
    ///
    /// Each file is length-prefixed so moving bytes between them changes
    /// the digest.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (_, _, bytes) in self.files() {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        hasher.finalize().to_hex().to_string()
    }
}
