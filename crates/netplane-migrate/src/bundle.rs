//! Export bundle format
//!
//! ```text
//! <resources: YAML stream of v3 manifests>
//! ===
//! <cluster information manifest>
//! ===
//! <IPAM snapshot JSON>
//! ```
//!
//! The delimiter is matched anywhere in the byte stream, so the whole input
//! is buffered before splitting.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Separator between bundle segments
pub const DELIMITER: &[u8] = b"===\n";

/// Number of segments in a well-formed bundle
pub const SEGMENTS: usize = 3;

/// Errors reading a bundle
#[derive(Debug, Error)]
pub enum BundleError {
    /// Input did not split into exactly three segments
    #[error("Imported file: {source_name} is improperly formatted. Try recreating with 'netplane migrate export'")]
    Malformed {
        /// File name, or `<stdin>`
        source_name: String,
        /// Segments actually found
        segments: usize,
    },

    /// Input could not be read
    #[error("failed to read {source_name}: {source}")]
    Read {
        /// File name, or `<stdin>`
        source_name: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },
}

/// The three payloads of an export
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportBundle {
    /// YAML stream of v3 resource manifests
    pub resources: Vec<u8>,
    /// ClusterInformation manifest
    pub cluster_info: Vec<u8>,
    /// IPAM snapshot JSON
    pub ipam: Vec<u8>,
}

impl ExportBundle {
    /// Split raw bundle bytes. `source_name` only feeds the error message.
    pub fn split(bytes: &[u8], source_name: &str) -> Result<Self, BundleError> {
        let mut parts = split_on(bytes, DELIMITER);
        if parts.len() != SEGMENTS {
            return Err(BundleError::Malformed {
                source_name: source_name.to_string(),
                segments: parts.len(),
            });
        }
        let ipam = parts.pop().unwrap_or_default().to_vec();
        let cluster_info = parts.pop().unwrap_or_default().to_vec();
        let resources = parts.pop().unwrap_or_default().to_vec();
        Ok(Self {
            resources,
            cluster_info,
            ipam,
        })
    }

    /// Join the segments back into bundle bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.resources.len() + self.cluster_info.len() + self.ipam.len() + 2 * DELIMITER.len(),
        );
        out.extend_from_slice(&self.resources);
        out.extend_from_slice(DELIMITER);
        out.extend_from_slice(&self.cluster_info);
        out.extend_from_slice(DELIMITER);
        out.extend_from_slice(&self.ipam);
        out
    }
}

fn split_on<'a>(bytes: &'a [u8], delim: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + delim.len() <= bytes.len() {
        if &bytes[i..i + delim.len()] == delim {
            parts.push(&bytes[start..i]);
            i += delim.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&bytes[start..]);
    parts
}

/// Where a bundle is read from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BundleSource {
    /// Standard input, selected with `-`
    Stdin,
    /// A file on disk
    File(PathBuf),
}

impl BundleSource {
    /// `-` selects stdin; anything else is a path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            BundleSource::Stdin
        } else {
            BundleSource::File(PathBuf::from(arg))
        }
    }
}

impl fmt::Display for BundleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleSource::Stdin => f.write_str("<stdin>"),
            BundleSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Read a whole bundle and split it.
pub async fn read_bundle(source: &BundleSource) -> Result<ExportBundle, BundleError> {
    let source_name = source.to_string();
    let bytes = match source {
        BundleSource::Stdin => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .map(|_| buf)
        }
        BundleSource::File(path) => tokio::fs::read(path).await,
    }
    .map_err(|source| BundleError::Read {
        source_name: source_name.clone(),
        source,
    })?;

    debug!(source = %source_name, bytes = bytes.len(), "read bundle");
    ExportBundle::split(&bytes, &source_name)
}
