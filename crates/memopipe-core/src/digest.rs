//! Cache key derivation from run options + input content

use memopipe_store::hash;

use crate::error::PipelineError;
use crate::options::RunOptions;

/// Derives cache keys for one run.
///
/// The canonical serialization of the run options is computed once at
/// construction and reused for every input in the batch; it is invariant
/// across the batch, only the content varies. serde_json's default map
/// representation is sorted, so the serialization does not depend on the
/// order options were inserted in.
#[derive(Debug, Clone)]
pub struct Digest {
    config_json: String,
}

impl Digest {
    /// Canonicalize the options. Fails before any work starts if the
    /// options are not serializable.
    pub fn new(opts: &RunOptions) -> Result<Self, PipelineError> {
        let config_json = serde_json::to_string(opts)
            .map_err(|e| PipelineError::Config(format!("options are not serializable: {e}")))?;
        Ok(Self { config_json })
    }

    /// Cache key for one input: blake3 over the canonical config followed
    /// by the raw content, hex-encoded.
    pub fn key(&self, content: &[u8]) -> String {
        hash::hash_with_prefix(self.config_json.as_bytes(), content)
            .to_hex()
            .to_string()
    }
}
