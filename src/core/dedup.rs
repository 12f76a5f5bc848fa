//! Skip-guard against re-uploading backups already present offsite.

use tracing::warn;

use crate::core::models::PROCESSED_SUFFIX;
use crate::error::Result;
use crate::tools::RemoteShell;

pub struct DedupGuard;

impl DedupGuard {
    /// Check whether a processed artifact for `tag` already exists under
    /// `remote_root`.
    ///
    /// Returns `Ok(true)` when the upload should be skipped. A failed probe
    /// propagates as an error: ambiguity between "absent" and "could not
    /// check" must neither trigger a duplicate upload nor a silent skip.
    pub async fn already_uploaded(
        shell: &dyn RemoteShell,
        remote_root: &str,
        tag: &str,
    ) -> Result<bool> {
        let artifact_path = format!("{}/{}{}", remote_root, tag, PROCESSED_SUFFIX);

        if shell.exists(&artifact_path).await? {
            warn!(
                tag,
                "Offsite already has a backup with the same name, it will not be uploaded"
            );
            return Ok(true);
        }
        Ok(false)
    }
}
