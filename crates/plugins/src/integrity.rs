//! Attach-time integrity checks of the plugin artifact.

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use {
    sha2::{Digest, Sha256},
    tracing::{info, warn},
};

use crate::error::{Error, Result};

/// Hex SHA-256 of the file at `path`.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verification run against the plugin artifact before it is initialized.
pub trait IntegrityVerifier: Send + Sync {
    /// `Err` rejects the plugin.
    fn verify(&self, artifact: &Path) -> Result<()>;
}

/// Hash the artifact and log the digest as its version. Never rejects.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDigest;

impl IntegrityVerifier for LogDigest {
    fn verify(&self, artifact: &Path) -> Result<()> {
        match sha256_file(artifact) {
            Ok(digest) => info!(artifact = %artifact.display(), version = %digest, "plugin version"),
            Err(e) => warn!(artifact = %artifact.display(), error = %e, "unable to sha256 plugin"),
        }
        Ok(())
    }
}

/// Require the artifact to hash to a known digest.
#[derive(Debug, Clone)]
pub struct ManifestDigest {
    expected: String,
}

impl ManifestDigest {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into().trim().to_ascii_lowercase(),
        }
    }
}

impl IntegrityVerifier for ManifestDigest {
    fn verify(&self, artifact: &Path) -> Result<()> {
        let actual = sha256_file(artifact)?;
        if actual != self.expected {
            return Err(Error::Integrity {
                artifact: artifact.display().to_string(),
                expected: self.expected.clone(),
                actual,
            });
        }
        info!(artifact = %artifact.display(), "plugin digest matches manifest");
        Ok(())
    }
}

/// An artifact and the verifier to run against it.
#[derive(Clone)]
pub struct IntegrityCheck {
    pub artifact: PathBuf,
    pub verifier: std::sync::Arc<dyn IntegrityVerifier>,
}

impl IntegrityCheck {
    pub fn new(artifact: impl Into<PathBuf>, verifier: impl IntegrityVerifier + 'static) -> Self {
        Self {
            artifact: artifact.into(),
            verifier: std::sync::Arc::new(verifier),
        }
    }

    pub fn run(&self) -> Result<()> {
        self.verifier.verify(&self.artifact)
    }
}

impl std::fmt::Debug for IntegrityCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityCheck")
            .field("artifact", &self.artifact)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    // sha256("abc")
    const ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn artifact() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        file
    }

    #[test]
    fn hashes_file_contents() {
        let file = artifact();
        assert_eq!(sha256_file(file.path()).unwrap(), ABC);
    }

    #[test]
    fn log_digest_tolerates_missing_artifact() {
        assert!(LogDigest.verify(Path::new("/nonexistent/plugin.so")).is_ok());
    }

    #[test]
    fn manifest_digest_accepts_match_in_any_case() {
        let file = artifact();
        let check = IntegrityCheck::new(file.path(), ManifestDigest::new(ABC.to_uppercase()));
        assert!(check.run().is_ok());
    }

    #[test]
    fn manifest_digest_rejects_mismatch() {
        let file = artifact();
        let err = ManifestDigest::new("00").verify(file.path()).unwrap_err();
        assert!(matches!(err, Error::Integrity { ref actual, .. } if actual == ABC));
    }

    #[test]
    fn manifest_digest_rejects_missing_artifact() {
        assert!(matches!(
            ManifestDigest::new(ABC).verify(Path::new("/nonexistent/plugin.so")),
            Err(Error::Io(_))
        ));
    }
}
