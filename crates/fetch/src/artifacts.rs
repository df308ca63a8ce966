use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Content-addressed artifact tree. Filenames are `<sha256>.<ext>`, so a
/// write is idempotent; crash safety comes from temp -> fsync -> rename.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self, dir: &str, hash: &str, ext: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let dir_path = self.root.join(dir);
        fs::create_dir_all(&dir_path)?;

        let final_path = dir_path.join(format!("{hash}.{ext}"));
        if final_path.exists() {
            return Ok(final_path);
        }

        let tmp_path = dir_path.join(format!(".{hash}.{ext}.tmp"));
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &final_path)?;
        Ok(final_path)
    }
}
