//! File-backed diagnostic sink.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use nodes::{DiagnosticSink, Screenshot};

/// Writes frames as binary PPM files into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DiagnosticSink for DirectorySink {
    fn save_screenshot(&self, image: &Screenshot, prefix: &str) -> anyhow::Result<PathBuf> {
        let expected = image.width as usize * image.height as usize * 3;
        ensure!(
            image.rgb.len() == expected,
            "frame is {}x{} but carries {} bytes",
            image.width,
            image.height,
            image.rgb.len()
        );

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create {}", self.dir.display()))?;

        // Same prefix in the same millisecond is common when a node keeps raising.
        let tag = Uuid::new_v4().simple().to_string();
        let name = format!(
            "{}_{}_{}.ppm",
            sanitize(prefix),
            Utc::now().format("%Y%m%d_%H%M%S_%3f"),
            &tag[..8]
        );
        let path = self.dir.join(name);

        let mut bytes = format!("P6\n{} {}\n255\n", image.width, image.height).into_bytes();
        bytes.extend_from_slice(&image.rgb);
        fs::write(&path, bytes).with_context(|| format!("cannot write {}", path.display()))?;

        debug!("wrote {}", path.display());
        Ok(path)
    }
}

fn sanitize(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_ppm_named_after_the_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = DirectorySink::new(dir.path().join("shots"));

        let path = sink
            .save_screenshot(&Screenshot::blank(2, 1), "daily run/claim")
            .expect("saved");

        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("daily_run_claim_"), "{name}");
        assert!(name.ends_with(".ppm"));
        let bytes = fs::read(&path).expect("readable");
        assert_eq!(&bytes[..11], b"P6\n2 1\n255\n");
        assert_eq!(bytes.len(), 11 + 6);
    }

    #[test]
    fn rejects_frames_with_inconsistent_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = DirectorySink::new(dir.path());
        let frame = Screenshot::new(4, 4, vec![0; 3]);
        assert!(sink.save_screenshot(&frame, "bad").is_err());
    }
}
