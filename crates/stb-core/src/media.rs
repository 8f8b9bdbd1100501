use std::path::{Path, PathBuf};

use crate::{domain::AttachmentKind, Result};

/// Best-effort local copies of ticket attachments, grouped per ticket.
///
/// A failed save degrades to the transport-side reference only; relay and
/// history recording never block on this store.
#[derive(Clone, Debug)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes attachment bytes as
    /// `<root>/<ticket_id>/<ticket_id>_<seq>.<ext>` and returns the path.
    pub fn save(
        &self,
        ticket_id: &str,
        seq: usize,
        kind: AttachmentKind,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let dir = self.root.join(ticket_id);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{ticket_id}_{seq}.{}", kind.extension()));
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_under_ticket_dir_with_kind_extension() {
        let root = PathBuf::from(format!(
            "/tmp/stb-media-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        let store = MediaStore::new(&root);

        let path = store
            .save("ab12cd34", 2, AttachmentKind::Photo, b"jpegbytes")
            .unwrap();
        assert!(path.ends_with("ab12cd34/ab12cd34_2.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"jpegbytes");

        let _ = std::fs::remove_dir_all(&root);
    }
}
