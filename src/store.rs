use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

/// Opaque byte store for serialized template documents, keyed by island
/// name. The core only produces and consumes the byte sequence.
pub trait TemplateStore: Send + Sync {
    fn put(&self, name: &str, bytes: &[u8]) -> io::Result<()>;
    fn get(&self, name: &str) -> io::Result<Vec<u8>>;
}

pub const TEMPLATE_FILE_EXTENSION: &str = "json";

/// Directory-backed store: one `<name>.json` file per island. Writes land
/// in a temp file first and are renamed into place so a crash mid-write
/// cannot truncate an existing template.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(DirStore { root })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, TEMPLATE_FILE_EXTENSION))
    }
}

impl TemplateStore for DirStore {
    fn put(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path(name);
        let temp = path.with_extension("tmp");
        std::fs::write(&temp, bytes)?;
        std::fs::rename(&temp, &path)?;
        tracing::debug!("Wrote template \"{}\" ({} bytes)", name, bytes.len());
        Ok(())
    }

    fn get(&self, name: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.path(name))
    }
}

/// In-memory store, used by tests and anything else that does not want a
/// filesystem.
#[derive(Default)]
pub struct MemStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl TemplateStore for MemStore {
    fn put(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let mut entries = self.entries.lock().map_err(|_| io::Error::other("store poisoned"))?;
        entries.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, name: &str) -> io::Result<Vec<u8>> {
        let entries = self.entries.lock().map_err(|_| io::Error::other("store poisoned"))?;
        entries
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }
}
