use super::{BackingStore, ReadAt};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory backing store.
///
/// Clones share the same buffer, so one clone can be handed to a write
/// session and another used to read the finished archive back.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing archive bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes)),
        }
    }

    /// Copy of the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BackingStore for MemoryStore {
    /// Read sessions see a snapshot taken at open time.
    fn open_read(&self) -> io::Result<Box<dyn ReadAt>> {
        Ok(Box::new(self.to_vec()))
    }

    fn open_write(&self) -> io::Result<Box<dyn Write + Send>> {
        self.lock().clear();
        Ok(Box::new(MemoryWriter {
            data: Arc::clone(&self.data),
        }))
    }
}

/// Appending writer handed out by [`MemoryStore::open_write`].
pub struct MemoryWriter {
    data: Arc<Mutex<Vec<u8>>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_write_truncates_shared_buffer() {
        let store = MemoryStore::from_bytes(b"stale".to_vec());
        let reader_side = store.clone();

        let mut writer = store.open_write().unwrap();
        writer.write_all(b"new").unwrap();

        assert_eq!(reader_side.to_vec(), b"new");
        let reader = reader_side.open_read().unwrap();
        assert_eq!(reader.size(), 3);
    }
}
