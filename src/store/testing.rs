//! Store doubles shared by limiter tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{BucketStore, MemoryStore, StoreError};

/// A [`MemoryStore`] that counts calls and can be switched off.
#[derive(Debug, Default)]
pub struct InstrumentedStore {
    pub inner: MemoryStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
    down: AtomicBool,
    writes_down: AtomicBool,
    short_reads: AtomicBool,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// While down, every call fails as unreachable.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// While set, reads succeed and writes fail as unreachable.
    pub fn set_writes_down(&self, down: bool) {
        self.writes_down.store(down, Ordering::SeqCst);
    }

    /// While set, reads return one slot fewer than the fields requested.
    pub fn set_short_reads(&self, short: bool) {
        self.short_reads.store(short, Ordering::SeqCst);
    }

    fn check_up(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BucketStore for InstrumentedStore {
    async fn get_fields(
        &self,
        key: &str,
        fields: &[&str],
    ) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;
        let mut values = self.inner.get_fields(key, fields).await?;
        if self.short_reads.load(Ordering::SeqCst) {
            values.pop();
        }
        Ok(values)
    }

    async fn set_fields(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;
        if self.writes_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset by peer".to_string()));
        }
        self.inner.set_fields(key, fields).await
    }
}
