mod local;

pub use local::LocalFileReader;

use async_trait::async_trait;

/// Random access reads over an archive held somewhere addressable by offset.
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Fill `buf` completely with the bytes starting at `offset`.
    ///
    /// Fails with `UnexpectedEof` if the source ends before `buf` is full.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

#[async_trait]
impl ReadAt for Vec<u8> {
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = start.saturating_add(buf.len());
        match self.get(start..end) {
            Some(bytes) => {
                buf.copy_from_slice(bytes);
                Ok(())
            }
            None => Err(std::io::ErrorKind::UnexpectedEof.into()),
        }
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}
