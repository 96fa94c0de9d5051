//! Elementary-stream reader
//!
//! Lazily splits an Annex-B H.264 byte stream into NAL units. The reader is
//! a one-pass sequence: once it reports end of stream it keeps returning
//! `None`, and there is no way to rewind it.

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use super::h264::NalUnit;

/// Default upper bound for a single NAL unit
pub const DEFAULT_MAX_NAL_SIZE: usize = 4 * 1024 * 1024;

/// Default number of bytes requested per read
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Malformed or unreadable stream
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("data is not an Annex-B H.264 stream")]
    NotAnnexB,

    #[error("NAL unit larger than {limit} bytes")]
    NalTooLarge { limit: usize },

    #[error("NAL unit with forbidden_zero_bit set")]
    ForbiddenBit,
}

/// Annex-B NAL unit reader over any async byte source
pub struct ElementaryStreamReader<R> {
    inner: R,
    buf: BytesMut,
    /// Bytes of `buf` already searched for the next start code
    scanned: usize,
    /// First start code seen
    synced: bool,
    eof: bool,
    done: bool,
    max_nal_size: usize,
    chunk_size: usize,
    nal_count: u64,
}

impl<R: AsyncRead + Unpin> ElementaryStreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_limits(inner, DEFAULT_MAX_NAL_SIZE, DEFAULT_READ_CHUNK_SIZE)
    }

    pub fn with_limits(inner: R, max_nal_size: usize, chunk_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(chunk_size),
            scanned: 0,
            synced: false,
            eof: false,
            done: false,
            max_nal_size: max_nal_size.max(1),
            chunk_size: chunk_size.max(1),
            nal_count: 0,
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Number of NAL units returned so far
    pub fn nal_count(&self) -> u64 {
        self.nal_count
    }

    /// Read the next NAL unit
    ///
    /// Returns `Ok(None)` at end of stream. Empty NAL units (two adjacent
    /// start codes) are skipped.
    pub async fn next_nal(&mut self) -> Result<Option<NalUnit>, StreamError> {
        loop {
            if self.done {
                return Ok(None);
            }

            if !self.synced {
                if let Some(pos) = find_start_code(&self.buf, 0) {
                    if self.buf[..pos].iter().any(|b| *b != 0) {
                        return Err(StreamError::NotAnnexB);
                    }
                    self.buf.advance(pos + 3);
                    self.synced = true;
                    self.scanned = 0;
                    continue;
                }

                if self.buf.iter().any(|b| *b != 0) {
                    return Err(StreamError::NotAnnexB);
                }
                if self.eof {
                    self.done = true;
                    return Ok(None);
                }

                // Only zero padding so far; keep the tail in case it opens a start code
                let drop_len = self.buf.len().saturating_sub(2);
                self.buf.advance(drop_len);
                self.fill().await?;
                continue;
            }

            if let Some(pos) = find_start_code(&self.buf, self.scanned) {
                let data = self.buf.split_to(pos);
                self.buf.advance(3);
                self.scanned = 0;
                if let Some(nal) = self.finish_nal(data)? {
                    return Ok(Some(nal));
                }
                continue;
            }
            self.scanned = self.buf.len().saturating_sub(2);

            if self.buf.len() > self.max_nal_size {
                return Err(StreamError::NalTooLarge {
                    limit: self.max_nal_size,
                });
            }

            if self.eof {
                self.done = true;
                let rest = self.buf.split();
                return self.finish_nal(rest);
            }

            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<(), StreamError> {
        self.buf.reserve(self.chunk_size);
        let n = self.inner.read_buf(&mut self.buf).await?;
        if n == 0 {
            self.eof = true;
        }
        Ok(())
    }

    fn finish_nal(&mut self, mut data: BytesMut) -> Result<Option<NalUnit>, StreamError> {
        // Trailing zeros belong to a 4-byte start code or trailing_zero_8bits
        let end = data.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        data.truncate(end);

        if data.is_empty() {
            return Ok(None);
        }
        if data.len() > self.max_nal_size {
            return Err(StreamError::NalTooLarge {
                limit: self.max_nal_size,
            });
        }
        if data[0] & 0x80 != 0 {
            return Err(StreamError::ForbiddenBit);
        }

        self.nal_count += 1;
        let nal = NalUnit::new(data.freeze());
        if let Some(ref nal) = nal {
            trace!("NAL #{}: {} ({} bytes)", self.nal_count, nal.unit_type, nal.len());
        }
        Ok(nal)
    }
}

/// Find the next `00 00 01` sequence at or after `from`
fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 3 <= data.len() {
        // No start code can begin at i, i+1 or i+2 when this byte is > 1
        if data[i + 2] > 1 {
            i += 3;
            continue;
        }
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            return Some(i);
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::h264::NalUnitType;
    use std::io::Cursor;

    async fn collect<R: AsyncRead + Unpin>(
        reader: &mut ElementaryStreamReader<R>,
    ) -> Result<Vec<NalUnit>, StreamError> {
        let mut nals = Vec::new();
        while let Some(nal) = reader.next_nal().await? {
            nals.push(nal);
        }
        Ok(nals)
    }

    #[test]
    fn test_find_start_code() {
        assert_eq!(find_start_code(&[0, 0, 1], 0), Some(0));
        assert_eq!(find_start_code(&[0, 0, 0, 1], 0), Some(1));
        assert_eq!(find_start_code(&[0x67, 0x42, 0, 0, 1, 0x68], 0), Some(2));
        assert_eq!(find_start_code(&[0x67, 0x42, 0, 0, 3, 0x01], 0), None);
        assert_eq!(find_start_code(&[0, 0, 1, 0x67, 0, 0, 1], 1), Some(4));
        assert_eq!(find_start_code(&[0, 0], 0), None);
    }

    #[tokio::test]
    async fn test_mixed_start_codes() {
        let data: Vec<u8> = vec![
            0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1f, // SPS, 4-byte start code
            0, 0, 1, 0x68, 0xce, 0x3c, 0x80, // PPS, 3-byte start code
            0, 0, 0, 1, 0x65, 0x88, 0x84, // IDR
            0, 0, 1, 0x41, 0x9a, // P slice
        ];
        let mut reader = ElementaryStreamReader::new(Cursor::new(data));
        let nals = collect(&mut reader).await.unwrap();

        let types: Vec<_> = nals.iter().map(|n| n.unit_type).collect();
        assert_eq!(
            types,
            vec![
                NalUnitType::Sps,
                NalUnitType::Pps,
                NalUnitType::CodedSliceIdr,
                NalUnitType::CodedSliceNonIdr
            ]
        );
        assert_eq!(&nals[0].data[..], &[0x67, 0x42, 0x00, 0x1f]);
        assert_eq!(&nals[1].data[..], &[0x68, 0xce, 0x3c, 0x80]);
        assert_eq!(&nals[3].data[..], &[0x41, 0x9a]);
        assert_eq!(reader.nal_count(), 4);
    }

    #[tokio::test]
    async fn test_start_code_split_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(&[0, 0])
            .read(&[0, 1, 0x67, 0xAA, 0])
            .read(&[0])
            .read(&[1, 0x65, 0xBB])
            .read(&[0xCC, 0, 0])
            .read(&[1, 0x41])
            .build();
        let mut reader = ElementaryStreamReader::with_limits(mock, 1024, 4);
        let nals = collect(&mut reader).await.unwrap();

        assert_eq!(nals.len(), 3);
        assert_eq!(&nals[0].data[..], &[0x67, 0xAA]);
        assert_eq!(&nals[1].data[..], &[0x65, 0xBB, 0xCC]);
        assert_eq!(&nals[2].data[..], &[0x41]);
    }

    #[tokio::test]
    async fn test_end_of_stream_is_sticky() {
        let mut reader = ElementaryStreamReader::new(Cursor::new(vec![0, 0, 1, 0x65, 0x01]));
        assert!(reader.next_nal().await.unwrap().is_some());
        assert!(reader.next_nal().await.unwrap().is_none());
        assert!(reader.next_nal().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let mut reader = ElementaryStreamReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(reader.next_nal().await.unwrap().is_none());

        let mut zeros = ElementaryStreamReader::new(Cursor::new(vec![0u8; 16]));
        assert!(zeros.next_nal().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_nal_units_skipped() {
        let data = vec![0, 0, 1, 0, 0, 1, 0x41, 0x01, 0, 0, 0, 1, 0, 0, 0];
        let mut reader = ElementaryStreamReader::new(Cursor::new(data));
        let nals = collect(&mut reader).await.unwrap();
        assert_eq!(nals.len(), 1);
        assert_eq!(&nals[0].data[..], &[0x41, 0x01]);
    }

    #[tokio::test]
    async fn test_not_annexb() {
        let mut reader = ElementaryStreamReader::new(Cursor::new(b"ftypisom".to_vec()));
        assert!(matches!(
            reader.next_nal().await,
            Err(StreamError::NotAnnexB)
        ));

        let mut reader =
            ElementaryStreamReader::new(Cursor::new(vec![0x12, 0, 0, 1, 0x65, 0x01]));
        assert!(matches!(
            reader.next_nal().await,
            Err(StreamError::NotAnnexB)
        ));
    }

    #[tokio::test]
    async fn test_nal_too_large() {
        let mut data = vec![0, 0, 1, 0x65];
        data.extend(std::iter::repeat(0xAB).take(64));
        let mut reader = ElementaryStreamReader::with_limits(Cursor::new(data), 16, 8);
        assert!(matches!(
            reader.next_nal().await,
            Err(StreamError::NalTooLarge { limit: 16 })
        ));
    }

    #[tokio::test]
    async fn test_forbidden_bit() {
        let mut reader = ElementaryStreamReader::new(Cursor::new(vec![0, 0, 1, 0xE5, 0x01]));
        assert!(matches!(
            reader.next_nal().await,
            Err(StreamError::ForbiddenBit)
        ));
    }
}
