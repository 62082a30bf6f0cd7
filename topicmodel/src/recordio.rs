//Copyright 2024 Felix Engl
//
//Licensed under the Apache License, Version 2.0 (the "License");
//you may not use this file except in compliance with the License.
//You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
//Unless required by applicable law or agreed to in writing, software
//distributed under the License is distributed on an "AS IS" BASIS,
//WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//See the License for the specific language governing permissions and
//limitations under the License.

//! Length-prefixed binary record framing.
//!
//! Each record is a big-endian u32 byte length followed by that many bytes.
//! Ported from `common/recordio.py` in the original SparseLDA implementation.

use std::io::{Read, Write};
use thiserror::Error;

/// Maximum record size. Writers refuse larger records; readers log and
/// continue reading subsequent records.
pub const MAX_RECORD_BYTES: u32 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum RecordIoError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record of {0} bytes exceeds the {MAX_RECORD_BYTES} byte sanity limit")]
    RecordTooLarge(u32),
    #[error("expected {expected} bytes of record payload, got {got}")]
    Truncated { expected: u32, got: usize },
}

/// Writes length-prefixed records to an underlying writer.
pub struct RecordWriter<W> {
    inner: W,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Appends `blob` as a single record. Returns an error without writing
    /// anything if `blob` exceeds [`MAX_RECORD_BYTES`].
    pub fn write(&mut self, blob: &[u8]) -> Result<(), RecordIoError> {
        let len: u32 = blob
            .len()
            .try_into()
            .map_err(|_| RecordIoError::RecordTooLarge(u32::MAX))?;
        if len > MAX_RECORD_BYTES {
            return Err(RecordIoError::RecordTooLarge(len));
        }
        self.inner.write_all(&len.to_be_bytes())?;
        self.inner.write_all(blob)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads length-prefixed records from an underlying reader.
pub struct RecordReader<R> {
    inner: R,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next record, or `Ok(None)` at a clean end-of-stream (a
    /// zero-length read at a record boundary).
    pub fn read(&mut self) -> Result<Option<Vec<u8>>, RecordIoError> {
        let mut len_buf = [0u8; 4];
        match read_exact_or_eof(&mut self.inner, &mut len_buf)? {
            0 => return Ok(None),
            n if n < 4 => {
                return Err(RecordIoError::Truncated {
                    expected: 4,
                    got: n,
                })
            }
            _ => {}
        }
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_RECORD_BYTES {
            log::error!("record size {len} exceeds sanity limit, skipping");
        }
        let mut blob = vec![0u8; len as usize];
        self.inner.read_exact(&mut blob).map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                RecordIoError::Truncated {
                    expected: len,
                    got: 0,
                }
            } else {
                RecordIoError::Io(err)
            }
        })?;
        Ok(Some(blob))
    }
}

/// Like `read_exact`, but tolerates reading zero bytes at a clean boundary
/// instead of treating it as an `UnexpectedEof`.
fn read_exact_or_eof(mut r: impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match r.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_records() {
        let mut buf = Vec::new();
        {
            let mut writer = RecordWriter::new(&mut buf);
            writer.write(b"hello").unwrap();
            writer.write(b"world!!").unwrap();
        }
        let mut reader = RecordReader::new(buf.as_slice());
        assert_eq!(reader.read().unwrap().as_deref(), Some(&b"hello"[..]));
        assert_eq!(reader.read().unwrap().as_deref(), Some(&b"world!!"[..]));
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn empty_stream_is_clean_eof() {
        let mut reader = RecordReader::new(&b""[..]);
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn refuses_oversized_record() {
        let mut buf = Vec::new();
        let mut writer = RecordWriter::new(&mut buf);
        let big = vec![0u8; MAX_RECORD_BYTES as usize + 1];
        assert!(matches!(
            writer.write(&big),
            Err(RecordIoError::RecordTooLarge(_))
        ));
    }

    #[test]
    fn truncated_stream_errors() {
        let mut buf = Vec::new();
        {
            let mut writer = RecordWriter::new(&mut buf);
            writer.write(b"hello").unwrap();
        }
        buf.truncate(buf.len() - 2);
        let mut reader = RecordReader::new(buf.as_slice());
        assert!(matches!(reader.read(), Err(RecordIoError::Truncated { .. })));
    }
}
