//! Append-only log backend.
//!
//! The durable engine: every batch is one frame appended to a single log
//! file and fsynced before it is applied to the in-memory map, so a batch
//! is visible after a crash exactly when it is complete on disk. Frames
//! carry a CRC32 over their payload; replay on open rebuilds the map and
//! truncates a torn final frame, while a bad checksum anywhere earlier is
//! reported as corruption rather than silently skipped.
//!
//! Frame layout, all integers little-endian:
//!
//! ```text
//! +--------------+--------------+---------------------------+
//! | len: u32     | crc32: u32   | payload (len bytes)       |
//! +--------------+--------------+---------------------------+
//! payload = ops; op = tag:u8 (1=put 2=delete), klen:u32, key
//!           [, vlen:u32, value  (put only)]
//! ```
//
// TODO: compact the log once /PNODE rewrites dominate the file.

use crate::error::{Error, Result};
use crate::store::{Backend, BatchOp};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Name of the log file inside the ring's location directory.
pub const LOG_FILE: &str = "ring.log";

const TAG_PUT: u8 = 1;
const TAG_DELETE: u8 = 2;

/// Durable backend over one append-only log file.
pub struct LogBackend {
    inner: Mutex<Option<LogInner>>,
}

struct LogInner {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    file: File,
}

impl LogBackend {
    /// Opens (or creates) the log under `location` and replays it.
    pub fn open(location: &Path) -> Result<Self> {
        fs::create_dir_all(location)?;
        let path = location.join(LOG_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let (map, valid_len) = replay(&bytes)?;
        if valid_len < bytes.len() {
            warn!(
                path = %path.display(),
                dropped = bytes.len() - valid_len,
                "truncating torn tail of ring log"
            );
            file.set_len(valid_len as u64)?;
        }
        file.seek(SeekFrom::End(0))?;
        debug!(path = %path.display(), keys = map.len(), "ring log replayed");
        Ok(LogBackend {
            inner: Mutex::new(Some(LogInner { map, file })),
        })
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut LogInner) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(inner) => f(inner),
            None => Err(Error::Store("backend is closed".to_string())),
        }
    }
}

impl Backend for LogBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with_inner(|inner| Ok(inner.map.get(key).cloned()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.batch(vec![BatchOp::put(key.to_vec(), value.to_vec())])
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.batch(vec![BatchOp::delete(key.to_vec())])
    }

    fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        self.with_inner(|inner| {
            let frame = encode_frame(&ops);
            inner.file.write_all(&frame)?;
            inner.file.sync_data()?;
            // Only a fully durable frame reaches the map.
            for op in ops {
                match op {
                    BatchOp::Put { key, value } => {
                        inner.map.insert(key, value);
                    }
                    BatchOp::Delete { key } => {
                        inner.map.remove(&key);
                    }
                }
            }
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(inner) = guard.as_mut() {
            inner.file.sync_data()?;
        }
        *guard = None;
        Ok(())
    }
}

fn encode_frame(ops: &[BatchOp]) -> Vec<u8> {
    let mut payload = Vec::new();
    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                payload.push(TAG_PUT);
                payload.extend_from_slice(&(key.len() as u32).to_le_bytes());
                payload.extend_from_slice(key);
                payload.extend_from_slice(&(value.len() as u32).to_le_bytes());
                payload.extend_from_slice(value);
            }
            BatchOp::Delete { key } => {
                payload.push(TAG_DELETE);
                payload.extend_from_slice(&(key.len() as u32).to_le_bytes());
                payload.extend_from_slice(key);
            }
        }
    }
    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame
}

/// Replays `bytes` into a map, returning the length of the valid prefix.
///
/// A frame that runs past the end of the file, or whose checksum fails at
/// the very end, is a torn write and bounds the valid prefix. A checksum
/// failure with more data behind it means the middle of the log is bad.
fn replay(bytes: &[u8]) -> Result<(BTreeMap<Vec<u8>, Vec<u8>>, usize)> {
    let mut map = BTreeMap::new();
    let mut offset = 0usize;
    while offset < bytes.len() {
        if bytes.len() - offset < 8 {
            break;
        }
        let len = read_u32(&bytes[offset..]) as usize;
        let crc = read_u32(&bytes[offset + 4..]);
        if bytes.len() - offset - 8 < len {
            break;
        }
        let payload = &bytes[offset + 8..offset + 8 + len];
        if crc32fast::hash(payload) != crc {
            if offset + 8 + len == bytes.len() {
                break;
            }
            return Err(Error::Store(format!(
                "corrupt ring log frame at offset {}",
                offset
            )));
        }
        apply_payload(&mut map, payload, offset)?;
        offset += 8 + len;
    }
    Ok((map, offset))
}

fn apply_payload(
    map: &mut BTreeMap<Vec<u8>, Vec<u8>>,
    payload: &[u8],
    frame_offset: usize,
) -> Result<()> {
    let corrupt = || {
        Error::Store(format!(
            "corrupt ring log record in frame at offset {}",
            frame_offset
        ))
    };
    let mut at = 0usize;
    while at < payload.len() {
        let tag = payload[at];
        at += 1;
        let key = take(payload, &mut at).ok_or_else(corrupt)?;
        match tag {
            TAG_PUT => {
                let value = take(payload, &mut at).ok_or_else(corrupt)?;
                map.insert(key.to_vec(), value.to_vec());
            }
            TAG_DELETE => {
                map.remove(key);
            }
            _ => return Err(corrupt()),
        }
    }
    Ok(())
}

/// Reads a length-prefixed field, advancing `at`.
fn take<'a>(payload: &'a [u8], at: &mut usize) -> Option<&'a [u8]> {
    if payload.len() - *at < 4 {
        return None;
    }
    let len = read_u32(&payload[*at..]) as usize;
    *at += 4;
    if payload.len() - *at < len {
        return None;
    }
    let field = &payload[*at..*at + len];
    *at += len;
    Some(field)
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
