//! Shared-memory ring transport.
//!
//! Two fixed-size circular byte regions live in one memory-mapped file. The
//! launcher writes into the first region and reads the second; the worker does
//! the opposite. No socket is involved, so this works where loopback
//! networking is unavailable.
//!
//! Region layout (4096 bytes each):
//! ```text
//! ┌────────────────────┬─────────────────────────┬──────────────────────┐
//! │ Writer index (4B)  │ Reader index of the     │ Data ring (4088B)    │
//! │ of this region     │ *other* region (4B)     │                      │
//! └────────────────────┴─────────────────────────┴──────────────────────┘
//! ```
//!
//! Every index is stored as `[hi, lo, hi^lo^0x5A, hi^lo^0xA5]` so a reader can
//! detect a torn update from the other process.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{fence, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, TransportError};

/// Size of one direction's region.
pub const REGION_SIZE: usize = 1 << 12;
/// Total size of the mapped ring file.
pub const RING_FILE_SIZE: usize = 2 * REGION_SIZE;
/// Bytes of payload a region can hold at once (one slot stays free).
pub const DATA_CAPACITY: usize = REGION_SIZE - HEADER_SIZE;

const HEADER_SIZE: usize = 8;
const WRITER_INDEX: usize = 0;
const READER_INDEX: usize = 4;
const CHECK_A: u8 = 0x5A;
const CHECK_B: u8 = 0xA5;
const INDEX_READ_ATTEMPTS: u64 = 4;
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Which end of the ring file this stream is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingSide {
    /// Writes the first region, reads the second.
    Launcher,
    /// Writes the second region, reads the first.
    Worker,
}

impl RingSide {
    fn own_region(self) -> usize {
        match self {
            RingSide::Launcher => 0,
            RingSide::Worker => REGION_SIZE,
        }
    }

    fn peer_region(self) -> usize {
        match self {
            RingSide::Launcher => REGION_SIZE,
            RingSide::Worker => 0,
        }
    }
}

/// Encode a ring index with its two checksum bytes.
pub fn encode_index(index: u16) -> [u8; 4] {
    let [hi, lo] = index.to_be_bytes();
    [hi, lo, hi ^ lo ^ CHECK_A, hi ^ lo ^ CHECK_B]
}

/// Decode a ring index, returning `None` when the checksum or range is wrong.
pub fn decode_index(bytes: [u8; 4]) -> Option<usize> {
    let [hi, lo, check_a, check_b] = bytes;
    if check_a != hi ^ lo ^ CHECK_A || check_b != hi ^ lo ^ CHECK_B {
        return None;
    }
    let index = usize::from(u16::from_be_bytes([hi, lo]));
    (index < DATA_CAPACITY).then_some(index)
}

struct Mapping {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: the mapping is plain shared memory; every access goes through
// `AtomicU8` cells, so concurrent use from several threads is sound.
unsafe impl Send for Mapping {}
// SAFETY: see `Send` above.
unsafe impl Sync for Mapping {}

impl Mapping {
    fn map(file: &File, path: &Path) -> Result<Self> {
        // SAFETY: `file` is open read/write and at least `RING_FILE_SIZE` bytes
        // long; a null hint lets the kernel pick the address.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                RING_FILE_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(TransportError::Map {
                path: path.to_path_buf(),
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(Self {
            ptr: ptr.cast::<u8>(),
            len: RING_FILE_SIZE,
        })
    }

    fn cell(&self, offset: usize) -> &AtomicU8 {
        assert!(offset < self.len, "ring offset {offset} out of bounds");
        // SAFETY: `offset` is within the live mapping and `AtomicU8` has the
        // same size and alignment as `u8`.
        unsafe { &*(self.ptr.add(offset) as *const AtomicU8) }
    }

    fn load(&self, offset: usize) -> u8 {
        self.cell(offset).load(Ordering::Relaxed)
    }

    fn store(&self, offset: usize, value: u8) {
        self.cell(offset).store(value, Ordering::Relaxed);
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` came from a successful `mmap` and no references
        // into the mapping outlive `self`.
        let rc = unsafe { libc::munmap(self.ptr.cast::<libc::c_void>(), self.len) };
        if rc != 0 {
            warn!(error = %std::io::Error::last_os_error(), "munmap failed");
        }
    }
}

/// One end of a memory-mapped ring file. Implements blocking Read + Write.
///
/// Clones share the mapping, so one clone can read while another writes.
#[derive(Clone)]
pub struct RingStream {
    map: Arc<Mapping>,
    side: RingSide,
    path: Arc<PathBuf>,
}

impl RingStream {
    /// Create (or reset) a ring file and attach as the launcher.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| map_error(path, source))?;
        file.set_len(RING_FILE_SIZE as u64)
            .map_err(|source| map_error(path, source))?;

        let stream = Self::attach(&file, path, RingSide::Launcher)?;
        for region in [0, REGION_SIZE] {
            stream.write_index(region + WRITER_INDEX, 0);
            stream.write_index(region + READER_INDEX, 0);
        }
        debug!(?path, "created ring file");
        Ok(stream)
    }

    /// Attach to an existing ring file as the worker.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| map_error(path, source))?;
        let len = file
            .metadata()
            .map_err(|source| map_error(path, source))?
            .len();
        if len != RING_FILE_SIZE as u64 {
            return Err(TransportError::RingSize {
                path: path.to_path_buf(),
                len,
                expected: RING_FILE_SIZE as u64,
            });
        }

        let stream = Self::attach(&file, path, RingSide::Worker)?;
        debug!(?path, "opened ring file");
        Ok(stream)
    }

    fn attach(file: &File, path: &Path, side: RingSide) -> Result<Self> {
        Ok(Self {
            map: Arc::new(Mapping::map(file, path)?),
            side,
            path: Arc::new(path.to_path_buf()),
        })
    }

    /// Which end of the ring this stream is.
    pub fn side(&self) -> RingSide {
        self.side
    }

    /// Path of the backing ring file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_index(&self, offset: usize) -> Result<usize> {
        let mut attempt = 0;
        loop {
            let bytes = [
                self.map.load(offset),
                self.map.load(offset + 1),
                self.map.load(offset + 2),
                self.map.load(offset + 3),
            ];
            if let Some(index) = decode_index(bytes) {
                fence(Ordering::Acquire);
                return Ok(index);
            }

            attempt += 1;
            if attempt >= INDEX_READ_ATTEMPTS {
                return Err(TransportError::Corrupted { offset, bytes });
            }
            std::thread::sleep(Duration::from_millis(attempt * attempt));
        }
    }

    fn write_index(&self, offset: usize, index: usize) {
        let [hi, lo, check_a, check_b] = encode_index(index as u16);

        // Break the current checksum before touching the value bytes.
        let stale = self.map.load(offset) ^ self.map.load(offset + 1) ^ CHECK_B;
        self.map.store(offset + 3, !stale);

        fence(Ordering::Release);
        self.map.store(offset, hi);
        self.map.store(offset + 1, lo);
        self.map.store(offset + 2, check_a);
        fence(Ordering::Release);
        self.map.store(offset + 3, check_b);
    }

    /// Copy as much of `buf` as fits into the outgoing region without waiting.
    fn try_write(&self, buf: &[u8]) -> Result<usize> {
        let own = self.side.own_region();
        let peer = self.side.peer_region();

        let write = self.read_index(own + WRITER_INDEX)?;
        let read = self.read_index(peer + READER_INDEX)?;
        let free = (read + DATA_CAPACITY - write - 1) % DATA_CAPACITY;
        let n = free.min(buf.len());
        if n == 0 {
            return Ok(0);
        }

        let data = own + HEADER_SIZE;
        for (i, byte) in buf[..n].iter().enumerate() {
            self.map.store(data + (write + i) % DATA_CAPACITY, *byte);
        }
        self.write_index(own + WRITER_INDEX, (write + n) % DATA_CAPACITY);
        Ok(n)
    }

    /// Copy whatever is available from the incoming region without waiting.
    fn try_read(&self, buf: &mut [u8]) -> Result<usize> {
        let own = self.side.own_region();
        let peer = self.side.peer_region();

        let write = self.read_index(peer + WRITER_INDEX)?;
        let read = self.read_index(own + READER_INDEX)?;
        let available = (write + DATA_CAPACITY - read) % DATA_CAPACITY;
        let n = available.min(buf.len());
        if n == 0 {
            return Ok(0);
        }

        let data = peer + HEADER_SIZE;
        for (i, slot) in buf[..n].iter_mut().enumerate() {
            *slot = self.map.load(data + (read + i) % DATA_CAPACITY);
        }
        self.write_index(own + READER_INDEX, (read + n) % DATA_CAPACITY);
        Ok(n)
    }
}

impl Read for RingStream {
    /// Blocks until at least one byte is available.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.try_read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Write for RingStream {
    /// Blocks until at least one byte of space is free.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.try_write(buf)?;
            if n > 0 {
                return Ok(n);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn map_error(path: &Path, source: std::io::Error) -> TransportError {
    TransportError::Map {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::*;

    fn ring_path(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "forkwire-ring-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("medium.ring")
    }

    fn cleanup(path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn index_checksum_roundtrip_and_rejects_torn_bytes() {
        let encoded = encode_index(0x0123);
        assert_eq!(encoded, [0x01, 0x23, 0x01 ^ 0x23 ^ 0x5A, 0x01 ^ 0x23 ^ 0xA5]);
        assert_eq!(decode_index(encoded), Some(0x0123));

        let mut torn = encoded;
        torn[1] = 0x24;
        assert_eq!(decode_index(torn), None);

        // All-zero bytes are not a valid encoding of index 0.
        assert_eq!(decode_index([0, 0, 0, 0]), None);
        assert_eq!(decode_index(encode_index(DATA_CAPACITY as u16)), None);
    }

    #[test]
    fn launcher_to_worker_and_back() {
        let path = ring_path("duplex");
        let mut launcher = RingStream::create(&path).unwrap();
        let mut worker = RingStream::open(&path).unwrap();
        assert_eq!(launcher.side(), RingSide::Launcher);
        assert_eq!(worker.side(), RingSide::Worker);

        launcher.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        worker.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        worker.write_all(b"pong").unwrap();
        launcher.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");

        cleanup(&path);
    }

    #[test]
    fn full_region_accepts_capacity_minus_one() {
        let path = ring_path("full");
        let launcher = RingStream::create(&path).unwrap();

        let payload = vec![0x42; DATA_CAPACITY * 2];
        let written = launcher.try_write(&payload).unwrap();
        assert_eq!(written, DATA_CAPACITY - 1);
        assert_eq!(launcher.try_write(&payload).unwrap(), 0);

        cleanup(&path);
    }

    #[test]
    fn streams_more_than_capacity_across_threads() {
        let path = ring_path("wrap");
        let mut launcher = RingStream::create(&path).unwrap();
        let mut worker = RingStream::open(&path).unwrap();

        let payload: Vec<u8> = (0..5 * DATA_CAPACITY).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        let writer = std::thread::spawn(move || {
            launcher.write_all(&payload).unwrap();
        });

        let mut received = vec![0u8; expected.len()];
        worker.read_exact(&mut received).unwrap();
        writer.join().unwrap();

        assert_eq!(received, expected);
        cleanup(&path);
    }

    #[test]
    fn persistent_checksum_mismatch_is_fatal() {
        let path = ring_path("corrupt");
        let mut launcher = RingStream::create(&path).unwrap();

        // Scribble over the worker's writer index (second region, offset 0).
        launcher.map.store(REGION_SIZE + WRITER_INDEX, 0x12);
        launcher.map.store(REGION_SIZE + WRITER_INDEX + 3, 0x00);

        let mut buf = [0u8; 1];
        let err = launcher.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        cleanup(&path);
    }

    #[test]
    fn open_rejects_wrong_size() {
        let path = ring_path("size");
        std::fs::write(&path, b"short").unwrap();

        let result = RingStream::open(&path);
        assert!(matches!(result, Err(TransportError::RingSize { len: 5, .. })));

        cleanup(&path);
    }
}
