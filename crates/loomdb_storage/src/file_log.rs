//! File-backed transaction log.

use crate::channel::TransactionLog;
use crate::error::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Magic bytes identifying a log frame.
pub const LOG_MAGIC: [u8; 4] = *b"LLOG";

/// Current log frame format version.
pub const LOG_VERSION: u16 = 1;

/// Frame header size: magic (4) + version (2) + id (8) + length (4).
const HEADER_SIZE: usize = 18;

/// CRC trailer size.
const CRC_SIZE: usize = 4;

/// Computes a CRC32 checksum (IEEE polynomial).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    crc ^ 0xFFFF_FFFF
}

/// A persistent transaction log backed by a single append-only file.
///
/// Each entry is stored as a framed record:
///
/// ```text
/// magic (4) | version (2) | id (8, LE) | len (4, LE) | payload | crc32 (4, LE)
/// ```
///
/// The CRC covers everything before it. On open the file is scanned once to
/// rebuild the `(id, offset)` index; a torn tail (an incomplete or
/// CRC-failing final frame, as left by a crash mid-append) is truncated
/// away. A frame that fails to parse while valid frames still follow it is
/// mid-log corruption and reported as [`StorageError::Corrupted`] instead,
/// since committed history must never silently shrink.
pub struct FileLog {
    path: PathBuf,
    file: File,
    /// Byte offset and id of every valid frame, in file order.
    index: Vec<(u64, u64)>,
    /// Read cursor: position in `index` of the next entry to return.
    cursor: usize,
    /// Whether `append` syncs the file before returning.
    sync_on_append: bool,
}

impl FileLog {
    /// Opens or creates a log file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if a frame before the final one
    /// fails validation, or an I/O error.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_sync(path, true)
    }

    /// Opens a log file, controlling whether appends fsync.
    ///
    /// Disabling sync is only appropriate for tests.
    pub fn open_with_sync(path: &Path, sync_on_append: bool) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let (index, valid_len) = Self::scan(&mut file)?;
        let size = file.metadata()?.len();
        if valid_len < size {
            // Torn tail from a crash mid-append.
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            index,
            cursor: 0,
            sync_on_append,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of entries in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Scans the file, returning the frame index and the valid byte length.
    fn scan(file: &mut File) -> StorageResult<(Vec<(u64, u64)>, u64)> {
        let size = file.metadata()?.len();
        let mut index = Vec::new();
        let mut offset = 0u64;
        file.seek(SeekFrom::Start(0))?;

        let mut prev_id = 0u64;
        while offset < size {
            match Self::read_frame_at(file, offset, size) {
                Ok((id, payload_len)) => {
                    if id <= prev_id {
                        return Err(StorageError::corrupted(format!(
                            "log ids out of order at offset {offset}: {id} after {prev_id}"
                        )));
                    }
                    prev_id = id;
                    index.push((id, offset));
                    offset += (HEADER_SIZE + payload_len + CRC_SIZE) as u64;
                }
                Err(e) => {
                    // A bad final frame is a torn tail; anything earlier is
                    // real corruption. A corrupted length field can make a
                    // mid-log frame look like it runs past EOF, so a tail
                    // candidate must also have nothing parseable after it.
                    let remaining = size - offset;
                    let reaches_eof =
                        Self::frame_fits_tail(file, offset, size)? || remaining < HEADER_SIZE as u64;
                    if reaches_eof && !Self::valid_frame_after(file, offset, size)? {
                        return Ok((index, offset));
                    }
                    return Err(e);
                }
            }
        }

        Ok((index, offset))
    }

    /// Returns `true` when the frame declared at `offset` is the last one in
    /// the file (complete or not), i.e. a failure here is a torn tail.
    fn frame_fits_tail(file: &mut File, offset: u64, size: u64) -> StorageResult<bool> {
        if size - offset < HEADER_SIZE as u64 {
            return Ok(true);
        }
        let mut header = [0u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut header)?;
        let len = u32::from_le_bytes([header[14], header[15], header[16], header[17]]) as u64;
        Ok(offset + HEADER_SIZE as u64 + len + CRC_SIZE as u64 >= size)
    }

    /// Looks for a frame that still parses anywhere after `offset`.
    ///
    /// A torn tail is by definition the end of the file, so a later valid
    /// frame means the failure at `offset` is mid-log corruption that must
    /// not be truncated away.
    fn valid_frame_after(file: &mut File, offset: u64, size: u64) -> StorageResult<bool> {
        let start = offset + 1;
        if start + (HEADER_SIZE + CRC_SIZE) as u64 > size {
            return Ok(false);
        }
        let mut tail = vec![0u8; (size - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut tail)?;
        for (i, window) in tail.windows(LOG_MAGIC.len()).enumerate() {
            if window == LOG_MAGIC && Self::read_frame_at(file, start + i as u64, size).is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Reads and validates the frame at `offset`, returning (id, payload len).
    fn read_frame_at(file: &mut File, offset: u64, size: u64) -> StorageResult<(u64, usize)> {
        if size - offset < (HEADER_SIZE + CRC_SIZE) as u64 {
            return Err(StorageError::corrupted("truncated frame header"));
        }

        let mut header = [0u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut header)?;

        if header[0..4] != LOG_MAGIC {
            return Err(StorageError::corrupted(format!(
                "bad frame magic at offset {offset}"
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != LOG_VERSION {
            return Err(StorageError::corrupted(format!(
                "unsupported log frame version {version}"
            )));
        }
        let id = u64::from_le_bytes([
            header[6], header[7], header[8], header[9], header[10], header[11], header[12],
            header[13],
        ]);
        let len = u32::from_le_bytes([header[14], header[15], header[16], header[17]]) as usize;

        let frame_end = offset + (HEADER_SIZE + len + CRC_SIZE) as u64;
        if frame_end > size {
            return Err(StorageError::corrupted("truncated frame payload"));
        }

        let mut body = vec![0u8; len];
        file.read_exact(&mut body)?;
        let mut crc_bytes = [0u8; CRC_SIZE];
        file.read_exact(&mut crc_bytes)?;
        let stored_crc = u32::from_le_bytes(crc_bytes);

        let mut framed = Vec::with_capacity(HEADER_SIZE + len);
        framed.extend_from_slice(&header);
        framed.extend_from_slice(&body);
        let actual = compute_crc32(&framed);
        if actual != stored_crc {
            return Err(StorageError::corrupted(format!(
                "frame checksum mismatch at offset {offset}: expected {stored_crc:08x}, got {actual:08x}"
            )));
        }

        Ok((id, len))
    }

    /// Reads the payload of the indexed frame at `pos`.
    fn read_payload(&mut self, pos: usize) -> StorageResult<(u64, Vec<u8>)> {
        let (id, offset) = self.index[pos];

        let mut header = [0u8; HEADER_SIZE];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut header)?;
        let len = u32::from_le_bytes([header[14], header[15], header[16], header[17]]) as usize;

        let mut payload = vec![0u8; len];
        self.file.read_exact(&mut payload)?;
        Ok((id, payload))
    }
}

impl TransactionLog for FileLog {
    fn append(&mut self, id: u64, bytes: &[u8]) -> StorageResult<()> {
        if let Some(&(head, _)) = self.index.last() {
            if id <= head {
                return Err(StorageError::NonMonotonicAppend { id, head });
            }
        }

        let len = u32::try_from(bytes.len())
            .map_err(|_| StorageError::corrupted("log payload exceeds 4 GiB frame limit"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + bytes.len() + CRC_SIZE);
        frame.extend_from_slice(&LOG_MAGIC);
        frame.extend_from_slice(&LOG_VERSION.to_le_bytes());
        frame.extend_from_slice(&id.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(bytes);
        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&frame)?;
        if self.sync_on_append {
            self.file.sync_data()?;
        }

        self.index.push((id, offset));
        Ok(())
    }

    fn seek(&mut self, after: u64) -> StorageResult<()> {
        self.cursor = self.index.partition_point(|&(id, _)| id <= after);
        Ok(())
    }

    fn poll_next(&mut self, _timeout: Duration) -> StorageResult<Option<(u64, Vec<u8>)>> {
        if self.cursor >= self.index.len() {
            return Ok(None);
        }
        let entry = self.read_payload(self.cursor)?;
        self.cursor += 1;
        Ok(Some(entry))
    }

    fn last_id(&self) -> StorageResult<Option<u64>> {
        Ok(self.index.last().map(|&(id, _)| id))
    }
}

impl std::fmt::Debug for FileLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLog")
            .field("path", &self.path)
            .field("entries", &self.index.len())
            .finish_non_exhaustive()
    }
}
