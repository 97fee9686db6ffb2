//! WAL frame reader: a sequential scan over `Vfs`, generalized to the one on-disk frame format
//! this core uses.
//!
//! `read_all_frames` never returns an error for a torn tail: a partially-written length prefix,
//! a short payload, or a checksum mismatch simply ends iteration at the last good frame. A crash
//! mid `write_at` leaves garbage after the last fsync'd frame, and that garbage must be silently
//! discarded rather than treated as corruption of the whole log.

use crate::error::Result;
use crate::vfs::VfsFile;
use crate::wal::record::WalRecord;

pub struct WalFrame {
    pub offset: u64,
    pub record: WalRecord,
}

/// Read every well-formed, checksum-valid frame starting at byte 0 of `file`.
pub fn read_all_frames(file: &mut impl VfsFile) -> Result<Vec<WalFrame>> {
    let len = file.len()?;
    let mut frames = Vec::new();
    let mut offset = 0u64;

    while offset + 4 <= len {
        let mut len_buf = [0u8; 4];
        if file.read_at(offset, &mut len_buf)? != 4 {
            break;
        }
        let record_len = u32::from_le_bytes(len_buf) as u64;
        let frame_total = 4 + record_len + 4;
        if offset + frame_total > len {
            break; // torn tail: declared length runs past EOF
        }

        let mut record_buf = vec![0u8; record_len as usize];
        if record_len > 0 && file.read_at(offset + 4, &mut record_buf)? != record_buf.len() {
            break;
        }

        let mut crc_buf = [0u8; 4];
        if file.read_at(offset + 4 + record_len, &mut crc_buf)? != 4 {
            break;
        }
        let stored_crc = u32::from_le_bytes(crc_buf);
        if crc32c::crc32c(&record_buf) != stored_crc {
            break; // torn write: length prefix survived but payload didn't
        }

        let record = match WalRecord::deserialize(&record_buf) {
            Some(r) => r,
            None => break,
        };
        frames.push(WalFrame { offset, record });
        offset += frame_total;
    }

    Ok(frames)
}

/// Read the single frame starting at `offset`, for the snapshot-read overlay path: the index
/// gives a frame offset directly, so there is no need to rescan the log from the start.
pub fn read_frame_at(file: &mut impl VfsFile, offset: u64) -> Result<Option<WalRecord>> {
    let mut len_buf = [0u8; 4];
    if file.read_at(offset, &mut len_buf)? != 4 {
        return Ok(None);
    }
    let record_len = u32::from_le_bytes(len_buf) as usize;

    let mut record_buf = vec![0u8; record_len];
    if record_len > 0 && file.read_at(offset + 4, &mut record_buf)? != record_len {
        return Ok(None);
    }

    let mut crc_buf = [0u8; 4];
    if file.read_at(offset + 4 + record_len as u64, &mut crc_buf)? != 4 {
        return Ok(None);
    }
    if crc32c::crc32c(&record_buf) != u32::from_le_bytes(crc_buf) {
        return Ok(None);
    }

    Ok(WalRecord::deserialize(&record_buf))
}
