//! Deterministic fault injection: a swappable `Vfs` wrapper that can be armed to fail or tear
//! a specific future write/flush, so crash-recovery paths are exercisable without relying on
//! real process kills. Gated behind `test-utils` since it has no role outside tests.

#![cfg(feature = "test-utils")]

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::{OpenMode, Vfs, VfsFile};
use crate::error::{DecentError, Result};

/// What a scheduled fault does to the intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailKind {
    /// Return this `io::ErrorKind` instead of performing the operation.
    Error(io::ErrorKind),
    /// For `write_at`: only persist the first `n` bytes of the buffer, then return success,
    /// simulating a torn write a later flush would not protect against.
    TornWrite(usize),
    /// For `flush`: return success without actually persisting anything.
    DropFlush,
}

/// When an armed fault should fire.
#[derive(Debug, Clone, Copy)]
enum Arm {
    Never,
    NextCall,
    EveryCall,
    NthCall(u32),
}

struct Schedule {
    write: Mutex<(Arm, Option<FailKind>)>,
    flush: Mutex<(Arm, Option<FailKind>)>,
    truncate: Mutex<(Arm, Option<FailKind>)>,
    write_calls: AtomicU32,
    flush_calls: AtomicU32,
    truncate_calls: AtomicU32,
}

impl Schedule {
    fn new() -> Self {
        Schedule {
            write: Mutex::new((Arm::Never, None)),
            flush: Mutex::new((Arm::Never, None)),
            truncate: Mutex::new((Arm::Never, None)),
            write_calls: AtomicU32::new(0),
            flush_calls: AtomicU32::new(0),
            truncate_calls: AtomicU32::new(0),
        }
    }
}

/// Handle used by tests to arm faults on a `FaultyVfs`.
pub struct FaultSchedule<'a> {
    inner: &'a Schedule,
}

impl<'a> FaultSchedule<'a> {
    pub fn fail_next_write(&self, kind: FailKind) {
        *self.inner.write.lock().unwrap() = (Arm::NextCall, Some(kind));
    }

    pub fn fail_next_flush(&self, kind: FailKind) {
        *self.inner.flush.lock().unwrap() = (Arm::NextCall, Some(kind));
    }

    pub fn fail_every_write(&self, kind: FailKind) {
        *self.inner.write.lock().unwrap() = (Arm::EveryCall, Some(kind));
    }

    pub fn fail_nth_write(&self, n: u32, kind: FailKind) {
        *self.inner.write.lock().unwrap() = (Arm::NthCall(n), Some(kind));
    }

    pub fn clear(&self) {
        *self.inner.write.lock().unwrap() = (Arm::Never, None);
        *self.inner.flush.lock().unwrap() = (Arm::Never, None);
        *self.inner.truncate.lock().unwrap() = (Arm::Never, None);
    }
}

fn check_and_consume(
    slot: &Mutex<(Arm, Option<FailKind>)>,
    call_counter: &AtomicU32,
) -> Option<FailKind> {
    let call_no = call_counter.fetch_add(1, Ordering::SeqCst) + 1;
    let mut guard = slot.lock().unwrap();
    let (arm, kind) = *guard;
    match arm {
        Arm::Never => None,
        Arm::NextCall => {
            *guard = (Arm::Never, None);
            kind
        }
        Arm::EveryCall => kind,
        Arm::NthCall(n) if n == call_no => {
            *guard = (Arm::Never, None);
            kind
        }
        Arm::NthCall(_) => None,
    }
}

/// Wraps any `Vfs` and intercepts `write_at`/`flush`/`truncate` per the armed `FaultSchedule`.
/// Clone shares the same `Schedule`, so a test can keep arming faults through one handle after
/// handing a clone to an `Engine` (which takes its `Vfs` by value).
pub struct FaultyVfs<V: Vfs + Clone> {
    inner: V,
    schedule: Arc<Schedule>,
}

impl<V: Vfs + Clone> Clone for FaultyVfs<V> {
    fn clone(&self) -> Self {
        FaultyVfs {
            inner: self.inner.clone(),
            schedule: self.schedule.clone(),
        }
    }
}

impl<V: Vfs + Clone> FaultyVfs<V> {
    pub fn new(inner: V) -> Self {
        FaultyVfs {
            inner,
            schedule: Arc::new(Schedule::new()),
        }
    }

    pub fn faults(&self) -> FaultSchedule<'_> {
        FaultSchedule {
            inner: &self.schedule,
        }
    }
}

impl<V: Vfs + Clone> Vfs for FaultyVfs<V> {
    type File = FaultyFile<V::File>;

    fn open(&self, path: &Path, mode: OpenMode) -> Result<Self::File> {
        let file = self.inner.open(path, mode)?;
        Ok(FaultyFile {
            file,
            schedule: self.schedule.clone(),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.inner.remove(path)
    }
}

pub struct FaultyFile<F: VfsFile> {
    file: F,
    schedule: Arc<Schedule>,
}

impl<F: VfsFile> FaultyFile<F> {
    fn schedule(&self) -> &Schedule {
        &self.schedule
    }
}

impl<F: VfsFile> VfsFile for FaultyFile<F> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.file.read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let schedule = self.schedule();
        if let Some(kind) =
            check_and_consume(&schedule.write, &schedule.write_calls)
        {
            match kind {
                FailKind::Error(e) => return Err(DecentError::Io(io::Error::new(e, "injected fault"))),
                FailKind::TornWrite(n) => {
                    let n = n.min(buf.len());
                    self.file.write_at(offset, &buf[..n])?;
                    return Ok(());
                }
                FailKind::DropFlush => {}
            }
        }
        self.file.write_at(offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        let schedule = self.schedule();
        if let Some(kind) = check_and_consume(&schedule.flush, &schedule.flush_calls) {
            match kind {
                FailKind::Error(e) => return Err(DecentError::Io(io::Error::new(e, "injected fault"))),
                FailKind::DropFlush => return Ok(()),
                FailKind::TornWrite(_) => {}
            }
        }
        self.file.flush()
    }

    fn len(&mut self) -> Result<u64> {
        self.file.len()
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        let schedule = self.schedule();
        if let Some(FailKind::Error(e)) =
            check_and_consume(&schedule.truncate, &schedule.truncate_calls)
        {
            return Err(DecentError::Io(io::Error::new(e, "injected fault")));
        }
        self.file.truncate(len)
    }
}
