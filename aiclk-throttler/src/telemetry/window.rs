//! Word access to the shared telemetry window.
//!
//! The window is a fixed physical range in chip-side memory that a
//! host-side monitor reads. All access is in 32-bit words at a byte
//! offset from [`WINDOW_BASE`].
//!
//! Checks are soft: an access past the end of the window is logged and
//! dropped (reads yield 0), and a misaligned offset is logged but still
//! performed. Neither is an error; callers get a [`WordAccess`] telling
//! them which path was taken. Offsets are unsigned, so there is no
//! separate lower-bound check.

use crate::tracing::prelude::*;

/// First byte of the telemetry window.
pub const WINDOW_BASE: u64 = 0x1006_0000;

/// Last byte of the telemetry window.
pub const WINDOW_END: u64 = 0x1007_FFFF;

/// Window size in bytes.
pub const WINDOW_SIZE: u64 = WINDOW_END - WINDOW_BASE + 1;

/// How a window access was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordAccess {
    Ok,
    /// Offset not 4-byte aligned; the access still happened.
    Misaligned,
    /// Address past the window end; nothing was read or written.
    OutOfRange,
}

/// Result of [`TelemetryWindow::read_word`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordRead {
    /// Word read, or 0 when the access was out of range.
    pub value: u32,
    pub access: WordAccess,
}

/// Backing store addressed by absolute physical address.
pub trait WordBus: Send {
    fn read32(&self, addr: u64) -> u32;
    fn write32(&mut self, addr: u64, value: u32);
}

/// Heap-backed stand-in for the window, little-endian like the chip.
///
/// Bytes outside the backing buffer read as zero and swallow writes, so
/// a misaligned word at the very end of the window behaves like the
/// hardware's unmapped tail.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    base: u64,
    bytes: Vec<u8>,
}

impl MemoryBus {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            bytes: vec![0; size],
        }
    }

    /// A bus covering exactly the telemetry window.
    pub fn for_window() -> Self {
        Self::new(WINDOW_BASE, WINDOW_SIZE as usize)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn index(&self, addr: u64) -> Option<usize> {
        addr.checked_sub(self.base)
            .and_then(|i| usize::try_from(i).ok())
    }
}

impl WordBus for MemoryBus {
    fn read32(&self, addr: u64) -> u32 {
        let mut word = [0u8; 4];
        for (i, byte) in word.iter_mut().enumerate() {
            if let Some(&b) = self
                .index(addr + i as u64)
                .and_then(|index| self.bytes.get(index))
            {
                *byte = b;
            }
        }
        u32::from_le_bytes(word)
    }

    fn write32(&mut self, addr: u64, value: u32) {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            if let Some(index) = self.index(addr + i as u64) {
                if let Some(slot) = self.bytes.get_mut(index) {
                    *slot = b;
                }
            }
        }
    }
}

/// Bounds- and alignment-checked accessor for the telemetry window.
pub struct TelemetryWindow {
    bus: Box<dyn WordBus>,
}

impl TelemetryWindow {
    pub fn new(bus: Box<dyn WordBus>) -> Self {
        Self { bus }
    }

    /// Heap-backed window, for hosts without the chip mapping.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBus::for_window()))
    }

    pub fn read_word(&self, offset: u32) -> WordRead {
        let (addr, access) = Self::check("read", offset);
        if access == WordAccess::OutOfRange {
            return WordRead { value: 0, access };
        }

        let value = self.bus.read32(addr);
        debug!(
            addr = format_args!("{addr:#010x}"),
            value = format_args!("{value:#010x}"),
            "Telemetry window read"
        );

        WordRead { value, access }
    }

    pub fn write_word(&mut self, offset: u32, value: u32) -> WordAccess {
        let (addr, access) = Self::check("write", offset);
        if access == WordAccess::OutOfRange {
            return access;
        }

        debug!(
            addr = format_args!("{addr:#010x}"),
            value = format_args!("{value:#010x}"),
            "Telemetry window write"
        );
        self.bus.write32(addr, value);

        access
    }

    /// Copy of the first `len` bytes of the window, word by word.
    pub fn dump(&self, len: u32) -> Vec<u8> {
        let len = len.min(WINDOW_SIZE as u32);
        (0..len)
            .step_by(4)
            .flat_map(|offset| self.bus.read32(WINDOW_BASE + u64::from(offset)).to_le_bytes())
            .take(len as usize)
            .collect()
    }

    fn check(op: &str, offset: u32) -> (u64, WordAccess) {
        let addr = WINDOW_BASE + u64::from(offset);

        if addr > WINDOW_END {
            error!(
                op,
                addr = format_args!("{addr:#010x}"),
                "Telemetry window address out of range"
            );
            return (addr, WordAccess::OutOfRange);
        }

        if offset & 0x3 != 0 {
            warn!(
                op,
                offset = format_args!("{offset:#010x}"),
                "Telemetry window offset not 4-byte aligned"
            );
            return (addr, WordAccess::Misaligned);
        }

        (addr, WordAccess::Ok)
    }
}
