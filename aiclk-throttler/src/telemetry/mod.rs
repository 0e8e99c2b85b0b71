mod mirror;
mod window;

pub use mirror::{
    RecordOutcome, SAMPLE_CAPACITY, SAMPLE_STRIDE, TelemetryMirror, TelemetrySample,
    decode_samples, slot_offset,
};
pub use window::{
    MemoryBus, TelemetryWindow, WINDOW_BASE, WINDOW_END, WINDOW_SIZE, WordAccess,
    WordBus, WordRead,
};
