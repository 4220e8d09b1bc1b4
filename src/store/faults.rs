use std::time::Duration;

/// Fault injection for the in-memory backend.
///
/// Failure counters are consumed one per call: `fail_writes(2)` makes the
/// next two writes fail with `StoreError::Network` and later writes succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    failing_reads: usize,
    failing_writes: usize,
    read_latency: Option<Duration>,
    write_latency: Option<Duration>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(mut self, count: usize) -> Self {
        self.failing_reads = count;
        self
    }

    pub fn fail_writes(mut self, count: usize) -> Self {
        self.failing_writes = count;
        self
    }

    pub fn read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = Some(latency);
        self
    }

    pub fn write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = Some(latency);
        self
    }

    pub fn pending_read_failures(&self) -> usize {
        self.failing_reads
    }

    pub fn pending_write_failures(&self) -> usize {
        self.failing_writes
    }

    pub(crate) fn take_read_failure(&mut self) -> bool {
        take(&mut self.failing_reads)
    }

    pub(crate) fn take_write_failure(&mut self) -> bool {
        take(&mut self.failing_writes)
    }

    pub(crate) fn read_delay(&self) -> Option<Duration> {
        self.read_latency
    }

    pub(crate) fn write_delay(&self) -> Option<Duration> {
        self.write_latency
    }
}

fn take(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}
