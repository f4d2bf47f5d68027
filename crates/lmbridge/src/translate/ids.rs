use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of Messages API ids (`msg_...`)
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random ids backed by UUID v4
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> String {
        format!("msg_{}", Uuid::new_v4().simple())
    }
}

/// Monotonically increasing ids, unique within one process
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids become `msg_{prefix}{n}`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("msg_{}{n}", self.prefix)
    }
}
