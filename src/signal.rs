use std::time::{Duration, Instant};

/// Tri-state validity for a gating signal.
///
/// `Unknown` denies admission exactly like `Invalid`; it exists so that a
/// fresh stream (e.g. right after a device switch) is distinguishable from
/// a stream that was measured and found bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Unknown,
    Valid,
    Invalid,
}

impl Validity {
    pub fn is_valid(self) -> bool {
        matches!(self, Validity::Valid)
    }

    pub fn from_bool(valid: bool) -> Self {
        if valid {
            Validity::Valid
        } else {
            Validity::Invalid
        }
    }
}

/// A named validity signal with a last-updated timestamp.
///
/// Each signal is owned exclusively by its producing validator; the
/// controller only reads the last published value. Staleness up to one
/// detection/sampling period is expected.
#[derive(Debug, Clone)]
pub struct ValiditySignal {
    name: &'static str,
    value: Validity,
    updated_at: Option<Instant>,
}

impl ValiditySignal {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: Validity::Unknown,
            updated_at: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> Validity {
        self.value
    }

    pub fn is_valid(&self) -> bool {
        self.value.is_valid()
    }

    /// Publish a new value. The update is atomic from the controller's
    /// point of view: it happens between controller ticks, never during one.
    pub fn publish(&mut self, valid: bool) {
        self.value = Validity::from_bool(valid);
        self.updated_at = Some(Instant::now());
    }

    /// Reset to `Unknown`, e.g. across a stream swap.
    pub fn reset(&mut self) {
        self.value = Validity::Unknown;
        self.updated_at = None;
    }

    /// Age of the last published value, if any.
    pub fn age(&self) -> Option<Duration> {
        self.updated_at.map(|t| t.elapsed())
    }
}
