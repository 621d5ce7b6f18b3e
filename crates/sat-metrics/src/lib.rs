//! Lock-free statistics primitives.
//!
//! [`Counter`] only goes up; [`Gauge`] tracks a level that rises and falls
//! (e.g. peers currently connected). Both serialize as a bare integer, so a
//! struct of them renders as a flat JSON object.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Monotonic event count. Relaxed ordering: values are statistics, not
/// synchronization.
#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Start from an existing value (deserialization, snapshots).
    pub const fn with_value(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Clone for Counter {
    fn clone(&self) -> Self {
        Self::with_value(self.get())
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Counter({})", self.get())
    }
}

/// Current level of something. Never reported below zero.
#[derive(Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub const fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    pub fn with_value(value: u64) -> Self {
        let g = Self::new();
        g.set(value);
        g
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set(&self, value: u64) {
        self.0
            .store(i64::try_from(value).unwrap_or(i64::MAX), Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        u64::try_from(self.0.load(Ordering::Relaxed)).unwrap_or(0)
    }
}

impl Clone for Gauge {
    fn clone(&self) -> Self {
        Self::with_value(self.get())
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gauge({})", self.get())
    }
}

macro_rules! serde_as_u64 {
    ($ty:ident, $ctor:expr) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_u64(self.get())
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = <u64 as serde::Deserialize>::deserialize(deserializer)?;
                Ok($ctor(value))
            }
        }
    };
}

serde_as_u64!(Counter, Counter::with_value);
serde_as_u64!(Gauge, Gauge::with_value);
