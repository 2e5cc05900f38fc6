//! Advisory concurrency recommendation for the hosting scheduler.
//!
//! The value is static per device and cost class. The worker itself never
//! throttles on it; whoever schedules jobs onto this worker does.

use serde::Serialize;

use crate::types::{CostClass, Device};

/// Cheap single-language models on an accelerator.
pub const ACCELERATED_LIGHT_CONCURRENCY: usize = 10;
/// Multilingual or autoregressive models on an accelerator.
pub const ACCELERATED_HEAVY_CONCURRENCY: usize = 2;
/// Anything running without acceleration is effectively serial.
pub const GENERAL_CONCURRENCY: usize = 1;

/// Static admission policy derived from worker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionPolicy {
    pub device: Device,
    pub cost: CostClass,
    /// Operator override; takes precedence over the table, floored at 1.
    pub max_concurrency: Option<usize>,
}

impl AdmissionPolicy {
    pub fn new(device: Device, cost: CostClass) -> Self {
        Self {
            device,
            cost,
            max_concurrency: None,
        }
    }

    pub fn with_override(mut self, max_concurrency: Option<usize>) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// How many jobs this worker should be handed at once.
    ///
    /// `current` is the scheduler's present setting. It is accepted so the
    /// hook signature matches what schedulers poll, and ignored.
    pub fn recommend_concurrency(&self, current: usize) -> usize {
        let _ = current;
        if let Some(n) = self.max_concurrency {
            return n.max(1);
        }
        match (self.device, self.cost) {
            (Device::Accelerated, CostClass::Light) => ACCELERATED_LIGHT_CONCURRENCY,
            (Device::Accelerated, CostClass::Heavy) => ACCELERATED_HEAVY_CONCURRENCY,
            (Device::General, _) => GENERAL_CONCURRENCY,
        }
    }
}

/// Body of the admission hook response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConcurrencyAdvice {
    pub current: usize,
    pub recommended: usize,
}
