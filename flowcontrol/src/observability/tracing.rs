//! Tracing setup and span helpers for barrier coordination.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::core::{BarrierPositionType, BarrierState};

static TRACING_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Installs a global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling this
/// more than once, or after another subscriber was installed, is harmless.
/// Returns true if this call installed the subscriber.
pub fn init_tracing(json: bool) -> bool {
    *TRACING_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let layer = if json {
            fmt::layer()
                .with_target(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        let installed = tracing_subscriber::registry().with(layer).try_init().is_ok();
        if !installed {
            tracing::debug!("Global tracing subscriber already set, keeping it");
        }
        installed
    })
}

/// Span attributes for barrier operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BarrierSpanAttributes {
    /// Barrier identifier.
    pub barrier_identifier: Option<String>,
    /// Instance uuid.
    pub barrier_uuid: Option<String>,
    /// Owning plan execution.
    pub plan_execution_id: Option<String>,
    /// Lifecycle state.
    pub barrier_state: Option<BarrierState>,
    /// Position level being bound.
    pub position_type: Option<BarrierPositionType>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
}

impl BarrierSpanAttributes {
    /// Creates empty attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the barrier identifier.
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.barrier_identifier = Some(identifier.into());
        self
    }

    /// Sets the instance uuid.
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.barrier_uuid = Some(uuid.into());
        self
    }

    /// Sets the plan execution id.
    #[must_use]
    pub fn with_plan_execution_id(mut self, id: impl Into<String>) -> Self {
        self.plan_execution_id = Some(id.into());
        self
    }

    /// Sets the state.
    #[must_use]
    pub fn with_state(mut self, state: BarrierState) -> Self {
        self.barrier_state = Some(state);
        self
    }

    /// Sets the position type.
    #[must_use]
    pub fn with_position_type(mut self, kind: BarrierPositionType) -> Self {
        self.position_type = Some(kind);
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Flattens into dotted attribute keys.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        if let Some(ref v) = self.barrier_identifier {
            attrs.insert("barrier.identifier".to_string(), v.clone());
        }
        if let Some(ref v) = self.barrier_uuid {
            attrs.insert("barrier.uuid".to_string(), v.clone());
        }
        if let Some(ref v) = self.plan_execution_id {
            attrs.insert("barrier.plan_execution_id".to_string(), v.clone());
        }
        if let Some(v) = self.barrier_state {
            attrs.insert("barrier.state".to_string(), v.to_string());
        }
        if let Some(v) = self.position_type {
            attrs.insert("barrier.position_type".to_string(), v.to_string());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("barrier.duration_ms".to_string(), v.to_string());
        }
        attrs
    }

    /// Records the attributes on `span`.
    ///
    /// Only fields the span declared (usually as `tracing::field::Empty`)
    /// are kept; the rest are ignored.
    pub fn record_on(&self, span: &Span) {
        for (key, value) in self.to_attributes() {
            span.record(key.as_str(), tracing::field::display(value));
        }
    }
}

/// Measures how long an operation took.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: &'static str,
}

impl SpanTimer {
    /// Starts a timer.
    #[must_use]
    pub fn start(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// The operation name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stops the timer, logs the duration at DEBUG and returns it.
    pub fn finish(self) -> f64 {
        let duration_ms = self.elapsed_ms();
        tracing::debug!(operation = self.name, duration_ms, "Barrier operation finished");
        duration_ms
    }
}
