//! Recording analytics sink with configurable latency and failures.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tally_types::TrackingEvent;

use crate::sink::{AnalyticsSink, SinkError};

/// Sink that records every delivered event and tracks send concurrency.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<TrackingEvent>>,
    latency: Mutex<Duration>,
    failing_tag: Mutex<Option<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingSink {
    /// Makes every send take `latency` before completing.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().expect("sink mutex poisoned") = latency;
    }

    /// Rejects events whose `type` tag equals `tag`.
    pub fn fail_type(&self, tag: &str) {
        *self.failing_tag.lock().expect("sink mutex poisoned") = Some(tag.to_owned());
    }

    /// Events accepted so far, in delivery order.
    #[must_use]
    pub fn delivered(&self) -> Vec<TrackingEvent> {
        self.delivered.lock().expect("sink mutex poisoned").clone()
    }

    /// `type` tags of the accepted events, in delivery order.
    #[must_use]
    pub fn delivered_types(&self) -> Vec<String> {
        self.delivered()
            .iter()
            .map(|event| type_tag(event).to_owned())
            .collect()
    }

    /// Labels of the accepted events that carry one.
    #[must_use]
    pub fn delivered_labels(&self) -> Vec<String> {
        self.delivered()
            .iter()
            .filter_map(|event| event.label().map(str::to_owned))
            .collect()
    }

    /// Largest number of sends observed in flight at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalyticsSink for RecordingSink {
    async fn send(&self, event: &TrackingEvent) -> Result<(), SinkError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let latency = *self.latency.lock().expect("sink mutex poisoned");
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let rejected = self
            .failing_tag
            .lock()
            .expect("sink mutex poisoned")
            .as_deref()
            .is_some_and(|tag| tag == type_tag(event));
        let outcome = if rejected {
            Err(SinkError::rejected("configured to fail"))
        } else {
            self.delivered
                .lock()
                .expect("sink mutex poisoned")
                .push(event.clone());
            Ok(())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

fn type_tag(event: &TrackingEvent) -> &str {
    event
        .as_value()
        .get("type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
}
