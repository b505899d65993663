//! Span capture for asserting engine state sequences.

use std::sync::{Arc, Mutex};

use tracing::Dispatch;
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

/// Captured span information.
#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
}

struct SpanCaptureLayer {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
}

impl<S> Layer<S> for SpanCaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let name = attrs.metadata().name();
        if !name.starts_with("fsm.") && !name.starts_with("etch.") {
            return;
        }
        let parent_id = attrs
            .parent()
            .cloned()
            .or_else(|| {
                if attrs.is_contextual() {
                    ctx.current_span().id().cloned()
                } else {
                    None
                }
            })
            .map(|id| id.into_u64());

        self.spans.lock().unwrap().push(CapturedSpan {
            id: id.into_u64(),
            parent_id,
            name: name.to_string(),
        });
    }
}

/// Collector for captured spans.
#[derive(Clone)]
pub struct SpanCollector {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
    dispatch: Dispatch,
}

pub fn create_span_collector() -> SpanCollector {
    let spans = Arc::new(Mutex::new(Vec::new()));
    let layer = SpanCaptureLayer {
        spans: spans.clone(),
    };
    let subscriber = Registry::default()
        .with(layer)
        .with(tracing_subscriber::fmt::layer().with_test_writer());
    SpanCollector {
        spans,
        dispatch: Dispatch::new(subscriber),
    }
}

impl SpanCollector {
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// FSM state names in creation order, without the `fsm.` prefix.
    pub fn fsm_states(&self) -> Vec<String> {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| s.name.strip_prefix("fsm.").map(String::from))
            .collect()
    }

    pub fn has_span(&self, name: &str) -> bool {
        self.spans.lock().unwrap().iter().any(|s| s.name == name)
    }

    /// Whether every FSM span descends from an `etch.request` span.
    pub fn fsm_spans_nested_in_request(&self) -> bool {
        let spans = self.spans.lock().unwrap();
        let is_request = |id: Option<u64>| {
            id.and_then(|id| spans.iter().find(|s| s.id == id))
                .is_some_and(|s| s.name == "etch.request")
        };
        spans
            .iter()
            .filter(|s| s.name.starts_with("fsm."))
            .all(|s| is_request(s.parent_id))
    }

    /// Panics unless the FSM states match `expected` exactly.
    pub fn assert_fsm_states(&self, expected: &[&str]) {
        let actual = self.fsm_states();
        assert_eq!(
            actual, expected,
            "FSM state sequence mismatch\n  expected: {expected:?}\n  actual:   {actual:?}"
        );
    }
}
