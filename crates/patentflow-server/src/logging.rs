use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use tokio::sync::broadcast;

/// Lines kept for replay to new `/api/logs` subscribers.
pub const RING_CAPACITY: usize = 500;

pub const DEFAULT_FILTER: &str =
    "patentflow_server=info,patentflow_core=info,patentflow_agent=info,patentflow_domains=info,tower_http=debug";

pub type LogRing = Arc<Mutex<VecDeque<String>>>;

pub fn new_ring() -> LogRing {
    Arc::new(Mutex::new(VecDeque::with_capacity(RING_CAPACITY)))
}

/// Fans every tracing event out as one compact JSON line to the live log
/// channel and the replay ring.
pub struct BroadcastLayer {
    pub tx: broadcast::Sender<String>,
    pub ring: LogRing,
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    run_id: Option<String>,
    stage: Option<String>,
}

impl LineVisitor {
    fn put(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = value,
            "run_id" | "job_id" => self.run_id = Some(value),
            "stage" => self.stage = Some(value),
            _ => {}
        }
    }
}

impl tracing::field::Visit for LineVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.put(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let mut text = format!("{value:?}");
        // Debug on &str wraps it in quotes
        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            text = text[1..text.len() - 1].to_string();
        }
        self.put(field.name(), text);
    }
}

/// Dashboard category for an event target.
pub fn category(target: &str) -> &'static str {
    if ["engine", "supervisor", "stages", "jobs"].iter().any(|t| target.contains(t)) {
        "pipeline"
    } else if ["agent", "gemini", "ollama"].iter().any(|t| target.contains(t)) {
        "inference"
    } else {
        "system"
    }
}

impl BroadcastLayer {
    fn publish(&self, line: String) {
        let _ = self.tx.send(line.clone());
        let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.push_back(line);
        while ring.len() > RING_CAPACITY {
            ring.pop_front();
        }
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for BroadcastLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = match *event.metadata().level() {
            tracing::Level::ERROR => "err",
            tracing::Level::WARN => "warn",
            tracing::Level::INFO => "info",
            tracing::Level::DEBUG => "debug",
            tracing::Level::TRACE => return,
        };

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let mut line = serde_json::json!({
            "ts": chrono::Utc::now().timestamp(),
            "level": level,
            "message": visitor.message,
            "category": category(event.metadata().target()),
        });
        if let Some(run_id) = visitor.run_id {
            line["run_id"] = run_id.into();
        }
        if let Some(stage) = visitor.stage {
            line["stage"] = stage.into();
        }
        self.publish(line.to_string());
    }
}
