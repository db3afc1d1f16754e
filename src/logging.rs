/// Forwards `tracing` events from the console core to Godot's output panel.
use std::fmt::Write as _;

use godot::prelude::*;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// A `tracing` layer that prints events with the engine's print macros.
pub struct GodotLogLayer {
    max_level: Level,
}

impl GodotLogLayer {
    pub fn new(max_level: Level) -> Self {
        Self { max_level }
    }
}

/// Installs the global subscriber. Debug builds also forward `debug` events.
pub fn init() {
    let level = if cfg!(debug_assertions) { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::registry().with(GodotLogLayer::new(level));
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        // Happens on hot reload, when the previous subscriber is still installed.
        godot_warn!("LineConsole: logging already initialized: {}", err);
    }
}

impl<S: Subscriber> Layer<S> for GodotLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > self.max_level {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = format!("LineConsole: {}{}", visitor.message, visitor.fields);
        match level {
            Level::ERROR => godot_error!("{}", line),
            Level::WARN => godot_warn!("{}", line),
            _ => godot_print!("{}", line),
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }
}
