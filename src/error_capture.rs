/// Opt-in capture of uncaught errors (Rust panics) for display in the console.
use std::any::Any;
use std::panic::{self, PanicHookInfo};
use std::sync::{Arc, Mutex, PoisonError};

/// Queue of error messages filled by the panic hook and drained by the console.
#[derive(Clone, Default)]
pub struct ErrorCapture {
    queue: Arc<Mutex<Vec<String>>>,
}

impl ErrorCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a panic hook that records every panic message, then defers to
    /// the previously installed hook.
    pub fn install() -> Self {
        let capture = Self::new();
        let sink = capture.clone();
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
            sink.record(describe(info));
            previous(info);
        }));
        capture
    }

    pub fn record(&self, message: impl Into<String>) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.into());
    }

    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn describe(info: &PanicHookInfo<'_>) -> String {
    let message = payload_message(info.payload());
    match info.location() {
        Some(location) => format!("{} ({}:{})", message, location.file(), location.line()),
        None => message,
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown error".to_string()
    }
}
