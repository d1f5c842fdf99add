//! Structured cursor events with a thread-local capture sink.
//!
//! Every retry, recreate and exhaustion is emitted as one JSON line on the
//! `nexus_cursor::events` log target. Tests enable the sink on their own thread
//! to assert on the exact sequence without racing the global logger.

use std::cell::RefCell;

/// Log target used for cursor events.
pub const EVENT_TARGET: &str = "nexus_cursor::events";

thread_local! {
    static TL_SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Disables the thread-local sink on drop.
pub struct EventSinkGuard;

impl Drop for EventSinkGuard {
    fn drop(&mut self) {
        TL_SINK.with(|s| *s.borrow_mut() = None);
    }
}

/// Start capturing events emitted on the current thread.
pub fn capture() -> EventSinkGuard {
    TL_SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    EventSinkGuard
}

pub fn write_str(msg: &str) {
    TL_SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg.to_owned());
        }
    });
}

/// Drain captured events. Empty when capture is off.
pub fn drain() -> Vec<String> {
    TL_SINK.with(|s| match s.borrow_mut().as_mut() {
        Some(buf) => std::mem::take(buf),
        None => Vec::new(),
    })
}

/// Captured events without clearing them.
pub fn snapshot() -> Vec<String> {
    TL_SINK.with(|s| s.borrow().as_ref().cloned().unwrap_or_default())
}

/// Number of captured events whose `event` field equals `name`.
pub fn count(name: &str) -> usize {
    let needle = format!("\"event\":\"{name}\"");
    snapshot().iter().filter(|line| line.contains(&needle)).count()
}

/// Emit a cursor event: `cursor_event!("recreate", "ns" => ns, "count" => n)`.
///
/// Values are rendered through `serde_json`, so strings are quoted and escaped.
#[macro_export]
macro_rules! cursor_event {
    ($event:expr $(, $key:expr => $value:expr)* $(,)?) => {{
        let mut __line = format!("{{\"event\":{}", ::serde_json::json!($event));
        $(
            __line.push_str(&format!(",{}:{}", ::serde_json::json!($key), ::serde_json::json!($value)));
        )*
        __line.push('}');
        $crate::utils::events::write_str(&__line);
        ::log::log!(target: $crate::utils::events::EVENT_TARGET, ::log::Level::Debug, "{}", __line);
    }};
}
