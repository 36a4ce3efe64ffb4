//! Developer trace sink (component S): a thread-local log buffer for
//! deterministic assertions in tests, alongside routing through the global
//! logger. Grounded on `utils::devlog`'s thread-local `RefCell<Vec<String>>`
//! sink, renamed off the teacher's "dev6" level to a plain trace target.

use std::cell::RefCell;

thread_local! {
    static TL_SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

pub struct DevSinkGuard;
impl Drop for DevSinkGuard {
    fn drop(&mut self) {
        TL_SINK.with(|s| *s.borrow_mut() = None);
    }
}

/// Enables the thread-local sink for the current thread. Returns a guard
/// that disables it again on drop.
pub fn enable_thread_sink() -> DevSinkGuard {
    TL_SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    DevSinkGuard
}

pub fn write_str(msg: &str) {
    TL_SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg.to_owned());
        }
    });
}

#[must_use]
pub fn drain() -> Vec<String> {
    TL_SINK.with(|s| match s.borrow_mut().as_mut() {
        Some(buf) => std::mem::take(buf),
        None => Vec::new(),
    })
}

#[must_use]
pub fn snapshot() -> Vec<String> {
    TL_SINK.with(|s| s.borrow().as_ref().cloned().unwrap_or_default())
}

/// Emits a developer trace message, captured by the thread-local sink if
/// enabled and also routed through the global logger at `TRACE`.
#[macro_export]
macro_rules! trace_dev {
    ($($arg:tt)*) => {{
        let __s = format!($($arg)*);
        $crate::devlog::write_str(&__s);
        log::log!(target: "casfs::trace", log::Level::Trace, "{}", __s);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_local_sink_captures_messages() {
        let _g = enable_thread_sink();
        crate::trace_dev!("alpha {}", 1);
        crate::trace_dev!("beta");
        let snap = snapshot();
        assert!(snap.iter().any(|s| s.contains("alpha 1")));
        assert!(snap.iter().any(|s| s.contains("beta")));
        let drained = drain();
        assert!(drained.len() >= 2);
        assert!(snapshot().is_empty());
    }

    #[test]
    fn isolation_between_threads() {
        let _g = enable_thread_sink();
        crate::trace_dev!("main-thread");
        let handle = std::thread::spawn(|| {
            crate::trace_dev!("child-thread");
            snapshot()
        });
        let child_snap = handle.join().unwrap();
        assert!(child_snap.is_empty());
        assert!(snapshot().iter().any(|s| s.contains("main-thread")));
    }
}
