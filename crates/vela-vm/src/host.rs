//! Host-supplied callbacks.

use std::io::{Read, Write};

use crate::frame::{Frame, TraceEvent};

/// Debug/profiling hook invoked on trace events.
pub type TraceFn = Box<dyn FnMut(TraceEvent, &Frame)>;

/// Callback table a host installs per context.
pub struct Callbacks {
    /// Loads module source by relative file path, e.g. `pkg/mod.py`.
    pub import_file: Box<dyn FnMut(&str) -> Option<String>>,
    /// Print sink used by `print` and exception reports.
    pub print: Box<dyn FnMut(&str)>,
    /// Character input source; `None` at end of input.
    pub getchar: Box<dyn FnMut() -> Option<u8>>,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            import_file: Box::new(|path: &str| std::fs::read_to_string(path).ok()),
            print: Box::new(|s: &str| {
                let mut out = std::io::stdout();
                let _ = out.write_all(s.as_bytes());
                let _ = out.flush();
            }),
            getchar: Box::new(|| {
                let mut buf = [0u8; 1];
                match std::io::stdin().read(&mut buf) {
                    Ok(1) => Some(buf[0]),
                    _ => None,
                }
            }),
        }
    }
}
