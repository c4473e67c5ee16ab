use std::sync::Mutex;

use super::ports::History;

#[derive(Debug, Default)]
struct Entries {
    stack: Vec<String>,
    cursor: usize,
}

/// In-process history stack with back/forward navigation.
#[derive(Debug)]
pub struct MemoryHistory {
    inner: Mutex<Entries>,
}

impl MemoryHistory {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Entries {
                stack: vec![initial.into()],
                cursor: 0,
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Entries) -> R) -> R {
        // A poisoned lock only means a panic mid-update of plain strings.
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Step back one entry, returning the new location.
    pub fn back(&self) -> Option<String> {
        self.with(|h| {
            if h.cursor == 0 {
                return None;
            }
            h.cursor -= 1;
            Some(h.stack[h.cursor].clone())
        })
    }

    pub fn forward(&self) -> Option<String> {
        self.with(|h| {
            if h.cursor + 1 >= h.stack.len() {
                return None;
            }
            h.cursor += 1;
            Some(h.stack[h.cursor].clone())
        })
    }

    /// Number of entries up to and including the current one.
    pub fn depth(&self) -> usize {
        self.with(|h| h.cursor + 1)
    }

    pub fn entries(&self) -> Vec<String> {
        self.with(|h| h.stack.clone())
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new("")
    }
}

impl History for MemoryHistory {
    fn read_location(&self) -> String {
        self.with(|h| h.stack[h.cursor].clone())
    }

    fn replace_location(&self, fragment: &str) {
        self.with(|h| h.stack[h.cursor] = fragment.to_string());
    }

    fn push_location(&self, fragment: &str) {
        self.with(|h| {
            h.stack.truncate(h.cursor + 1);
            h.stack.push(fragment.to_string());
            h.cursor += 1;
        });
    }
}
