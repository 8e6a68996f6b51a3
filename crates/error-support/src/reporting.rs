/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;

/// Counter stamped onto each breadcrumb so out-of-order delivery is visible
/// in whatever sink the application wires up.
static BREADCRUMB_COUNTER: AtomicU32 = AtomicU32::new(0);

fn next_breadcrumb_counter() -> u32 {
    BREADCRUMB_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Application-supplied error reporting sink.
///
/// The CLI binary installs one of these via [`set_application_error_reporter`]
/// so that `request-controller`/`sync-engine` errors surface somewhere other
/// than stderr (in practice, the `EventBus`).
pub trait ApplicationErrorReporter: Sync + Send {
    /// Report an error. `type_name` groups related errors together.
    fn report_error(&self, type_name: String, message: String);
    /// Report a breadcrumb: a low-severity trace of what led up to an error.
    fn report_breadcrumb(&self, message: String, module: String, line: u32, column: u32);
}

struct DefaultApplicationErrorReporter;
impl ApplicationErrorReporter for DefaultApplicationErrorReporter {
    fn report_error(&self, _type_name: String, _message: String) {}
    fn report_breadcrumb(&self, _message: String, _module: String, _line: u32, _column: u32) {}
}

lazy_static::lazy_static! {
    static ref APPLICATION_ERROR_REPORTER: RwLock<Box<dyn ApplicationErrorReporter>> =
        RwLock::new(Box::new(DefaultApplicationErrorReporter));
}

pub fn set_application_error_reporter(reporter: Box<dyn ApplicationErrorReporter>) {
    *APPLICATION_ERROR_REPORTER.write() = reporter;
}

pub fn unset_application_error_reporter() {
    *APPLICATION_ERROR_REPORTER.write() = Box::new(DefaultApplicationErrorReporter);
}

pub fn report_error_to_app(type_name: String, message: String) {
    APPLICATION_ERROR_REPORTER
        .read()
        .report_error(type_name, message);
}

pub fn report_breadcrumb(message: String, module: String, line: u32, column: u32) {
    let message = format!("{message} ({})", next_breadcrumb_counter());
    RECENT_BREADCRUMBS.lock().push(message.clone());
    APPLICATION_ERROR_REPORTER
        .read()
        .report_breadcrumb(message, module, line, column);
}

/// Returns the most recent breadcrumbs, oldest first, for inclusion in an
/// error report (e.g. attached to a `SchemaMissing` or `AIError` report).
pub fn recent_breadcrumbs() -> Vec<String> {
    RECENT_BREADCRUMBS.lock().snapshot()
}

static RECENT_BREADCRUMBS: Mutex<BreadcrumbRingBuffer> = Mutex::new(BreadcrumbRingBuffer::new());

/// Fixed-capacity ring buffer of the most recently reported breadcrumbs.
#[derive(Default)]
struct BreadcrumbRingBuffer {
    breadcrumbs: Vec<String>,
    pos: usize,
}

impl BreadcrumbRingBuffer {
    const MAX_ITEMS: usize = 20;

    const fn new() -> Self {
        Self {
            breadcrumbs: Vec::new(),
            pos: 0,
        }
    }

    fn push(&mut self, breadcrumb: impl Into<String>) {
        let breadcrumb = breadcrumb.into();
        if self.breadcrumbs.len() < Self::MAX_ITEMS {
            self.breadcrumbs.push(breadcrumb);
        } else {
            self.breadcrumbs[self.pos] = breadcrumb;
            self.pos = (self.pos + 1) % Self::MAX_ITEMS;
        }
    }

    fn snapshot(&self) -> Vec<String> {
        let mut breadcrumbs = self.breadcrumbs[self.pos..].to_vec();
        breadcrumbs.extend(self.breadcrumbs[..self.pos].iter().cloned());
        breadcrumbs
    }
}

/// Test double that captures reported errors instead of discarding them.
#[derive(Default)]
pub struct TestErrorReporter {
    errors: StdMutex<Vec<(String, String)>>,
}

impl TestErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors.lock().unwrap().clone()
    }
}

impl ApplicationErrorReporter for TestErrorReporter {
    fn report_error(&self, type_name: String, message: String) {
        self.errors.lock().unwrap().push((type_name, message));
    }
    fn report_breadcrumb(&self, _message: String, _module: String, _line: u32, _column: u32) {}
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ring_buffer_wraps_after_capacity() {
        let mut buf = BreadcrumbRingBuffer::default();
        for i in 0..25 {
            buf.push(format!("{i:02}"));
        }
        let snap = buf.snapshot();
        assert_eq!(snap.len(), BreadcrumbRingBuffer::MAX_ITEMS);
        assert_eq!(snap.first().unwrap(), "05");
        assert_eq!(snap.last().unwrap(), "24");
    }
}
