/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Shared error reporting/handling glue used by every crate in the
//! workspace. This is the non-FFI subset of the teacher's `error-support`
//! crate: the `uniffi`-facing callback interface and the `handle_error`
//! proc-macro are dropped since nothing here crosses a foreign-function
//! boundary (see DESIGN.md).

mod handling;
mod redact;
mod reporting;

pub use handling::{convert_log_report_error, ErrorHandling, ErrorReporting, GetErrorHandling};
pub use redact::redact_for_log;
pub use reporting::{
    recent_breadcrumbs, report_breadcrumb, report_error_to_app, set_application_error_reporter,
    unset_application_error_reporter, ApplicationErrorReporter, TestErrorReporter,
};

/// Record a breadcrumb at the call site's module/line, mirroring the
/// teacher's `error_support::breadcrumb!` usage pattern.
#[macro_export]
macro_rules! breadcrumb {
    ($($arg:tt)*) => {
        $crate::report_breadcrumb(format!($($arg)*), module_path!().to_string(), line!(), column!())
    };
}
