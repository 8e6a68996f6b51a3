/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Per-question lifecycle: id allocation, dual-write to Local and Remote
//! stores, cancellation, and status transitions. See [`RequestController`].

mod ai_provider;
mod controller;
mod error;
mod escape;
mod model;
mod shell_runner;

pub use ai_provider::{AiOutcome, AiProvider, ConversationTurn};
pub use controller::{extract_answer_text, RequestController};
pub use error::{RequestControllerError, Result};
pub use escape::EscapeTracker;
pub use model::{AskOutcome, CANCELLED_RESPONSE, ESC_RING_MARKER, INTERRUPTED_HISTORY_MARKER};
pub use shell_runner::ShellRunner;
