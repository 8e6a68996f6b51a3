/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use async_trait::async_trait;
use interrupt_support::TaskToken;
use serde_json::Value;

/// One turn of prior conversation fed back to the AI as context.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

/// Result of a single AI call.
#[derive(Debug, Clone)]
pub enum AiOutcome {
    /// Raw provider payload; the caller extracts the displayable text (see
    /// [`crate::controller::extract_answer_text`]).
    Answer(Value),
    Cancelled,
    Error(String),
}

/// The external AI provider capability. Implementations own whatever SDK
/// or HTTP client talks to the actual model; this crate only needs the
/// cancellation contract: `cancel.was_interrupted()` must be checked (or
/// the cancellation propagated to whatever `.await` point can observe it)
/// so an aborted call returns promptly.
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn ask(
        &self,
        question: &str,
        history: &[ConversationTurn],
        cancel: TaskToken,
    ) -> AiOutcome;
}
