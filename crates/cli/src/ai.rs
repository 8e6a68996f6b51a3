/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use async_trait::async_trait;
use interrupt_support::{Interruptee, TaskToken};
use request_controller::{AiOutcome, AiProvider, ConversationTurn};

/// The real AI backend is an out-of-scope external collaborator (spec
/// §1). Shipping a default that actually executes the user's question -
/// e.g. as a shell command - would be an inappropriate default for a
/// terminal assistant with no backend configured, so this binary ships a
/// safe no-op provider instead: every question gets a fixed explanatory
/// answer, never an error (so the request still reaches `Completed`, not
/// stuck `Processing`/`Error`), and a real `AiProvider` is meant to
/// replace this at the point this binary is wired into an actual model.
pub struct NullAiProvider;

#[async_trait]
impl AiProvider for NullAiProvider {
    async fn ask(&self, _question: &str, _history: &[ConversationTurn], cancel: TaskToken) -> AiOutcome {
        if cancel.was_interrupted() {
            return AiOutcome::Cancelled;
        }
        AiOutcome::Answer(serde_json::json!({
            "text": "No AI backend is configured. Set one up and swap NullAiProvider for a real AiProvider implementation.",
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use interrupt_support::Interruptee;

    #[tokio::test]
    async fn answers_when_not_cancelled() {
        let outcome = NullAiProvider.ask("hi", &[], TaskToken::new()).await;
        assert!(matches!(outcome, AiOutcome::Answer(_)));
    }

    #[tokio::test]
    async fn reports_cancelled_when_token_is_interrupted() {
        let token = TaskToken::new();
        token.interrupt();
        assert!(token.was_interrupted());
        let outcome = NullAiProvider.ask("hi", &[], token).await;
        assert!(matches!(outcome, AiOutcome::Cancelled));
    }
}
