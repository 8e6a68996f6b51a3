/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::ai_provider::{AiOutcome, AiProvider, ConversationTurn};
use crate::error::{RequestControllerError, Result};
use crate::model::{
    ActiveRequest, AskOutcome, CANCELLED_RESPONSE, ESC_RING_MARKER, INTERRUPTED_HISTORY_MARKER,
};
use crate::shell_runner::ShellRunner;
use event_bus::{Event, EventBus};
use local_store::{HistoryFilter, HistoryStatus, LocalStore, NewCommandMeta};
use pattern_planner::{Plan, Planner};
use rand::Rng;
use remote_store::{NewRemoteCommand, RemoteStore, Scope, StatusUpdateExtras};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

const RECENT_ESCAPE_RING_CAPACITY: usize = 20;
const DEFAULT_HISTORY_WINDOW: usize = 10;
/// Per-command timeout for pattern-planner probe steps (spec §5's "shell
/// sub-process 30 s").
const PATTERN_STEP_TIMEOUT: Duration = Duration::from_secs(30);
/// Defensive bound on plan-resolution iterations: a well-formed plan
/// finishes in at most `sequence.len()` iterations, this just stops a
/// malformed pattern (e.g. a dynamic step that never empties) from
/// looping forever.
const MAX_PATTERN_STEPS: usize = 64;

/// Drives a question through the AI provider to a terminal status,
/// recording the attempt in both stores. See crate docs for the full
/// lifecycle; see `ask`/`cancel` for the two public operations.
pub struct RequestController {
    local: Arc<StdMutex<LocalStore>>,
    remote: Arc<RemoteStore>,
    ai: Arc<dyn AiProvider>,
    events: EventBus,
    planner: Option<Arc<Planner>>,
    shell: Option<Arc<dyn ShellRunner>>,
    scope: Scope,
    session_id: String,
    user_id: Option<i64>,
    machine_id: Option<String>,
    history_window: usize,

    active: AsyncMutex<HashMap<String, ActiveRequest>>,
    current_request: AsyncMutex<Option<String>>,
    /// Markers that need to reach the *next* `build_history` call even if
    /// the DB write recording a cancellation hasn't landed yet.
    recent_escapes: AsyncMutex<VecDeque<String>>,
}

impl RequestController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local: Arc<StdMutex<LocalStore>>,
        remote: Arc<RemoteStore>,
        ai: Arc<dyn AiProvider>,
        events: EventBus,
        planner: Option<Arc<Planner>>,
        shell: Option<Arc<dyn ShellRunner>>,
        scope: Scope,
        session_id: String,
        user_id: Option<i64>,
        machine_id: Option<String>,
    ) -> Self {
        Self {
            local,
            remote,
            ai,
            events,
            planner,
            shell,
            scope,
            session_id,
            user_id,
            machine_id,
            history_window: DEFAULT_HISTORY_WINDOW,
            active: AsyncMutex::new(HashMap::new()),
            current_request: AsyncMutex::new(None),
            recent_escapes: AsyncMutex::new(VecDeque::new()),
        }
    }

    /// Which concrete Remote tables a write under the configured scope
    /// targets. `Hybrid` fans out to global + machine, plus user when one
    /// is set (GLOSSARY "hybrid mode").
    fn target_scopes(&self) -> Vec<Scope> {
        match self.scope {
            Scope::Hybrid => {
                let mut scopes = vec![Scope::Global, Scope::Machine];
                if self.user_id.is_some() {
                    scopes.push(Scope::User);
                }
                scopes
            }
            other => vec![other],
        }
    }

    pub async fn ask(&self, question: &str) -> Result<AskOutcome> {
        if question.trim().is_empty() {
            return Err(RequestControllerError::BadInput);
        }

        let request_id = allocate_request_id();
        let ai_cancel = interrupt_support::TaskToken::new();
        let db_cancel = { self.local.lock().unwrap().new_interrupt_handle() };

        self.preempt_previous_request().await;

        self.active.lock().await.insert(
            request_id.clone(),
            ActiveRequest {
                status: HistoryStatus::Pending,
                command: question.to_string(),
                ai_cancel: ai_cancel.clone(),
                db_cancel,
                turso_id: Vec::new(),
                started_at: now_secs(),
            },
        );
        *self.current_request.lock().await = Some(request_id.clone());
        self.publish_status(&request_id, HistoryStatus::Pending);

        let turso_ids = self.persist_pending(&request_id, question).await?;

        // Re-check cancellation immediately after the save completes.
        if self.is_cancelled(&request_id).await {
            self.finalize_cancellation(&request_id, &turso_ids).await;
            self.active.lock().await.remove(&request_id);
            return Ok(AskOutcome {
                request_id,
                status: HistoryStatus::Cancelled,
                response: CANCELLED_RESPONSE.to_string(),
            });
        }

        let pattern_context = self.consult_pattern_planner(question).await;

        self.transition_to_processing(&request_id).await;

        let mut history = self.build_history().await;
        if let Some(value) = pattern_context {
            history.push(ConversationTurn {
                question: String::new(),
                answer: format!("[pattern planner context] {value}"),
            });
        }
        let outcome = self.ai.ask(question, &history, ai_cancel).await;

        // Primary source of truth for cancellation is the in-process map,
        // not the DB, to avoid a round-trip latency race.
        if self.is_cancelled(&request_id).await {
            self.active.lock().await.remove(&request_id);
            return Ok(AskOutcome {
                request_id,
                status: HistoryStatus::Cancelled,
                response: CANCELLED_RESPONSE.to_string(),
            });
        }

        let (status, response) = match outcome {
            AiOutcome::Answer(value) => (HistoryStatus::Completed, extract_answer_text(&value)),
            AiOutcome::Cancelled => (HistoryStatus::Cancelled, CANCELLED_RESPONSE.to_string()),
            AiOutcome::Error(err) => (HistoryStatus::Error, err),
        };

        self.complete(&request_id, status, &response, &turso_ids).await;
        self.active.lock().await.remove(&request_id);

        Ok(AskOutcome {
            request_id,
            status,
            response,
        })
    }

    /// The in-flight request's id, if any - lets a UI layer holding no
    /// other handle on the request know what to pass to `cancel`.
    pub async fn current_request_id(&self) -> Option<String> {
        self.current_request.lock().await.clone()
    }

    /// Single ESC: marks the request cancelled in the active map
    /// immediately, aborts only the AI token, and schedules (but doesn't
    /// wait for) the Remote status update.
    pub async fn cancel(&self, request_id: &str) {
        let (turso_ids, already_terminal) = {
            let mut active = self.active.lock().await;
            match active.get_mut(request_id) {
                Some(req) if !req.status.is_terminal() => {
                    req.status = HistoryStatus::Cancelled;
                    req.ai_cancel.interrupt();
                    (req.turso_id.clone(), false)
                }
                Some(req) => (req.turso_id.clone(), true),
                None => return,
            }
        };
        if already_terminal {
            return;
        }

        self.publish_status(request_id, HistoryStatus::Cancelled);

        {
            let local = self.local.lock().unwrap();
            let _ = local.update_status_by_request_id(
                request_id,
                HistoryStatus::Cancelled,
                Some(CANCELLED_RESPONSE),
            );
        }

        self.push_escape_marker().await;

        // Fire-and-forget: the active map is authoritative, Remote catches up.
        let remote = Arc::clone(&self.remote);
        let request_id_owned = request_id.to_string();
        tokio::spawn(async move {
            retry_remote_cancel(&remote, &request_id_owned, &turso_ids).await;
        });

        self.active.lock().await.remove(request_id);
    }

    async fn preempt_previous_request(&self) {
        let mut current = self.current_request.lock().await;
        if let Some(prev_id) = current.take() {
            let active = self.active.lock().await;
            if let Some(prev) = active.get(&prev_id) {
                if !prev.status.is_terminal() {
                    prev.ai_cancel.interrupt();
                }
            }
        }
    }

    async fn persist_pending(&self, request_id: &str, question: &str) -> Result<Vec<(Scope, i64)>> {
        let meta_remote = NewRemoteCommand {
            request_id: Some(request_id.to_string()),
            user_id: self.user_id,
            machine_id: self.machine_id.clone(),
            session_id: Some(self.session_id.clone()),
        };
        let turso_ids = match self
            .remote
            .save_fanout(&self.target_scopes(), question, None, meta_remote)
            .await
        {
            Ok(ids) => ids,
            Err(err) => {
                log::warn!("remote save failed, falling back to local-only write: {err}");
                Vec::new()
            }
        };
        if let Some(req) = self.active.lock().await.get_mut(request_id) {
            req.turso_id = turso_ids.clone();
        }

        // The fanout above already wrote Remote when it succeeds, so the
        // local row must not also enqueue a `sync_queue` upload - that
        // would either duplicate the row (tables with no unique index on
        // `request_id`) or hit a constraint error on every retry (tables
        // that do have one). Only a failed fanout needs the sync queue to
        // catch up later.
        let meta_local = NewCommandMeta {
            request_id: Some(request_id.to_string()),
            user_id: self.user_id,
            machine_id: self.machine_id.clone(),
            session_id: Some(self.session_id.clone()),
            already_synced: !turso_ids.is_empty(),
        };
        {
            let local = self.local.lock().unwrap();
            local
                .save_command(question, None, meta_local)
                .map_err(|e| RequestControllerError::Local(e.to_string()))?;
        }
        Ok(turso_ids)
    }

    async fn transition_to_processing(&self, request_id: &str) {
        if let Some(req) = self.active.lock().await.get_mut(request_id) {
            req.status = HistoryStatus::Processing;
        }
        let _ = self
            .remote
            .update_status_by_request_id(request_id, HistoryStatus::Processing, StatusUpdateExtras::default())
            .await;
        {
            let local = self.local.lock().unwrap();
            let _ = local.update_status_by_request_id(request_id, HistoryStatus::Processing, None);
        }
        self.publish_status(request_id, HistoryStatus::Processing);
    }

    async fn complete(&self, request_id: &str, status: HistoryStatus, response: &str, turso_ids: &[(Scope, i64)]) {
        {
            let local = self.local.lock().unwrap();
            let _ = local.update_status_by_request_id(request_id, status, Some(response));
        }
        let rows = self
            .remote
            .update_status_by_request_id(
                request_id,
                status,
                StatusUpdateExtras {
                    response: Some(response.to_string()),
                },
            )
            .await;
        if matches!(rows, Ok(0) | Err(_)) {
            for &(scope, id) in turso_ids {
                let _ = self
                    .remote
                    .update_status_by_id(
                        scope,
                        id,
                        status,
                        StatusUpdateExtras {
                            response: Some(response.to_string()),
                        },
                    )
                    .await;
            }
        }
        self.publish_status(request_id, status);
    }

    /// Cancellation observed right after the pending save: no AI call was
    /// ever made, so there's no late response to worry about, just a
    /// status transition to record on both stores.
    async fn finalize_cancellation(&self, request_id: &str, turso_ids: &[(Scope, i64)]) {
        self.complete(request_id, HistoryStatus::Cancelled, CANCELLED_RESPONSE, turso_ids)
            .await;
    }

    async fn is_cancelled(&self, request_id: &str) -> bool {
        self.active
            .lock()
            .await
            .get(request_id)
            .map(|req| req.status == HistoryStatus::Cancelled)
            .unwrap_or(false)
    }

    async fn push_escape_marker(&self) {
        let mut ring = self.recent_escapes.lock().await;
        if ring.len() == RECENT_ESCAPE_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(ESC_RING_MARKER.to_string());
    }

    /// Runs a matched pattern's probe steps through the shell runner,
    /// feeding each step's output back into the plan's context, and
    /// returns the plan's aggregated result for injection into the AI's
    /// conversation history. Returns `None` if no pattern matched, or no
    /// shell runner is configured to execute one.
    async fn consult_pattern_planner(&self, question: &str) -> Option<Value> {
        let planner = self.planner.as_ref()?;
        let shell = self.shell.as_ref()?;
        let mut plan = planner.match_question(question)?;
        log::debug!("pattern planner matched {:?} for question", plan.pattern_name);
        self.run_plan(&mut plan, shell.as_ref()).await;
        plan.aggregate()
    }

    async fn run_plan(&self, plan: &mut Plan, shell: &dyn ShellRunner) {
        for _ in 0..MAX_PATTERN_STEPS {
            if plan.is_complete() {
                break;
            }
            let Some(step_id) = plan.current_step_id() else {
                break;
            };
            let commands = plan.next_commands();
            if commands.is_empty() {
                break;
            }
            let mut last_output = String::new();
            for command in &commands {
                match shell.run(command, PATTERN_STEP_TIMEOUT).await {
                    Ok(output) => last_output = output,
                    Err(e) => {
                        log::warn!("pattern step {step_id} command {command:?} failed: {e}");
                    }
                }
            }
            if let Err(e) = plan.update_context(&step_id, &last_output) {
                log::warn!("pattern planner context update for {step_id} failed: {e}");
                break;
            }
        }
    }

    fn publish_status(&self, request_id: &str, status: HistoryStatus) {
        self.events.publish(Event::StatusChange {
            request_id: request_id.to_string(),
            status: status.as_str().to_string(),
        });
    }

    /// Last `history_window` local commands, oldest first, with cancelled
    /// entries replaced by the synthetic interrupted-marker text, plus any
    /// not-yet-persisted escape markers.
    async fn build_history(&self) -> Vec<ConversationTurn> {
        let mut entries = {
            let local = self.local.lock().unwrap();
            local
                .get_history(
                    &HistoryFilter {
                        user_id: self.user_id,
                        machine_id: self.machine_id.clone(),
                    },
                    self.history_window as i64,
                    0,
                )
                .unwrap_or_default()
        };
        entries.reverse();

        let mut turns: Vec<ConversationTurn> = entries
            .into_iter()
            .map(|entry| {
                let answer = if entry.status == HistoryStatus::Cancelled {
                    INTERRUPTED_HISTORY_MARKER.to_string()
                } else {
                    entry.response.unwrap_or_default()
                };
                ConversationTurn {
                    question: entry.command,
                    answer,
                }
            })
            .collect();

        let mut ring = self.recent_escapes.lock().await;
        while let Some(marker) = ring.pop_front() {
            turns.push(ConversationTurn {
                question: String::new(),
                answer: marker,
            });
        }
        turns
    }
}

async fn retry_remote_cancel(remote: &RemoteStore, request_id: &str, turso_ids: &[(Scope, i64)]) {
    let extras = StatusUpdateExtras {
        response: Some(CANCELLED_RESPONSE.to_string()),
    };
    let rows = remote
        .update_status_by_request_id(request_id, HistoryStatus::Cancelled, extras.clone())
        .await;
    if matches!(rows, Ok(0) | Err(_)) {
        for &(scope, id) in turso_ids {
            let _ = remote.update_status_by_id(scope, id, HistoryStatus::Cancelled, extras.clone()).await;
        }
    }
}

/// Prefers `directAnswer | response | message | output`, falls back to an
/// `error` field, falls back to the raw serialized payload.
pub fn extract_answer_text(value: &Value) -> String {
    for key in ["directAnswer", "response", "message", "output"] {
        if let Some(text) = value.get(key).and_then(Value::as_str) {
            return text.to_string();
        }
    }
    if let Some(text) = value.as_str() {
        return text.to_string();
    }
    if let Some(text) = value.get("error").and_then(Value::as_str) {
        return text.to_string();
    }
    value.to_string()
}

fn allocate_request_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let rand_suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("req_{millis}_{rand_suffix:09}")
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod test {
    use super::*;
    use async_trait::async_trait;
    use interrupt_support::Interruptee;
    use local_store::LocalStore;
    use remote_store::test_utils::connect_in_memory_with_schema;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct InstantAnswer(&'static str);

    #[async_trait]
    impl AiProvider for InstantAnswer {
        async fn ask(
            &self,
            _question: &str,
            _history: &[ConversationTurn],
            _cancel: interrupt_support::TaskToken,
        ) -> AiOutcome {
            AiOutcome::Answer(serde_json::json!({ "response": self.0 }))
        }
    }

    struct SlowCancellable {
        saw_cancel: Arc<AtomicBool>,
    }

    #[async_trait]
    impl AiProvider for SlowCancellable {
        async fn ask(
            &self,
            _question: &str,
            _history: &[ConversationTurn],
            cancel: interrupt_support::TaskToken,
        ) -> AiOutcome {
            for _ in 0..50 {
                if cancel.was_interrupted() {
                    self.saw_cancel.store(true, Ordering::SeqCst);
                    return AiOutcome::Cancelled;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            AiOutcome::Answer(serde_json::json!({ "response": "too slow" }))
        }
    }

    async fn controller_with(ai: Arc<dyn AiProvider>, events: EventBus) -> RequestController {
        let local = Arc::new(StdMutex::new(LocalStore::open_in_memory().unwrap()));
        let remote = Arc::new(connect_in_memory_with_schema().await.unwrap());
        RequestController::new(
            local,
            remote,
            ai,
            events,
            None,
            None,
            Scope::Global,
            "session-1".to_string(),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn happy_path_completes_with_extracted_response() {
        let controller = controller_with(Arc::new(InstantAnswer("use ls -la")), EventBus::new(16)).await;
        let outcome = controller.ask("list files").await.unwrap();
        assert_eq!(outcome.status, HistoryStatus::Completed);
        assert_eq!(outcome.response, "use ls -la");
        assert!(outcome.request_id.starts_with("req_"));
    }

    #[tokio::test]
    async fn empty_question_is_rejected_before_any_write() {
        let controller = controller_with(Arc::new(InstantAnswer("x")), EventBus::new(16)).await;
        assert!(matches!(
            controller.ask("   ").await,
            Err(RequestControllerError::BadInput)
        ));
    }

    #[tokio::test]
    async fn cancel_drops_the_late_answer_and_marks_the_request_cancelled() {
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let ai = Arc::new(SlowCancellable {
            saw_cancel: saw_cancel.clone(),
        });
        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let controller = Arc::new(controller_with(ai, events).await);

        let ctrl = Arc::clone(&controller);
        let handle = tokio::spawn(async move { ctrl.ask("a long question").await });

        let request_id = loop {
            match rx.recv().await.unwrap() {
                Event::StatusChange { request_id, .. } => break request_id,
                _ => continue,
            }
        };

        controller.cancel(&request_id).await;
        let outcome = handle.await.unwrap().unwrap();

        assert_eq!(outcome.status, HistoryStatus::Cancelled);
        assert_eq!(outcome.response, CANCELLED_RESPONSE);
        assert!(saw_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn remote_write_failure_falls_back_to_local_only_save() {
        let local = Arc::new(StdMutex::new(LocalStore::open_in_memory().unwrap()));
        // No schema created: every remote write fails, exercising the
        // graceful local-only fallback.
        let remote = Arc::new(RemoteStore::connect_in_memory().await.unwrap());
        let controller = RequestController::new(
            local.clone(),
            remote,
            Arc::new(InstantAnswer("ok")),
            EventBus::new(16),
            None,
            None,
            Scope::Global,
            "session-1".to_string(),
            None,
            None,
        );

        let outcome = controller.ask("a").await.unwrap();
        assert_eq!(outcome.status, HistoryStatus::Completed);

        let history = local
            .lock()
            .unwrap()
            .get_history(&HistoryFilter::default(), 10, 0)
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    struct RecordingAi {
        seen_history: StdMutex<Vec<ConversationTurn>>,
    }

    #[async_trait]
    impl AiProvider for RecordingAi {
        async fn ask(
            &self,
            _question: &str,
            history: &[ConversationTurn],
            _cancel: interrupt_support::TaskToken,
        ) -> AiOutcome {
            *self.seen_history.lock().unwrap() = history.to_vec();
            AiOutcome::Answer(serde_json::json!({ "response": "ack" }))
        }
    }

    struct FakeShell;

    #[async_trait]
    impl ShellRunner for FakeShell {
        async fn run(&self, command: &str, _timeout: Duration) -> std::result::Result<String, String> {
            Ok(format!("output of {command}"))
        }
    }

    #[tokio::test]
    async fn matched_pattern_context_is_injected_into_ai_history() {
        use pattern_planner::{Pattern, PatternStep, StepCommand};

        let mut planner = Planner::new();
        planner.register(
            Pattern::new(
                "disk-usage",
                regex::Regex::new("disk space").unwrap(),
                vec![PatternStep::new("df", StepCommand::Static("df -h".to_string())).extract_as("df")],
            )
            .with_aggregator(|ctx| ctx.get("df").cloned().unwrap_or(Value::Null)),
        );

        let local = Arc::new(StdMutex::new(LocalStore::open_in_memory().unwrap()));
        let remote = Arc::new(connect_in_memory_with_schema().await.unwrap());
        let ai = Arc::new(RecordingAi {
            seen_history: StdMutex::new(Vec::new()),
        });
        let controller = RequestController::new(
            local,
            remote,
            ai.clone(),
            EventBus::new(16),
            Some(Arc::new(planner)),
            Some(Arc::new(FakeShell)),
            Scope::Global,
            "session-1".to_string(),
            None,
            None,
        );

        controller.ask("how much disk space is left").await.unwrap();

        let history = ai.seen_history.lock().unwrap();
        assert!(history
            .iter()
            .any(|turn| turn.answer.contains("output of df -h")));
    }

    #[test]
    fn extract_answer_text_prefers_direct_answer_field() {
        let value = serde_json::json!({ "directAnswer": "a", "response": "b" });
        assert_eq!(extract_answer_text(&value), "a");
    }

    #[test]
    fn extract_answer_text_falls_back_to_serialized_payload() {
        let value = serde_json::json!({ "unexpected_shape": true });
        assert_eq!(extract_answer_text(&value), value.to_string());
    }
}
