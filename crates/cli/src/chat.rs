/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use anyhow::Result;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyModifiers};
use crossterm::terminal;
use history_view::HistoryView;
use local_store::HistoryFilter;
use remote_store::Scope;
use request_controller::{EscapeTracker, RequestController};
use rustyline::error::ReadlineError;
use rustyline::{
    Cmd, ConditionalEventHandler, DefaultEditor, Event as RlEvent, EventContext, EventHandler,
    KeyEvent, Movement, RepeatCount,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

const CTRLC_EXIT_WINDOW: Duration = Duration::from_secs(2);

/// Interactive `chat` session implementing the keyboard contract of spec
/// §6: `Enter` submits, trailing `\` continues the line, `ESC`
/// cancels an in-flight request (double `ESC` within 500 ms instead
/// clears the input - handled by [`EscapeTracker`]), `Ctrl-C` arms exit
/// and a second press within 2 s exits, `↑`/`↓` walk line history, and
/// `/help`/`/clear`/`/history`/`/status`/`/exit` are meta-commands.
///
/// `rustyline` owns the terminal while reading a line (grounded on the
/// teacher's own `examples/twodle`, which depends on it for the same
/// reason); the moment a line is submitted, the terminal is idle until the
/// response comes back, so that window is where a `crossterm` raw-mode
/// watcher polls for `ESC`/`Ctrl-C` to cancel the in-flight request. The
/// two libraries never hold the terminal at the same time, so each gets
/// its own independent [`EscapeTracker`]: `rustyline`'s bound key handler
/// below tracks double-`ESC` while a line is being composed, and
/// [`watch_for_cancel_keys`]'s tracks it while a request is in flight.
/// Returns `Ok(true)` if the session ended via a double `Ctrl-C` (spec
/// §6's exit code 130), `Ok(false)` for `/exit`, EOF, or a readline
/// error (all ordinary exit code 0 per spec).
pub async fn run(controller: Arc<RequestController>, view: Arc<HistoryView>) -> Result<bool> {
    let mut rl = DefaultEditor::new()?;
    rl.bind_sequence(
        KeyEvent(rustyline::KeyCode::Esc, rustyline::Modifiers::NONE),
        EventHandler::Conditional(Box::new(ClearLineOnDoubleEscape::new())),
    );
    let mut ctrlc_armed_at: Option<Instant> = None;
    let mut continuation = String::new();

    println!("mcp-terminal - type a question, or /help for meta-commands.");

    loop {
        let prompt = if continuation.is_empty() { "> " } else { "... " };
        match rl.readline(prompt) {
            Ok(line) => {
                ctrlc_armed_at = None;
                if let Some(head) = line.strip_suffix('\\') {
                    continuation.push_str(head);
                    continuation.push('\n');
                    continue;
                }
                let full_line = if continuation.is_empty() {
                    line
                } else {
                    let joined = format!("{continuation}{line}");
                    continuation.clear();
                    joined
                };
                if full_line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(full_line.as_str());

                if full_line.starts_with('/') {
                    if !handle_meta_command(&full_line, &controller, &view).await? {
                        return Ok(false);
                    }
                    continue;
                }
                run_one_question(&controller, &full_line).await;
            }
            Err(ReadlineError::Interrupted) => {
                let now = Instant::now();
                let should_exit = matches!(ctrlc_armed_at, Some(at) if now.duration_since(at) < CTRLC_EXIT_WINDOW);
                if should_exit {
                    println!("exiting.");
                    return Ok(true);
                }
                println!("(Ctrl-C again within 2s to exit)");
                ctrlc_armed_at = Some(now);
            }
            Err(ReadlineError::Eof) => return Ok(false),
            Err(e) => {
                log::error!("readline error: {e}");
                return Ok(false);
            }
        }
    }
}

/// Returns `false` when `/exit` was given, `true` otherwise.
async fn handle_meta_command(line: &str, controller: &Arc<RequestController>, view: &Arc<HistoryView>) -> Result<bool> {
    match line.trim() {
        "/help" => {
            println!("/help     show this message");
            println!("/clear    clear the screen");
            println!("/history  show recent history");
            println!("/status   show the current request's status");
            println!("/exit     quit");
        }
        "/clear" => {
            print!("\x1b[2J\x1b[H");
        }
        "/history" => {
            let filter = HistoryFilter::default();
            match view.get(Scope::Hybrid, &filter, 10, 0).await {
                Ok(entries) if entries.is_empty() => println!("(no history)"),
                Ok(entries) => {
                    for entry in entries {
                        println!("[{}] {} ({})", entry.id, entry.command, entry.status.as_str());
                    }
                }
                Err(e) => println!("failed to load history: {e}"),
            }
        }
        "/status" => match controller.current_request_id().await {
            Some(id) => println!("in flight: {id}"),
            None => println!("idle"),
        },
        "/exit" => return Ok(false),
        other => println!("unknown meta-command: {other}"),
    }
    Ok(true)
}

async fn run_one_question(controller: &Arc<RequestController>, question: &str) {
    let ask_controller = Arc::clone(controller);
    let q = question.to_string();
    let ask_task = tokio::spawn(async move { ask_controller.ask(&q).await });

    let watch_controller = Arc::clone(controller);
    let stop = Arc::new(AtomicBool::new(false));
    let watch_stop = Arc::clone(&stop);
    let watcher = tokio::task::spawn_blocking(move || watch_for_cancel_keys(watch_controller, watch_stop));

    let outcome = ask_task.await;
    stop.store(true, Ordering::Relaxed);
    let _ = watcher.await;

    match outcome {
        Ok(Ok(outcome)) => println!("{}", outcome.response),
        Ok(Err(e)) => println!("error: {e}"),
        Err(e) => log::error!("ask task panicked: {e}"),
    }
}

/// Polls for `ESC`/`Ctrl-C` in raw mode while a request is in flight,
/// cancelling it via [`RequestController::cancel`] on either. Runs on a
/// blocking-pool thread (see [`run_one_question`]); `Handle::block_on` is
/// safe to call here because this thread is not one of the runtime's
/// async worker threads.
fn watch_for_cancel_keys(controller: Arc<RequestController>, stop: Arc<AtomicBool>) {
    let Ok(_guard) = RawModeGuard::enable() else {
        return;
    };
    let mut escape_tracker = EscapeTracker::new();
    let handle = tokio::runtime::Handle::current();

    while !stop.load(Ordering::Relaxed) {
        match event::poll(Duration::from_millis(100)) {
            Ok(true) => {
                if let Ok(CEvent::Key(key)) = event::read() {
                    let wants_cancel = match key.code {
                        KeyCode::Esc => !escape_tracker.record(),
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => true,
                        _ => false,
                    };
                    if wants_cancel {
                        if let Some(id) = handle.block_on(controller.current_request_id()) {
                            handle.block_on(controller.cancel(&id));
                        }
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                log::warn!("key-watcher poll failed, giving up for this request: {e}");
                break;
            }
        }
    }
}

/// Bound to `ESC` on the `rustyline` editor so the clear-input gesture
/// works while a line is still being composed, not just after it's
/// submitted (that's [`watch_for_cancel_keys`]'s job, and it only starts
/// once a request is in flight). A single `ESC` here does nothing and
/// falls through to `rustyline`'s default handling - there's no in-flight
/// request yet for it to cancel.
struct ClearLineOnDoubleEscape {
    tracker: StdMutex<EscapeTracker>,
}

impl ClearLineOnDoubleEscape {
    fn new() -> Self {
        Self { tracker: StdMutex::new(EscapeTracker::new()) }
    }
}

impl ConditionalEventHandler for ClearLineOnDoubleEscape {
    fn handle(&self, _evt: &RlEvent, _n: RepeatCount, _positive: bool, _ctx: &EventContext<'_>) -> Option<Cmd> {
        let is_double = self.tracker.lock().unwrap().record();
        is_double.then_some(Cmd::Kill(Movement::WholeLine))
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
