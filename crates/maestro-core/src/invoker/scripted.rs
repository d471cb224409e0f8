//! In-memory invoker with scripted replies.
//!
//! Used by `maestro run --dry-run` and by tests. Unscripted targets echo the
//! request back as `[<target>] <message>`. Every call is recorded with the
//! tokio clock so backoff timing can be asserted under a paused runtime.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{AgentInvoker, AgentRequest, AgentResponse};
use crate::error::{InvocationError, SessionError};

#[derive(Debug, Clone)]
enum Reply {
    Respond(AgentResponse),
    Fail(String),
}

#[derive(Debug, Default)]
struct TargetScript {
    queue: VecDeque<Reply>,
    standing: Option<Reply>,
    delay: Option<Duration>,
}

/// A call observed by the [`ScriptedInvoker`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: AgentRequest,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct SessionBook {
    next_id: u64,
    open: HashSet<String>,
    closed: HashSet<String>,
    close_calls: usize,
    fail_open: bool,
    fail_close: bool,
    open_delay: Option<Duration>,
    close_delay: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<String, TargetScript>>,
    calls: Mutex<Vec<RecordedCall>>,
    sessions: Mutex<SessionBook>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text reply for the next unconsumed call to `target_id`.
    pub fn reply(&self, target_id: &str, text: &str) -> &Self {
        self.push(target_id, Reply::Respond(AgentResponse::Text(text.to_string())))
    }

    /// Queue a structured or text reply.
    pub fn reply_with(&self, target_id: &str, response: AgentResponse) -> &Self {
        self.push(target_id, Reply::Respond(response))
    }

    /// Queue a failure for the next unconsumed call to `target_id`.
    pub fn fail(&self, target_id: &str, cause: &str) -> &Self {
        self.push(target_id, Reply::Fail(cause.to_string()))
    }

    /// Reply with `text` once the queue for `target_id` is drained.
    pub fn always_reply(&self, target_id: &str, text: &str) -> &Self {
        self.with_script(target_id, |script| {
            script.standing = Some(Reply::Respond(AgentResponse::Text(text.to_string())));
        })
    }

    /// Fail every call once the queue for `target_id` is drained.
    pub fn always_fail(&self, target_id: &str, cause: &str) -> &Self {
        self.with_script(target_id, |script| {
            script.standing = Some(Reply::Fail(cause.to_string()));
        })
    }

    /// Make every call to `target_id` take `delay` before replying.
    pub fn delay(&self, target_id: &str, delay: Duration) -> &Self {
        self.with_script(target_id, |script| script.delay = Some(delay))
    }

    pub fn fail_open_sessions(&self) -> &Self {
        self.book().fail_open = true;
        self
    }

    pub fn fail_close_sessions(&self) -> &Self {
        self.book().fail_close = true;
        self
    }

    /// Make `open_session` take `delay` before the session exists.
    pub fn delay_open(&self, delay: Duration) -> &Self {
        self.book().open_delay = Some(delay);
        self
    }

    /// Make `close_session` take `delay` before the session is closed.
    pub fn delay_close(&self, delay: Duration) -> &Self {
        self.book().close_delay = Some(delay);
        self
    }

    /// Every invocation so far, in dispatch order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, target_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.request.target_id == target_id)
            .count()
    }

    /// Number of `close_session` calls received, including repeats.
    pub fn close_calls(&self) -> usize {
        self.book().close_calls
    }

    pub fn open_sessions(&self) -> usize {
        self.book().open.len()
    }

    /// Sessions that were open and have been closed.
    pub fn closed_sessions(&self) -> usize {
        self.book().closed.len()
    }

    fn push(&self, target_id: &str, reply: Reply) -> &Self {
        self.with_script(target_id, |script| script.queue.push_back(reply))
    }

    fn with_script(&self, target_id: &str, f: impl FnOnce(&mut TargetScript)) -> &Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            f(scripts.entry(target_id.to_string()).or_default());
        }
        self
    }

    fn book(&self) -> std::sync::MutexGuard<'_, SessionBook> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_reply(&self, request: &AgentRequest) -> (Option<Duration>, Reply) {
        let echo = || {
            Reply::Respond(AgentResponse::Text(format!(
                "[{}] {}",
                request.target_id, request.message
            )))
        };
        let Ok(mut scripts) = self.scripts.lock() else {
            return (None, echo());
        };
        match scripts.get_mut(&request.target_id) {
            Some(script) => {
                let reply = script
                    .queue
                    .pop_front()
                    .or_else(|| script.standing.clone())
                    .unwrap_or_else(echo);
                (script.delay, reply)
            }
            None => (None, echo()),
        }
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentResponse, InvocationError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                request: request.clone(),
                at: Instant::now(),
            });
        }

        let (delay, reply) = self.next_reply(request);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Reply::Respond(response) => Ok(response),
            Reply::Fail(cause) => Err(InvocationError::new(&request.target_id, cause)),
        }
    }

    async fn open_session(&self) -> Result<String, SessionError> {
        let delay = self.book().open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut book = self.book();
        if book.fail_open {
            return Err(SessionError::Open("scripted open failure".to_string()));
        }
        book.next_id += 1;
        let id = format!("session-{}", book.next_id);
        book.open.insert(id.clone());
        Ok(id)
    }

    async fn close_session(&self, session_id: &str) -> Result<bool, SessionError> {
        let delay = {
            let mut book = self.book();
            book.close_calls += 1;
            book.close_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut book = self.book();
        if book.fail_close {
            return Err(SessionError::Close {
                session_id: session_id.to_string(),
                cause: "scripted close failure".to_string(),
            });
        }
        if book.open.remove(session_id) {
            book.closed.insert(session_id.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unscripted_target_echoes() {
        let invoker = ScriptedInvoker::new();
        let response = invoker.invoke(&AgentRequest::new("100", "ping")).await.unwrap();
        assert_eq!(response.text(), "[100] ping");
    }

    #[tokio::test]
    async fn queue_is_consumed_before_standing_reply() {
        let invoker = ScriptedInvoker::new();
        invoker.fail("100", "boom").always_reply("100", "steady");

        let first = invoker.invoke(&AgentRequest::new("100", "a")).await;
        let second = invoker.invoke(&AgentRequest::new("100", "b")).await;

        assert_eq!(first.unwrap_err().cause, "boom");
        assert_eq!(second.unwrap().text(), "steady");
        assert_eq!(invoker.call_count("100"), 2);
    }

    #[tokio::test]
    async fn closing_twice_reports_already_closed() {
        let invoker = ScriptedInvoker::new();
        let id = invoker.open_session().await.unwrap();

        assert_eq!(invoker.close_session(&id).await, Ok(true));
        assert_eq!(invoker.close_session(&id).await, Ok(false));
        assert_eq!(invoker.close_calls(), 2);
        assert_eq!(invoker.closed_sessions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_close_finishes_after_the_delay() {
        let invoker = ScriptedInvoker::new();
        invoker.delay_close(Duration::from_secs(5));
        let id = invoker.open_session().await.unwrap();

        let started = Instant::now();
        assert_eq!(invoker.close_session(&id).await, Ok(true));

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(invoker.open_sessions(), 0);
        assert_eq!(invoker.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn closing_unknown_session_is_not_an_error() {
        let invoker = ScriptedInvoker::new();
        assert_eq!(invoker.close_session("nope").await, Ok(false));
    }
}
