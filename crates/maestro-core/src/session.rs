//! Conversation session lifecycle.
//!
//! A [`SessionGuard`] owns one session obtained from the invoker and releases
//! it exactly once: explicitly through [`SessionGuard::release`], or, if the
//! owning future is dropped first, from a background task spawned in `Drop`.
//! Release failures are reported to the observer and never returned.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{SessionError, WorkflowError};
use crate::invoker::AgentInvoker;
use crate::observer::{WorkflowEvent, WorkflowObserver};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

pub struct SessionGuard {
    session: ConversationSession,
    invoker: Arc<dyn AgentInvoker>,
    observer: Arc<dyn WorkflowObserver>,
    released: bool,
}

impl SessionGuard {
    /// Open a session on the invoker.
    ///
    /// The open runs as its own task and hands back a finished guard, so a
    /// caller dropped mid-open never strands the session: the unclaimed guard
    /// releases it on drop.
    pub async fn open(
        invoker: Arc<dyn AgentInvoker>,
        observer: Arc<dyn WorkflowObserver>,
    ) -> Result<Self, SessionError> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(Self::open_now(invoker, observer).await);
        });
        rx.await
            .map_err(|_| SessionError::Open("session open task ended before replying".to_string()))?
    }

    async fn open_now(
        invoker: Arc<dyn AgentInvoker>,
        observer: Arc<dyn WorkflowObserver>,
    ) -> Result<Self, SessionError> {
        let id = invoker.open_session().await?;
        observer.on_event(&WorkflowEvent::SessionOpened {
            session_id: id.clone(),
        });
        Ok(Self {
            session: ConversationSession {
                id,
                created_at: Utc::now(),
            },
            invoker,
            observer,
            released: false,
        })
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn id(&self) -> &str {
        &self.session.id
    }

    /// Release the session. Consumes the guard, so it can only happen once.
    ///
    /// The close runs as a spawned task; dropping this future does not cancel
    /// it.
    pub async fn release(mut self) {
        self.released = true;
        let session_id = self.session.id.clone();
        let task = tokio::spawn(close_and_report(
            self.invoker.clone(),
            self.observer.clone(),
            session_id.clone(),
        ));
        if let Err(e) = task.await {
            self.observer.on_event(&WorkflowEvent::SessionReleaseFailed {
                error: SessionError::Close {
                    session_id: session_id.clone(),
                    cause: format!("release task failed: {}", e),
                },
                session_id,
            });
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let invoker = self.invoker.clone();
        let observer = self.observer.clone();
        let session_id = self.session.id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(close_and_report(invoker, observer, session_id));
            }
            Err(_) => {
                observer.on_event(&WorkflowEvent::SessionReleaseFailed {
                    error: SessionError::Close {
                        session_id: session_id.clone(),
                        cause: "no async runtime available to release the session".to_string(),
                    },
                    session_id,
                });
            }
        }
    }
}

async fn close_and_report(
    invoker: Arc<dyn AgentInvoker>,
    observer: Arc<dyn WorkflowObserver>,
    session_id: String,
) {
    match invoker.close_session(&session_id).await {
        Ok(was_open) => observer.on_event(&WorkflowEvent::SessionReleased {
            session_id,
            was_open,
        }),
        Err(error) => observer.on_event(&WorkflowEvent::SessionReleaseFailed { session_id, error }),
    }
}

/// Run `body` inside a fresh session, releasing it on every exit path.
///
/// The outcome of `body` is returned untouched; a failed release is only
/// reported to the observer.
pub async fn with_session<T, F, Fut>(
    invoker: Arc<dyn AgentInvoker>,
    observer: Arc<dyn WorkflowObserver>,
    body: F,
) -> Result<T, WorkflowError>
where
    F: FnOnce(ConversationSession) -> Fut,
    Fut: Future<Output = Result<T, WorkflowError>>,
{
    let guard = SessionGuard::open(invoker, observer).await?;
    let outcome = body(guard.session().clone()).await;
    guard.release().await;
    outcome
}
