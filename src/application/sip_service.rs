//! SIP service
//!
//! Every daemon callback and every registry-touching command goes through one
//! FIFO queue drained by a single worker task that owns the `CallManager`.
//! Callers that need an answer await a oneshot reply.

use crate::application::call_manager::CallManager;
use crate::application::callback::DaemonCallback;
use crate::application::command::{Command, Reply};
use crate::application::events::{EventBroadcaster, ServiceEvent};
use crate::application::stats::ServiceStats;
use crate::config::ServiceConfig;
use crate::domain::call::{Call, ContactDirectory};
use crate::domain::conference::Conference;
use crate::domain::daemon::{Daemon, Details};
use crate::domain::history::{HistoryEntry, HistoryRecorder};
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::value_objects::{AccountId, CallId, ConferenceId};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum Task {
    Callback(DaemonCallback),
    Command(Command),
    /// Stop accepting work; tasks already queued still run
    Shutdown,
}

struct Executor {
    tx: mpsc::Sender<Task>,
    /// Held while joining, so a concurrent `shutdown` waits for the drain
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    /// Manager waiting for the worker to be started
    pending: Mutex<Option<CallManager>>,
    executor: OnceCell<Executor>,
    queue_capacity: usize,
    events: EventBroadcaster,
}

/// Cloneable handle to the service
#[derive(Clone)]
pub struct SipService {
    inner: Arc<Inner>,
}

impl SipService {
    pub fn new(
        daemon: Arc<dyn Daemon>,
        history: Arc<dyn HistoryRecorder>,
        contacts: Arc<dyn ContactDirectory>,
        config: &ServiceConfig,
    ) -> Self {
        let events = EventBroadcaster::new(config.event_capacity);
        let manager = CallManager::new(
            daemon,
            history,
            contacts,
            events.clone(),
            Duration::from_millis(config.history_timeout_ms),
        );

        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(Some(manager)),
                executor: OnceCell::new(),
                queue_capacity: config.queue_capacity.max(1),
                events,
            }),
        }
    }

    /// Subscribe to service events
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.inner.events.subscribe()
    }

    /// Queue a daemon callback. Returns once it is queued, not once applied.
    pub async fn notify(&self, callback: DaemonCallback) -> Result<()> {
        debug!("Queueing callback {}", callback.name());
        self.enqueue(Task::Callback(callback)).await
    }

    /// Stop the worker after the queued tasks ran. Every caller, including
    /// concurrent ones, returns only once the queue has drained.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(executor) = self.inner.executor.get() else {
            // Never started: make sure it never will
            self.take_pending()?;
            info!("SIP service stopped before start");
            return Ok(());
        };

        if executor.tx.send(Task::Shutdown).await.is_err() {
            debug!("SIP service already stopping");
        }
        let mut worker = executor.worker.lock().await;
        if let Some(handle) = worker.take() {
            handle
                .await
                .map_err(|e| DomainError::Internal(format!("worker task failed: {}", e)))?;
        }
        Ok(())
    }

    // Commands

    pub async fn place_call(&self, account: &AccountId, number: &str) -> Result<CallId> {
        let (account, number) = (account.clone(), number.to_string());
        self.request(|reply| Command::PlaceCall {
            account,
            number,
            reply,
        })
        .await
    }

    pub async fn accept(&self, call_id: &CallId) -> Result<()> {
        let call_id = call_id.clone();
        self.request(|reply| Command::Accept { call_id, reply }).await
    }

    pub async fn refuse(&self, call_id: &CallId) -> Result<()> {
        let call_id = call_id.clone();
        self.request(|reply| Command::Refuse { call_id, reply }).await
    }

    pub async fn hang_up(&self, call_id: &CallId) -> Result<()> {
        let call_id = call_id.clone();
        self.request(|reply| Command::HangUp { call_id, reply }).await
    }

    pub async fn hold(&self, call_id: &CallId) -> Result<()> {
        let call_id = call_id.clone();
        self.request(|reply| Command::Hold { call_id, reply }).await
    }

    pub async fn unhold(&self, call_id: &CallId) -> Result<()> {
        let call_id = call_id.clone();
        self.request(|reply| Command::Unhold { call_id, reply }).await
    }

    pub async fn create_conference(&self, sel_call: &CallId, drag_call: &CallId) -> Result<()> {
        let (sel_call, drag_call) = (sel_call.clone(), drag_call.clone());
        self.request(|reply| Command::CreateConference {
            sel_call,
            drag_call,
            reply,
        })
        .await
    }

    pub async fn join_conference(&self, sel_conf: &ConferenceId, drag_conf: &ConferenceId) -> Result<()> {
        let (sel_conf, drag_conf) = (sel_conf.clone(), drag_conf.clone());
        self.request(|reply| Command::JoinConference {
            sel_conf,
            drag_conf,
            reply,
        })
        .await
    }

    pub async fn add_participant(&self, call_id: &CallId, conf_id: &ConferenceId) -> Result<()> {
        let (call_id, conf_id) = (call_id.clone(), conf_id.clone());
        self.request(|reply| Command::AddParticipant {
            call_id,
            conf_id,
            reply,
        })
        .await
    }

    /// Detach a call from its conference; returns its new conference key
    pub async fn detach_participant(&self, call_id: &CallId) -> Result<ConferenceId> {
        let call_id = call_id.clone();
        self.request(|reply| Command::DetachParticipant { call_id, reply })
            .await
    }

    pub async fn hang_up_conference(&self, conf_id: &ConferenceId) -> Result<()> {
        let conf_id = conf_id.clone();
        self.request(|reply| Command::HangUpConference { conf_id, reply })
            .await
    }

    pub async fn hold_conference(&self, conf_id: &ConferenceId) -> Result<()> {
        let conf_id = conf_id.clone();
        self.request(|reply| Command::HoldConference { conf_id, reply })
            .await
    }

    pub async fn unhold_conference(&self, conf_id: &ConferenceId) -> Result<()> {
        let conf_id = conf_id.clone();
        self.request(|reply| Command::UnholdConference { conf_id, reply })
            .await
    }

    pub async fn toggle_recording(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.request(|reply| Command::ToggleRecording { id, reply }).await
    }

    pub async fn send_text_message(&self, target: &str, body: &str) -> Result<()> {
        let (target, body) = (target.to_string(), body.to_string());
        self.request(|reply| Command::SendTextMessage {
            target,
            body,
            reply,
        })
        .await
    }

    pub async fn confirm_sas(&self, call_id: &CallId) -> Result<()> {
        let call_id = call_id.clone();
        self.request(|reply| Command::ConfirmSas { call_id, reply }).await
    }

    // Queries

    pub async fn get_call(&self, call_id: &CallId) -> Result<Call> {
        let call_id = call_id.clone();
        self.request(|reply| Command::GetCall { call_id, reply }).await
    }

    pub async fn get_conference(&self, id: &str) -> Result<Conference> {
        let id = id.to_string();
        self.request(|reply| Command::GetConference { id, reply }).await
    }

    pub async fn concurrent_calls(&self) -> Result<Vec<Conference>> {
        self.request(|reply| Command::ConcurrentCalls { reply }).await
    }

    pub async fn current_call(&self) -> Result<Option<Conference>> {
        self.request(|reply| Command::CurrentCall { reply }).await
    }

    pub async fn call_details(&self, call_id: &CallId) -> Result<Details> {
        let call_id = call_id.clone();
        self.request(|reply| Command::CallDetails { call_id, reply }).await
    }

    pub async fn conference_details(&self, conf_id: &ConferenceId) -> Result<String> {
        let conf_id = conf_id.clone();
        self.request(|reply| Command::ConferenceDetails { conf_id, reply })
            .await
    }

    pub async fn participant_list(&self, conf_id: &ConferenceId) -> Result<Vec<CallId>> {
        let conf_id = conf_id.clone();
        self.request(|reply| Command::ParticipantList { conf_id, reply })
            .await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.request(|reply| Command::History { limit, reply }).await
    }

    pub async fn stats(&self) -> Result<ServiceStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Task::Command(build(reply))).await?;
        rx.await.map_err(|_| DomainError::ServiceStopped)?
    }

    async fn enqueue(&self, task: Task) -> Result<()> {
        let executor = self.executor().await?;
        executor
            .tx
            .send(task)
            .await
            .map_err(|_| DomainError::ServiceStopped)
    }

    /// Start the worker on first use
    async fn executor(&self) -> Result<&Executor> {
        self.inner
            .executor
            .get_or_try_init(|| async {
                let manager = self.take_pending()?.ok_or(DomainError::ServiceStopped)?;
                let (tx, rx) = mpsc::channel(self.inner.queue_capacity);
                let worker = tokio::spawn(run_worker(manager, rx));
                info!(
                    "SIP service worker started (queue capacity {})",
                    self.inner.queue_capacity
                );
                Ok::<_, DomainError>(Executor {
                    tx,
                    worker: tokio::sync::Mutex::new(Some(worker)),
                })
            })
            .await
    }

    fn take_pending(&self) -> Result<Option<CallManager>> {
        Ok(self
            .inner
            .pending
            .lock()
            .map_err(|_| DomainError::Internal("service lock poisoned".to_string()))?
            .take())
    }
}

async fn run_worker(mut manager: CallManager, mut rx: mpsc::Receiver<Task>) {
    while let Some(task) = rx.recv().await {
        match task {
            Task::Callback(callback) => manager.handle_callback(callback).await,
            Task::Command(command) => dispatch(&mut manager, command).await,
            Task::Shutdown => {
                info!("SIP service draining queued tasks");
                rx.close();
            }
        }
    }
    info!("SIP service worker stopped");
}

fn answer<T>(reply: Reply<T>, result: Result<T>) {
    if let Err(Err(e)) = reply.send(result) {
        warn!("Caller went away before receiving error: {}", e);
    }
}

async fn dispatch(manager: &mut CallManager, command: Command) {
    let name = command.name();
    debug!("SipService.{}() running", name);
    manager.record_command(name);

    match command {
        Command::PlaceCall {
            account,
            number,
            reply,
        } => answer(reply, manager.place_call(account, &number).await),
        Command::Accept { call_id, reply } => answer(reply, manager.accept(&call_id).await),
        Command::Refuse { call_id, reply } => answer(reply, manager.refuse(&call_id).await),
        Command::HangUp { call_id, reply } => answer(reply, manager.hang_up(&call_id).await),
        Command::Hold { call_id, reply } => answer(reply, manager.hold(&call_id).await),
        Command::Unhold { call_id, reply } => answer(reply, manager.unhold(&call_id).await),
        Command::CreateConference {
            sel_call,
            drag_call,
            reply,
        } => answer(reply, manager.create_conference(&sel_call, &drag_call).await),
        Command::JoinConference {
            sel_conf,
            drag_conf,
            reply,
        } => answer(reply, manager.join_conference(&sel_conf, &drag_conf).await),
        Command::AddParticipant {
            call_id,
            conf_id,
            reply,
        } => answer(reply, manager.add_participant(&call_id, &conf_id).await),
        Command::DetachParticipant { call_id, reply } => {
            answer(reply, manager.detach_participant(&call_id).await)
        }
        Command::HangUpConference { conf_id, reply } => {
            answer(reply, manager.hang_up_conference(&conf_id).await)
        }
        Command::HoldConference { conf_id, reply } => {
            answer(reply, manager.hold_conference(&conf_id).await)
        }
        Command::UnholdConference { conf_id, reply } => {
            answer(reply, manager.unhold_conference(&conf_id).await)
        }
        Command::ToggleRecording { id, reply } => answer(reply, manager.toggle_recording(&id).await),
        Command::SendTextMessage {
            target,
            body,
            reply,
        } => answer(reply, manager.send_text_message(&target, &body).await),
        Command::ConfirmSas { call_id, reply } => answer(reply, manager.confirm_sas(&call_id).await),
        Command::GetCall { call_id, reply } => answer(reply, manager.get_call(&call_id)),
        Command::GetConference { id, reply } => answer(reply, manager.get_conference(&id)),
        Command::ConcurrentCalls { reply } => answer(reply, Ok(manager.concurrent_calls())),
        Command::CurrentCall { reply } => answer(reply, Ok(manager.current_call())),
        Command::CallDetails { call_id, reply } => answer(reply, manager.call_details(&call_id).await),
        Command::ConferenceDetails { conf_id, reply } => {
            answer(reply, manager.conference_details(&conf_id).await)
        }
        Command::ParticipantList { conf_id, reply } => {
            answer(reply, manager.participant_list(&conf_id).await)
        }
        Command::History { limit, reply } => answer(reply, manager.history(limit).await),
        Command::Stats { reply } => answer(reply, Ok(manager.stats().clone())),
    }

    manager.after_mutation();
}
