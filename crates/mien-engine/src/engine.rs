//! The engine thread and its clone-safe handle.
//!
//! One OS thread owns the frame source, the in-memory store, and the live
//! classifier; requests arrive on a bounded channel with oneshot replies.
//! Because the thread is the only consumer of frames, an in-progress
//! enrollment or verification session is automatically exclusive: the live
//! classification loop simply does not run while a session (including one
//! awaiting its commit) is active.
//!
//! Session progress, the live decision, and the verification countdown are
//! published through watch channels, so polling them never has to round-trip
//! through the busy engine thread. Cancellation is a shared flag checked on
//! every poll iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use mien_core::classify::LiveClassifier;
use mien_core::enroll::{EnrollStep, EnrollmentFailure, EnrollmentSession, Stage};
use mien_core::verify::{VerificationSession, VerifyStep};
use mien_core::{largest_face, Embedding, FrameSource, Identity, RecognizedIdentity, Role, SourceError, Store};
use mien_store::{credential, CredentialError, StoreError, StoreFile};

use crate::config::EngineConfig;

/// Opaque handle to one guided capture attempt.
pub type EnrollmentTicket = Uuid;

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("no face detected within the presence window")]
    NoFaceDetected,
    #[error("captured {got} of {need} required samples")]
    InsufficientSamples { got: usize, need: usize },
    #[error("an identity named {0:?} already exists")]
    DuplicateIdentityName(String),
    #[error("identity name is required")]
    NameRequired,
    #[error("the Admin role is assigned through admin creation only")]
    AdminRoleReserved,
    #[error("admin verification timed out")]
    AdminVerificationTimeout,
    #[error("no enrolled administrator is available for verification")]
    AdminVerificationUnavailable,
    #[error("session cancelled")]
    Cancelled,
    #[error("no captured enrollment matches ticket {0}")]
    UnknownTicket(Uuid),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl From<EnrollmentFailure> for EnrollmentError {
    fn from(failure: EnrollmentFailure) -> Self {
        match failure {
            EnrollmentFailure::NoFaceDetected => Self::NoFaceDetected,
            EnrollmentFailure::InsufficientSamples { got, need } => {
                Self::InsufficientSamples { got, need }
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum AdminCreationError {
    #[error("an administrator already exists")]
    AdminExists,
    #[error("administrator name is required")]
    NameRequired,
    #[error(transparent)]
    InvalidCredential(#[from] CredentialError),
    #[error(transparent)]
    Capture(EnrollmentError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// What the live classification loop is currently showing.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveDecision {
    /// No frame consumed yet, or the loop is suspended by a session.
    Suspended,
    /// Debounced identity for the last frame (`None` means Unknown).
    Decision(Option<RecognizedIdentity>),
    /// The frame source failed; the loop is halted until the next request.
    Unavailable(String),
}

/// Lifecycle of the current (or last) guided capture session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Capturing,
    AwaitingCommit,
    Committed,
    Cancelled,
    Failed(String),
}

/// Snapshot published for `poll_enrollment`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentProgressView {
    pub ticket: EnrollmentTicket,
    pub stage: Stage,
    pub samples_so_far: usize,
    pub target_total: usize,
    pub state: SessionState,
}

enum EngineRequest {
    StartEnrollment {
        reply: oneshot::Sender<EnrollmentTicket>,
    },
    CancelEnrollment,
    CommitEnrollment {
        ticket: EnrollmentTicket,
        name: String,
        role: Role,
        reply: oneshot::Sender<Result<(), EnrollmentError>>,
    },
    CreateAdmin {
        name: String,
        pin: String,
        pin_confirm: String,
        reply: oneshot::Sender<Result<(), AdminCreationError>>,
    },
    ResetStore {
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    decision_rx: watch::Receiver<LiveDecision>,
    progress_rx: watch::Receiver<Option<EnrollmentProgressView>>,
    countdown_rx: watch::Receiver<Option<Duration>>,
    cancel: Arc<AtomicBool>,
}

impl EngineHandle {
    /// Begin a guided capture session. Returns its ticket immediately; the
    /// capture itself runs on the engine thread and is observed through
    /// [`poll_enrollment`](Self::poll_enrollment).
    pub async fn start_enrollment(&self) -> Result<EnrollmentTicket, EnrollmentError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::StartEnrollment { reply: reply_tx })
            .await
            .map_err(|_| EnrollmentError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EnrollmentError::ChannelClosed)
    }

    /// Latest published session progress, if any session ran.
    pub fn poll_enrollment(&self) -> Option<EnrollmentProgressView> {
        self.progress_rx.borrow().clone()
    }

    /// Watch receiver for session progress, for callers that await changes.
    pub fn progress_watch(&self) -> watch::Receiver<Option<EnrollmentProgressView>> {
        self.progress_rx.clone()
    }

    /// Abort the in-progress session (capture or verification) and discard
    /// all of its state. No commit happens after a cancellation.
    pub async fn cancel_enrollment(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.tx.send(EngineRequest::CancelEnrollment).await;
    }

    /// Attach a name and role to a captured session and persist it.
    /// `Role::Member` requires live admin verification inside this call.
    pub async fn commit_enrollment(
        &self,
        ticket: EnrollmentTicket,
        name: impl Into<String>,
        role: Role,
    ) -> Result<(), EnrollmentError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::CommitEnrollment {
                ticket,
                name: name.into(),
                role,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EnrollmentError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EnrollmentError::ChannelClosed)?
    }

    /// Create the administrator: validate the PIN pair, run a guided
    /// capture, and commit credential plus first face template atomically.
    pub async fn create_admin(
        &self,
        name: impl Into<String>,
        pin: impl Into<String>,
        pin_confirm: impl Into<String>,
    ) -> Result<(), AdminCreationError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::CreateAdmin {
                name: name.into(),
                pin: pin.into(),
                pin_confirm: pin_confirm.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| AdminCreationError::ChannelClosed)?;
        reply_rx.await.map_err(|_| AdminCreationError::ChannelClosed)?
    }

    /// Clear admin and identities atomically and forget all buffered votes.
    pub async fn reset_store(&self) -> Result<(), EnrollmentError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ResetStore { reply: reply_tx })
            .await
            .map_err(|_| EnrollmentError::ChannelClosed)?;
        reply_rx
            .await
            .map_err(|_| EnrollmentError::ChannelClosed)?
            .map_err(EnrollmentError::from)
    }

    /// Latest live classification decision.
    pub fn decision(&self) -> LiveDecision {
        self.decision_rx.borrow().clone()
    }

    /// Watch receiver for the live decision stream.
    pub fn decision_watch(&self) -> watch::Receiver<LiveDecision> {
        self.decision_rx.clone()
    }

    /// Remaining admin-verification time, while a verification is running.
    /// Observability only; the pass/fail contract is the commit result.
    pub fn verification_countdown(&self) -> Option<Duration> {
        *self.countdown_rx.borrow()
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads and validates the store up front (fail-fast), then enters the
/// request loop. The frame source moves onto the engine thread and is never
/// shared.
pub fn spawn_engine<S>(source: S, cfg: EngineConfig) -> Result<EngineHandle, StoreError>
where
    S: FrameSource + Send + 'static,
{
    let store_file = StoreFile::new(&cfg.store_path);
    let store = store_file.load()?;
    tracing::info!(
        path = %cfg.store_path.display(),
        identities = store.identities.len(),
        has_admin = store.admin.is_some(),
        "engine starting"
    );

    let (tx, rx) = mpsc::channel::<EngineRequest>(4);
    let (decision_tx, decision_rx) = watch::channel(LiveDecision::Suspended);
    let (progress_tx, progress_rx) = watch::channel::<Option<EnrollmentProgressView>>(None);
    let (countdown_tx, countdown_rx) = watch::channel::<Option<Duration>>(None);
    let cancel = Arc::new(AtomicBool::new(false));

    let engine = Engine {
        source,
        store_file,
        store,
        classifier: LiveClassifier::new(cfg.matcher, cfg.vote),
        cfg,
        decision_tx,
        progress_tx,
        countdown_tx,
        cancel: Arc::clone(&cancel),
        pending: None,
    };

    thread::Builder::new()
        .name("mien-engine".into())
        .spawn(move || engine.run(rx))
        .expect("failed to spawn engine thread");

    Ok(EngineHandle {
        tx,
        decision_rx,
        progress_rx,
        countdown_rx,
        cancel,
    })
}

/// A capture that finished and is waiting for its commit.
struct PendingEnrollment {
    ticket: EnrollmentTicket,
    template: Embedding,
}

struct Engine<S: FrameSource> {
    source: S,
    store_file: StoreFile,
    store: Store,
    classifier: LiveClassifier,
    cfg: EngineConfig,
    decision_tx: watch::Sender<LiveDecision>,
    progress_tx: watch::Sender<Option<EnrollmentProgressView>>,
    countdown_tx: watch::Sender<Option<Duration>>,
    cancel: Arc<AtomicBool>,
    pending: Option<PendingEnrollment>,
}

impl<S: FrameSource> Engine<S> {
    fn run(mut self, mut rx: mpsc::Receiver<EngineRequest>) {
        tracing::info!("engine thread started");
        let mut live_ok = true;
        loop {
            // The live loop stays out of the way while a session is active
            // or awaiting its commit, and after a source failure.
            let live = self.cfg.live_enabled && live_ok && self.pending.is_none();
            if live {
                match rx.try_recv() {
                    Ok(req) => {
                        self.handle(req);
                        live_ok = true;
                    }
                    Err(mpsc::error::TryRecvError::Empty) => {
                        live_ok = self.live_tick();
                        thread::sleep(self.cfg.live_poll);
                    }
                    Err(mpsc::error::TryRecvError::Disconnected) => break,
                }
            } else {
                match rx.blocking_recv() {
                    Some(req) => {
                        self.handle(req);
                        live_ok = true;
                    }
                    None => break,
                }
            }
        }
        tracing::info!("engine thread exiting");
    }

    fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::StartEnrollment { reply } => {
                self.cancel.store(false, Ordering::SeqCst);
                self.pending = None;
                let ticket = Uuid::new_v4();
                let _ = reply.send(ticket);

                let _ = self.decision_tx.send_replace(LiveDecision::Suspended);
                self.classifier.reset();

                match self.run_guided_capture(ticket) {
                    Ok(template) => {
                        self.pending = Some(PendingEnrollment { ticket, template });
                        self.set_session_state(SessionState::AwaitingCommit);
                    }
                    Err(EnrollmentError::Cancelled) => {
                        self.set_session_state(SessionState::Cancelled);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "guided capture failed");
                        self.set_session_state(SessionState::Failed(e.to_string()));
                    }
                }
            }
            EngineRequest::CancelEnrollment => {
                if self.pending.take().is_some() {
                    self.set_session_state(SessionState::Cancelled);
                }
                self.cancel.store(false, Ordering::SeqCst);
            }
            EngineRequest::CommitEnrollment { ticket, name, role, reply } => {
                let result = self.handle_commit(ticket, name, role);
                let _ = reply.send(result);
            }
            EngineRequest::CreateAdmin { name, pin, pin_confirm, reply } => {
                let result = self.handle_create_admin(name, pin, pin_confirm);
                let _ = reply.send(result);
            }
            EngineRequest::ResetStore { reply } => {
                let _ = reply.send(self.handle_reset());
            }
        }
    }

    /// One idle-loop frame: classify the dominant face and publish.
    fn live_tick(&mut self) -> bool {
        match self.source.next_frame() {
            Ok(frame) => {
                let decision = largest_face(&frame)
                    .and_then(|det| self.classifier.classify_frame(&det.embedding, &self.store));
                let _ = self.decision_tx.send_replace(LiveDecision::Decision(decision));
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "live classification halted: frame source failed");
                let _ = self
                    .decision_tx
                    .send_replace(LiveDecision::Unavailable(e.to_string()));
                false
            }
        }
    }

    /// Drive one guided capture session to completion, publishing progress
    /// after every consumed frame. The engine thread sleeps between polls;
    /// the session itself never does.
    fn run_guided_capture(&mut self, ticket: EnrollmentTicket) -> Result<Embedding, EnrollmentError> {
        let enroll_cfg = self.cfg.enroll;
        let mut session = EnrollmentSession::begin(Instant::now(), enroll_cfg, self.cfg.pose);
        self.publish_progress(ticket, &session);

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::info!("guided capture cancelled");
                return Err(EnrollmentError::Cancelled);
            }

            let frame = self.source.next_frame()?;
            let step = session.step(Instant::now(), &frame);
            self.publish_progress(ticket, &session);

            match step {
                EnrollStep::Waiting { .. } => thread::sleep(enroll_cfg.presence_poll),
                EnrollStep::PresenceConfirmed => {}
                EnrollStep::TimedOut => return Err(EnrollmentError::NoFaceDetected),
                EnrollStep::Captured { stage, total } => {
                    tracing::debug!(stage = %stage, total, "sample captured");
                    thread::sleep(enroll_cfg.settle + enroll_cfg.sample_poll);
                }
                EnrollStep::Rejected { .. } => thread::sleep(enroll_cfg.sample_poll),
                EnrollStep::Finished { total } => {
                    tracing::info!(samples = total, "guided capture complete");
                    break;
                }
            }
        }

        Ok(session.finish()?)
    }

    /// Live admin verification with reset-on-miss, driven at the verify
    /// cadence. Publishes the countdown for UI display and always clears it
    /// on the way out.
    fn verify_admin(&mut self) -> Result<(), EnrollmentError> {
        if self.store.admin.is_none() {
            return Err(EnrollmentError::AdminVerificationUnavailable);
        }
        let templates: Vec<Embedding> = self
            .store
            .admin_identity()
            .map(|identity| identity.templates.clone())
            .unwrap_or_default();
        if templates.is_empty() {
            // Fail closed: a credential without face templates cannot gate.
            return Err(EnrollmentError::AdminVerificationUnavailable);
        }

        let verify_cfg = self.cfg.verify;
        let mut session = VerificationSession::begin(Instant::now(), templates, verify_cfg);
        let result = loop {
            if self.cancel.load(Ordering::SeqCst) {
                break Err(EnrollmentError::Cancelled);
            }
            let frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(e) => break Err(e.into()),
            };
            match session.step(Instant::now(), &frame) {
                VerifyStep::Granted => break Ok(()),
                VerifyStep::Expired => break Err(EnrollmentError::AdminVerificationTimeout),
                VerifyStep::Pending { remaining, .. } => {
                    let _ = self.countdown_tx.send_replace(Some(remaining));
                    thread::sleep(verify_cfg.poll);
                }
            }
        };
        let _ = self.countdown_tx.send_replace(None);
        result
    }

    fn handle_commit(
        &mut self,
        ticket: EnrollmentTicket,
        name: String,
        role: Role,
    ) -> Result<(), EnrollmentError> {
        match &self.pending {
            Some(pending) if pending.ticket == ticket => {}
            _ => return Err(EnrollmentError::UnknownTicket(ticket)),
        }

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(EnrollmentError::NameRequired);
        }
        if role == Role::Admin {
            return Err(EnrollmentError::AdminRoleReserved);
        }
        if self.store.identity(&name).is_some() {
            return Err(EnrollmentError::DuplicateIdentityName(name));
        }

        // Member registration is a privileged write: the administrator must
        // pass the live gate inside this same commit flow.
        self.cancel.store(false, Ordering::SeqCst);
        self.verify_admin()?;

        let pending = self.pending.take().expect("pending session checked above");
        let identity = Identity {
            name: name.clone(),
            role,
            templates: vec![pending.template],
            enrolled_at: Utc::now().to_rfc3339(),
        };
        let mut next = self.store.clone();
        next.identities.push(identity);
        self.persist(next)?;
        self.set_session_state(SessionState::Committed);
        tracing::info!(name = %name, role = %role, "identity enrolled");
        Ok(())
    }

    fn handle_create_admin(
        &mut self,
        name: String,
        pin: String,
        pin_confirm: String,
    ) -> Result<(), AdminCreationError> {
        if self.store.admin.is_some() {
            return Err(AdminCreationError::AdminExists);
        }
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AdminCreationError::NameRequired);
        }
        // Credential problems surface before any capture session starts.
        let cred = credential::create_credential(&name, &pin, &pin_confirm)?;

        self.cancel.store(false, Ordering::SeqCst);
        self.pending = None;
        let _ = self.decision_tx.send_replace(LiveDecision::Suspended);
        self.classifier.reset();

        let ticket = Uuid::new_v4();
        let template = match self.run_guided_capture(ticket) {
            Ok(template) => template,
            Err(e) => {
                let state = match &e {
                    EnrollmentError::Cancelled => SessionState::Cancelled,
                    other => SessionState::Failed(other.to_string()),
                };
                self.set_session_state(state);
                return Err(AdminCreationError::Capture(e));
            }
        };

        let identity = Identity {
            name: name.clone(),
            role: Role::Admin,
            templates: vec![template],
            enrolled_at: Utc::now().to_rfc3339(),
        };
        let mut next = self.store.clone();
        next.admin = Some(cred);
        next.identities.push(identity);
        self.persist(next)?;
        self.set_session_state(SessionState::Committed);
        tracing::info!(name = %name, "administrator created");
        Ok(())
    }

    fn handle_reset(&mut self) -> Result<(), StoreError> {
        self.store = self.store_file.reset()?;
        self.classifier.reset();
        self.pending = None;
        let _ = self.decision_tx.send_replace(LiveDecision::Decision(None));
        let _ = self.progress_tx.send_replace(None);
        Ok(())
    }

    /// Validate, persist, and only then swap the in-memory store, so no
    /// reader of `self.store` ever sees a state that is not on disk.
    fn persist(&mut self, next: Store) -> Result<(), StoreError> {
        next.validate().map_err(|reason| StoreError::Invalid {
            path: self.store_file.path().to_path_buf(),
            reason,
        })?;
        self.store_file.save(&next)?;
        self.store = next;
        Ok(())
    }

    fn publish_progress(&self, ticket: EnrollmentTicket, session: &EnrollmentSession) {
        let progress = session.progress();
        let _ = self.progress_tx.send_replace(Some(EnrollmentProgressView {
            ticket,
            stage: progress.stage,
            samples_so_far: progress.samples_so_far,
            target_total: progress.target_total,
            state: SessionState::Capturing,
        }));
    }

    fn set_session_state(&self, state: SessionState) {
        let current = self.progress_tx.borrow().clone();
        if let Some(mut view) = current {
            view.state = state;
            let _ = self.progress_tx.send_replace(Some(view));
        }
    }
}
