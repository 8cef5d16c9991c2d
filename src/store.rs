//! Main Store façade tying all components together.
//!
//! All snapshot mutations run on one engine thread that owns the snapshot,
//! the session state and the open remote subscription. The [`Store`] handle
//! sends it commands and reads an immutable published view, so callers never
//! hold a mutable reference to shared state.

use crate::cache::{self, FileCache, LocalCache, DEFAULT_CACHE_KEY};
use crate::error::Result;
use crate::identity::{AuthProvider, LifecycleAction, SessionLifecycle};
use crate::profiles::{switch_profile, ProfileExtraction};
use crate::remote::{Document, RemoteChannel, RemoteEvent, RemoteSubscription, RemoteWriter};
use crate::rollover::{self, Clock, SystemClock};
use crate::sanitize::sanitize;
use crate::subscriptions::{
    ChangeSource, DropReason, StoreEvent, SubscriptionConfig, SubscriptionHandle,
    SubscriptionManager,
};
use crate::types::{Identity, SignInMethod, Snapshot};
use crossbeam_channel::{bounded, never, select, tick, unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory of the local cache.
    pub cache_dir: PathBuf,

    /// Key the snapshot is cached under.
    pub cache_key: String,

    /// Whether to create the cache directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Offset of the reference calendar from UTC, in seconds.
    pub utc_offset_secs: i32,

    /// How often to check for a day change while idle (None = only on changes).
    pub rollover_interval: Option<Duration>,

    /// Buffer size for view subscriptions.
    pub event_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./vitalstore"),
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            create_if_missing: true,
            utc_offset_secs: 0,
            rollover_interval: Some(Duration::from_secs(60)),
            event_buffer_size: SubscriptionConfig::default().buffer_size,
        }
    }
}

/// External collaborators of the store.
pub struct StoreParts {
    pub cache: Box<dyn LocalCache>,
    pub auth: Arc<dyn AuthProvider>,
    pub remote: Arc<dyn RemoteChannel>,
    pub clock: Arc<dyn Clock>,
}

/// Immutable view of the façade state.
#[derive(Clone, Debug)]
pub struct StoreView {
    pub snapshot: Arc<Snapshot>,
    pub user: Option<Identity>,
    /// True until the initial load (and any identity's first remote read)
    /// has completed. Snapshot contents are unreliable meanwhile.
    pub loading: bool,
}

/// State shared between the façade handle and the engine thread.
struct Shared {
    view: Mutex<StoreView>,
    settled: Condvar,
    alert: Mutex<Option<String>>,
    events: SubscriptionManager<StoreEvent>,
}

impl Shared {
    fn set_snapshot(&self, snapshot: Arc<Snapshot>, source: ChangeSource) {
        self.view.lock().snapshot = snapshot;
        self.events.broadcast(StoreEvent::SnapshotChanged { source });
    }

    fn set_user(&self, user: Option<Identity>) {
        {
            let mut view = self.view.lock();
            if view.user == user {
                return;
            }
            view.user = user.clone();
        }
        self.events.broadcast(StoreEvent::SessionChanged { user });
    }

    fn set_loading(&self, loading: bool) {
        {
            let mut view = self.view.lock();
            if view.loading == loading {
                return;
            }
            view.loading = loading;
            if !loading {
                self.settled.notify_all();
            }
        }
        if !loading {
            self.events.broadcast(StoreEvent::Settled);
        }
    }

    fn raise_alert(&self, message: String) {
        *self.alert.lock() = Some(message.clone());
        self.events.broadcast(StoreEvent::Alert { message });
    }
}

/// Own writes remembered for echo suppression.
const MAX_IN_FLIGHT: usize = 64;

enum Command {
    Save {
        snapshot: Snapshot,
        reply: Sender<Result<()>>,
    },
    Modify {
        apply: Box<dyn FnOnce(&mut Snapshot) + Send>,
        reply: Sender<Result<Arc<Snapshot>>>,
    },
    ApplyExtraction {
        extraction: ProfileExtraction,
        reply: Sender<Result<Arc<Snapshot>>>,
    },
    Session(Option<Identity>),
    BeginLogin,
    EndLogin {
        identity: Option<Identity>,
        reply: Sender<()>,
    },
    Logout {
        reply: Sender<Result<()>>,
    },
    CheckRollover {
        reply: Sender<Result<bool>>,
    },
    Flush {
        reply: Sender<Result<()>>,
    },
    Shutdown,
}

/// The public store façade.
///
/// Provides:
/// - the current snapshot, identity and loading flag
/// - `save_store`, the single mutation entry point
/// - `login` / `logout` through the auth provider
pub struct Store {
    shared: Arc<Shared>,
    commands: Sender<Command>,
    event_config: SubscriptionConfig,
    auth: Arc<dyn AuthProvider>,
    engine: Option<JoinHandle<()>>,
}

impl Store {
    /// Open a store backed by a file cache in `config.cache_dir` and the
    /// system clock.
    pub fn open(
        config: StoreConfig,
        auth: Arc<dyn AuthProvider>,
        remote: Arc<dyn RemoteChannel>,
    ) -> Result<Self> {
        let cache = FileCache::open_or_create(&config.cache_dir, config.create_if_missing)?;
        let clock = SystemClock::with_offset_secs(config.utc_offset_secs)?;

        Self::with_parts(
            config,
            StoreParts {
                cache: Box::new(cache),
                auth,
                remote,
                clock: Arc::new(clock),
            },
        )
    }

    /// Open a store with explicit collaborators.
    pub fn with_parts(config: StoreConfig, parts: StoreParts) -> Result<Self> {
        let StoreParts {
            cache,
            auth,
            remote,
            clock,
        } = parts;

        let snapshot = Arc::new(cache::load_snapshot(cache.as_ref(), &config.cache_key));

        let shared = Arc::new(Shared {
            view: Mutex::new(StoreView {
                snapshot: Arc::clone(&snapshot),
                user: None,
                loading: true,
            }),
            settled: Condvar::new(),
            alert: Mutex::new(None),
            events: SubscriptionManager::new(),
        });

        let writer = RemoteWriter::spawn(Arc::clone(&remote))?;
        let engine = Engine {
            shared: Arc::clone(&shared),
            cache,
            cache_key: config.cache_key.clone(),
            remote,
            writer,
            clock,
            lifecycle: SessionLifecycle::new(),
            subscription: None,
            snapshot,
            in_flight: VecDeque::new(),
            awaiting_first_read: false,
            login_pending: false,
            login_identity: None,
        };

        let (commands, inbox) = unbounded();
        let ticker = config.rollover_interval.map(tick).unwrap_or_else(never);
        let handle = thread::Builder::new()
            .name("vitalstore-engine".into())
            .spawn(move || engine.run(inbox, ticker))?;

        // Registered last: the provider may answer immediately.
        let session_tx = commands.clone();
        auth.on_session_change(Box::new(move |session| {
            let _ = session_tx.send(Command::Session(session));
        }));

        tracing::info!(cache_key = %config.cache_key, "store opened");

        Ok(Self {
            shared,
            commands,
            event_config: SubscriptionConfig {
                buffer_size: config.event_buffer_size,
            },
            auth,
            engine: Some(handle),
        })
    }

    // --- Reads ---

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.shared.view.lock().snapshot)
    }

    /// Identity bound to the store, if any.
    pub fn user(&self) -> Option<Identity> {
        self.shared.view.lock().user.clone()
    }

    /// Whether the store has not yet settled.
    pub fn is_loading(&self) -> bool {
        self.shared.view.lock().loading
    }

    /// Snapshot, identity and loading flag, read together.
    pub fn view(&self) -> StoreView {
        self.shared.view.lock().clone()
    }

    /// Block until the store has settled or `timeout` elapses.
    /// Returns whether it settled.
    pub fn wait_until_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut view = self.shared.view.lock();
        while view.loading {
            if self.shared.settled.wait_until(&mut view, deadline).timed_out() {
                return !view.loading;
            }
        }
        true
    }

    /// Take the pending user-visible alert, if any.
    pub fn take_alert(&self) -> Option<String> {
        self.shared.alert.lock().take()
    }

    /// Subscribe to store events with the configured buffer size.
    pub fn events(&self) -> SubscriptionHandle<StoreEvent> {
        self.shared.events.subscribe(self.event_config.clone())
    }

    /// Subscribe to store events.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle<StoreEvent> {
        self.shared.events.subscribe(config)
    }

    /// Cancel a subscription.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle<StoreEvent>) {
        self.shared.events.unsubscribe(handle.id);
    }

    // --- Mutations ---

    /// Replace the snapshot.
    ///
    /// Returns once the in-memory snapshot and the local cache are updated.
    /// If an identity is bound, the remote write happens afterwards in the
    /// background; its failure is logged and does not undo the local change.
    pub fn save_store(&self, next: Snapshot) -> Result<()> {
        self.request(|reply| Command::Save {
            snapshot: next,
            reply,
        })?
    }

    /// Apply `f` to the current snapshot and save the result, atomically with
    /// respect to every other mutation.
    pub fn modify<F>(&self, f: F) -> Result<Arc<Snapshot>>
    where
        F: FnOnce(&mut Snapshot) + Send + 'static,
    {
        self.request(|reply| Command::Modify {
            apply: Box::new(f),
            reply,
        })?
    }

    /// Apply newly extracted plan data, switching subjects if it names a
    /// different one.
    pub fn apply_extraction(&self, extraction: ProfileExtraction) -> Result<Arc<Snapshot>> {
        self.request(|reply| Command::ApplyExtraction { extraction, reply })?
    }

    /// Evaluate the daily rollover now. Returns whether counters were reset.
    pub fn check_rollover(&self) -> Result<bool> {
        self.request(|reply| Command::CheckRollover { reply })?
    }

    /// Wait until every remote write queued so far has been attempted.
    pub fn flush(&self) -> Result<()> {
        self.request(|reply| Command::Flush { reply })?
    }

    // --- Session ---

    /// Sign in interactively.
    ///
    /// The session itself is bound when the provider reports the change,
    /// which may happen after this returns. Remote failures during the
    /// signed-in identity's first read are surfaced via
    /// [`take_alert`](Self::take_alert).
    pub fn login(&self, method: SignInMethod) -> Result<Identity> {
        self.commands.send(Command::BeginLogin)?;

        let result = self.auth.sign_in(method);
        if let Err(e) = &result {
            tracing::warn!(%method, error = %e, "sign-in failed");
        }

        self.request(|reply| Command::EndLogin {
            identity: result.as_ref().ok().cloned(),
            reply,
        })?;
        result
    }

    /// Sign out, reset the snapshot and clear the local cache.
    ///
    /// The remote document is left untouched.
    pub fn logout(&self) -> Result<()> {
        if let Err(e) = self.auth.sign_out() {
            tracing::warn!(error = %e, "sign-out failed");
            return Err(e);
        }
        self.request(|reply| Command::Logout { reply })?
    }

    /// Send a command and wait for its reply.
    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = bounded(1);
        self.commands.send(make(reply))?;
        Ok(response.recv()?)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.engine.take() {
            let _ = handle.join();
        }
    }
}

/// Owner of all mutable state. Runs on the engine thread.
struct Engine {
    shared: Arc<Shared>,
    cache: Box<dyn LocalCache>,
    cache_key: String,
    remote: Arc<dyn RemoteChannel>,
    writer: RemoteWriter,
    clock: Arc<dyn Clock>,
    lifecycle: SessionLifecycle,
    /// Subscription for the bound identity. At most one.
    subscription: Option<RemoteSubscription>,
    snapshot: Arc<Snapshot>,
    /// Documents written by this engine whose echo has not arrived yet.
    in_flight: VecDeque<Document>,
    /// The bound identity's first remote read has not arrived yet.
    awaiting_first_read: bool,
    /// An explicit login is in progress; remote failures become alerts.
    login_pending: bool,
    /// Identity the pending login signed in as, once `sign_in` returned.
    login_identity: Option<Identity>,
}

impl Engine {
    fn run(mut self, inbox: Receiver<Command>, ticker: Receiver<Instant>) {
        loop {
            let pushes = self
                .subscription
                .as_ref()
                .map(|s| s.receiver().clone())
                .unwrap_or_else(never);

            select! {
                recv(inbox) -> command => match command {
                    Ok(Command::Shutdown) | Err(_) => break,
                    Ok(command) => self.handle(command),
                },
                recv(pushes) -> event => match event {
                    Ok(event) => self.on_remote_event(event),
                    Err(_) => self.on_subscription_lost("channel disconnected"),
                },
                recv(ticker) -> _ => self.roll_if_due(),
            }
        }

        self.subscription.take();
        self.shared.events.close_all(DropReason::Closed);
        tracing::debug!("store engine stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Save { snapshot, reply } => {
                let result = self.save(snapshot, ChangeSource::Save);
                let _ = reply.send(result);
            }
            Command::Modify { apply, reply } => {
                let mut next = (*self.snapshot).clone();
                apply(&mut next);
                let result = self
                    .save(next, ChangeSource::Save)
                    .map(|()| Arc::clone(&self.snapshot));
                let _ = reply.send(result);
            }
            Command::ApplyExtraction { extraction, reply } => {
                let today = self.clock.today();
                let next = switch_profile(&self.snapshot, extraction, today);
                let result = self
                    .save(next, ChangeSource::ProfileSwitch)
                    .map(|()| Arc::clone(&self.snapshot));
                let _ = reply.send(result);
            }
            Command::Session(session) => self.on_session_change(session),
            Command::BeginLogin => {
                self.login_pending = true;
                self.login_identity = None;
            }
            Command::EndLogin { identity, reply } => {
                match identity {
                    None => self.end_login(),
                    Some(identity) => {
                        // The provider may bind the session later. Stay pending
                        // until this identity's first read lands or fails.
                        let read_done = self.lifecycle.identity() == Some(&identity)
                            && !self.awaiting_first_read;
                        self.login_identity = Some(identity);
                        if read_done {
                            self.end_login();
                        }
                    }
                }
                let _ = reply.send(());
            }
            Command::Logout { reply } => {
                let _ = reply.send(self.logout());
            }
            Command::CheckRollover { reply } => {
                let _ = reply.send(self.reconcile_day());
            }
            Command::Flush { reply } => {
                let _ = reply.send(self.writer.flush());
            }
            Command::Shutdown => {}
        }
    }

    /// Whether remote failures for the bound identity belong to a pending
    /// login.
    fn login_awaits_bound_identity(&self) -> bool {
        if !self.login_pending {
            return false;
        }
        match &self.login_identity {
            Some(identity) => self.lifecycle.identity() == Some(identity),
            None => true,
        }
    }

    fn end_login(&mut self) {
        self.login_pending = false;
        self.login_identity = None;
    }

    fn is_loading(&self) -> bool {
        !self.lifecycle.is_known() || self.awaiting_first_read
    }

    /// Identity to mirror writes to. None while the first read is pending,
    /// so a local write cannot clobber a remote document not yet seen.
    fn sync_target(&self) -> Option<&Identity> {
        if self.awaiting_first_read {
            return None;
        }
        self.lifecycle.identity()
    }

    // --- Mutation ---

    /// Commit a snapshot, then run the rollover check.
    fn save(&mut self, next: Snapshot, source: ChangeSource) -> Result<()> {
        let result = self.commit(next, source);
        self.roll_if_due();
        result
    }

    /// Replace the snapshot, write it locally, and queue the remote write.
    fn commit(&mut self, next: Snapshot, source: ChangeSource) -> Result<()> {
        let next = Arc::new(next);
        self.snapshot = Arc::clone(&next);
        self.shared.set_snapshot(Arc::clone(&next), source);

        let cached = cache::store_snapshot(self.cache.as_ref(), &self.cache_key, &next);
        if let Err(e) = &cached {
            tracing::warn!(error = %e, ?source, "local cache write failed");
        }

        if let Some(identity) = self.sync_target().cloned() {
            self.mirror(identity, &next);
        }

        tracing::debug!(?source, "snapshot saved");
        cached
    }

    /// Queue a remote write of `snapshot`.
    fn mirror(&mut self, identity: Identity, snapshot: &Snapshot) {
        let document = match sanitize(snapshot) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(error = %e, "snapshot could not be sanitized");
                return;
            }
        };
        self.track_in_flight(document.clone());
        if let Err(e) = self.writer.enqueue(identity, document) {
            tracing::warn!(error = %e, "remote write not queued");
        }
    }

    fn track_in_flight(&mut self, document: Document) {
        // Failed writes never echo; cap what they leave behind.
        if self.in_flight.len() >= MAX_IN_FLIGHT {
            self.in_flight.pop_front();
        }
        self.in_flight.push_back(document);
    }

    fn roll_if_due(&mut self) {
        if let Err(e) = self.reconcile_day() {
            tracing::warn!(error = %e, "daily rollover failed");
        }
    }

    /// Reset the daily counters if the calendar day moved on.
    fn reconcile_day(&mut self) -> Result<bool> {
        if self.is_loading() {
            return Ok(false);
        }

        let today = self.clock.today();
        match rollover::reconcile(&self.snapshot, today) {
            Some(next) => {
                tracing::info!(
                    from = ?self.snapshot.last_update_date,
                    to = %today,
                    "daily rollover"
                );
                self.commit(next, ChangeSource::Rollover)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn logout(&mut self) -> Result<()> {
        // The provider's own notification may still be queued behind us;
        // closing here guarantees no push lands after the reset.
        self.on_session_change(None);

        self.snapshot = Arc::new(Snapshot::default());
        self.shared
            .set_snapshot(Arc::clone(&self.snapshot), ChangeSource::Logout);
        self.cache.remove(&self.cache_key)?;

        tracing::info!("logged out, local snapshot cleared");
        Ok(())
    }

    // --- Session ---

    fn on_session_change(&mut self, session: Option<Identity>) {
        for action in self.lifecycle.on_session_change(session) {
            match action {
                LifecycleAction::Close(identity) => {
                    if let Some(subscription) = self.subscription.take() {
                        subscription.close();
                    }
                    self.in_flight.clear();
                    self.awaiting_first_read = false;
                    tracing::info!(uid = %identity, "remote subscription closed");
                }
                LifecycleAction::Open(identity) => self.open_subscription(identity),
            }
        }

        self.shared.set_user(self.lifecycle.identity().cloned());
        self.refresh_loading();
    }

    fn open_subscription(&mut self, identity: Identity) {
        match self.remote.subscribe(&identity) {
            Ok(subscription) => {
                tracing::info!(uid = %identity, "remote subscription opened");
                self.subscription = Some(subscription);
                self.awaiting_first_read = true;
            }
            Err(e) => {
                tracing::warn!(uid = %identity, error = %e, "remote subscribe failed");
                self.report_remote_error(e.to_string());
            }
        }
    }

    fn refresh_loading(&mut self) {
        let loading = self.is_loading();
        let was_loading = self.shared.view.lock().loading;
        self.shared.set_loading(loading);

        if was_loading && !loading {
            tracing::info!(user = ?self.lifecycle.identity(), "store settled");
            self.roll_if_due();
        }
    }

    // --- Remote ---

    fn on_remote_event(&mut self, event: RemoteEvent) {
        match event {
            RemoteEvent::Document(Some(document)) => self.apply_remote(document),
            RemoteEvent::Document(None) => self.seed_remote(),
            RemoteEvent::Error(message) => {
                tracing::warn!(error = %message, "remote subscription error");
                self.report_remote_error(message);
            }
            RemoteEvent::Dropped { reason } => {
                self.on_subscription_lost(&format!("{:?}", reason));
            }
        }
    }

    /// Take a pushed document as the new snapshot. The cache stores the
    /// payload exactly as received.
    ///
    /// Echoes of this engine's own writes are skipped: the snapshot already
    /// reflects them, and an older echo would undo a newer local save.
    fn apply_remote(&mut self, document: Document) {
        if !self.awaiting_first_read {
            if let Some(pos) = self.in_flight.iter().position(|d| *d == document) {
                self.in_flight.drain(..=pos);
                tracing::trace!("own write echoed back");
                return;
            }
        }

        match Snapshot::from_document(document.clone()) {
            Ok(snapshot) => {
                // Another writer got in after our queued writes. Their echoes
                // must now apply so memory ends where the remote ends.
                self.in_flight.clear();
                self.snapshot = Arc::new(snapshot);
                self.shared
                    .set_snapshot(Arc::clone(&self.snapshot), ChangeSource::Remote);
                if let Err(e) = self.cache.set(&self.cache_key, &document.to_string()) {
                    tracing::warn!(error = %e, "local cache write failed");
                }
                tracing::debug!("remote snapshot applied");
            }
            Err(e) => {
                tracing::warn!(error = %e, "remote document rejected");
                self.report_remote_error(e.to_string());
            }
        }
        self.finish_first_read();
        self.roll_if_due();
    }

    /// First contact: no remote document exists, so seed it from the local
    /// snapshot before settling.
    fn seed_remote(&mut self) {
        if !self.awaiting_first_read {
            tracing::warn!("remote document disappeared, keeping local snapshot");
            return;
        }

        if let Some(identity) = self.lifecycle.identity().cloned() {
            let seeded = sanitize(&*self.snapshot).and_then(|document| {
                self.remote
                    .write_whole(&identity, &document)
                    .map(|()| document)
            });
            match seeded {
                Ok(document) => {
                    self.track_in_flight(document);
                    tracing::info!(uid = %identity, "remote document seeded");
                }
                Err(e) => tracing::warn!(uid = %identity, error = %e, "remote seed failed"),
            }
        }
        self.finish_first_read();
        self.roll_if_due();
    }

    fn finish_first_read(&mut self) {
        if self.awaiting_first_read {
            self.awaiting_first_read = false;
            if self.login_awaits_bound_identity() {
                self.end_login();
            }
            self.refresh_loading();
        }
    }

    fn report_remote_error(&mut self, message: String) {
        if self.login_awaits_bound_identity() {
            self.shared.raise_alert(message);
            self.end_login();
        }
        // A failed first read still settles the store on the local snapshot.
        if self.awaiting_first_read {
            self.awaiting_first_read = false;
            self.refresh_loading();
        }
    }

    fn on_subscription_lost(&mut self, reason: &str) {
        if self.subscription.take().is_some() {
            tracing::warn!(reason, "remote subscription lost");
            if self.awaiting_first_read {
                self.report_remote_error(format!("remote subscription lost: {}", reason));
            }
        }
    }
}
