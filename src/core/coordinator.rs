//! Polling data-refresh coordinator.
//!
//! A [`Coordinator`] runs an update method on demand or once per interval,
//! keeps the last good value, tracks whether the latest attempt succeeded and
//! notifies listeners after every attempt. At most one update runs at a time:
//! concurrent refresh requests join the attempt already in flight.
//!
//! Polling only happens while at least one listener is registered, and the
//! interval restarts after every completed refresh.
//!
//! Lock order: `listeners` before `poller`.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a refresh attempt failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpdateFailed {
    #[error("Timeout communicating with API")]
    Timeout,
    #[error("Error communicating with API: {0}")]
    Fetch(String),
}

pub type UpdateFuture<T> = Pin<Box<dyn Future<Output = Result<T, UpdateFailed>> + Send>>;
type UpdateMethod<T> = Box<dyn Fn() -> UpdateFuture<T> + Send + Sync>;
type Listener<T> = Arc<dyn Fn(&CoordinatorSnapshot<T>) + Send + Sync>;

/// Immutable view of the coordinator state after a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSnapshot<T> {
    /// Last successfully fetched value, kept across failed attempts
    pub data: Option<T>,
    pub last_update_success: bool,
    /// Failure of the most recent attempt, cleared on success
    pub last_error: Option<UpdateFailed>,
    pub last_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Used in log messages
    pub name: String,
    pub update_interval: Duration,
    pub request_timeout: Duration,
}

impl CoordinatorOptions {
    pub fn new(name: impl Into<String>, update_interval: Duration) -> Self {
        Self {
            name: name.into(),
            update_interval,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

struct CoordinatorState<T> {
    data: Option<T>,
    last_update_success: bool,
    last_error: Option<UpdateFailed>,
    last_refresh: Option<DateTime<Utc>>,
}

struct Listeners<T> {
    next_id: u64,
    callbacks: BTreeMap<u64, Listener<T>>,
}

struct Inner<T> {
    options: CoordinatorOptions,
    update_method: UpdateMethod<T>,
    state: Mutex<CoordinatorState<T>>,
    listeners: Mutex<Listeners<T>>,
    /// Completion signal of the refresh currently running, if any
    in_flight: Mutex<Option<watch::Receiver<bool>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
    /// Fires after every completed refresh so the poller restarts its interval
    refreshed: Arc<Notify>,
}

/// Shared handle to a refresh coordinator. Clones refer to the same state.
pub struct Coordinator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Coordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Keeps a listener registered. Dropping it unregisters the listener.
#[must_use = "dropping the handle unregisters the listener"]
pub struct ListenerHandle<T: Clone + Send + Sync + 'static> {
    id: u64,
    inner: Weak<Inner<T>>,
}

impl<T: Clone + Send + Sync + 'static> ListenerHandle<T> {
    pub fn unregister(self) {}
}

impl<T: Clone + Send + Sync + 'static> Drop for ListenerHandle<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_listener(self.id);
        }
    }
}

fn lock<M>(mutex: &Mutex<M>) -> MutexGuard<'_, M> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone + Send + Sync + 'static> Coordinator<T> {
    pub fn new<F, Fut>(options: CoordinatorOptions, update_method: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, UpdateFailed>> + Send + 'static,
    {
        let update_method: UpdateMethod<T> = Box::new(move || Box::pin(update_method()));
        Self {
            inner: Arc::new(Inner {
                options,
                update_method,
                state: Mutex::new(CoordinatorState {
                    data: None,
                    last_update_success: true,
                    last_error: None,
                    last_refresh: None,
                }),
                listeners: Mutex::new(Listeners {
                    next_id: 0,
                    callbacks: BTreeMap::new(),
                }),
                in_flight: Mutex::new(None),
                poller: Mutex::new(None),
                refreshed: Arc::new(Notify::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    /// Refresh now, or wait for the refresh already running.
    ///
    /// Returns after the attempt has been recorded and listeners notified.
    /// Failures never surface here; they show up in [`Self::is_available`].
    pub async fn refresh_now(&self) {
        self.inner.refresh().await;
    }

    /// Register a callback that runs after every refresh attempt.
    ///
    /// Starts interval polling if it isn't running. Registering does not fetch.
    pub fn register_listener<F>(&self, callback: F) -> ListenerHandle<T>
    where
        F: Fn(&CoordinatorSnapshot<T>) + Send + Sync + 'static,
    {
        let mut listeners = lock(&self.inner.listeners);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.callbacks.insert(id, Arc::new(callback));
        self.inner.ensure_polling();
        drop(listeners);

        ListenerHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Last successfully fetched value.
    pub fn current_value(&self) -> Option<T> {
        lock(&self.inner.state).data.clone()
    }

    /// Whether the most recent refresh attempt succeeded.
    pub fn is_available(&self) -> bool {
        lock(&self.inner.state).last_update_success
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot<T> {
        self.inner.snapshot()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).callbacks.len()
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.inner.poller)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Drop every listener and stop polling. A refresh in flight still completes.
    pub fn shutdown(&self) {
        let mut listeners = lock(&self.inner.listeners);
        let removed = std::mem::take(&mut listeners.callbacks);
        self.inner.stop_polling();
        drop(listeners);
        debug!(
            coordinator = %self.inner.options.name,
            listeners = removed.len(),
            "Coordinator shut down"
        );
    }
}

impl<T: Clone + Send + Sync + 'static> Inner<T> {
    fn snapshot(&self) -> CoordinatorSnapshot<T> {
        let state = lock(&self.state);
        CoordinatorSnapshot {
            data: state.data.clone(),
            last_update_success: state.last_update_success,
            last_error: state.last_error.clone(),
            last_refresh: state.last_refresh,
        }
    }

    async fn refresh(self: &Arc<Self>) {
        let mut done = self.begin_or_join();
        // Err only if the refresh task died without signalling.
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Start a refresh task, or hand out the completion signal of the running one.
    fn begin_or_join(self: &Arc<Self>) -> watch::Receiver<bool> {
        let mut slot = lock(&self.in_flight);
        if let Some(running) = slot.as_ref() {
            if running.has_changed().is_ok() {
                debug!(coordinator = %self.options.name, "Joining refresh in flight");
                return running.clone();
            }
        }

        let (tx, rx) = watch::channel(false);
        *slot = Some(rx.clone());
        drop(slot);

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_update().await;
            lock(&inner.in_flight).take();
            let _ = tx.send(true);
        });
        rx
    }

    async fn run_update(&self) {
        let name = &self.options.name;
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.options.request_timeout, (self.update_method)())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(UpdateFailed::Timeout),
        };

        {
            let mut state = lock(&self.state);
            match outcome {
                Ok(data) => {
                    if !state.last_update_success {
                        info!(coordinator = %name, "Fetching {} data recovered", name);
                    }
                    state.data = Some(data);
                    state.last_update_success = true;
                    state.last_error = None;
                }
                Err(err) => {
                    if state.last_update_success {
                        error!(coordinator = %name, "Error fetching {} data: {}", name, err);
                    } else {
                        debug!(coordinator = %name, error = %err, "Refresh failed again");
                    }
                    state.last_update_success = false;
                    state.last_error = Some(err);
                }
            }
            state.last_refresh = Some(Utc::now());
        }

        debug!(
            coordinator = %name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Finished fetching {} data",
            name
        );
        self.notify(&self.snapshot());
        self.refreshed.notify_waiters();
    }

    fn notify(&self, snapshot: &CoordinatorSnapshot<T>) {
        let callbacks: Vec<Listener<T>> = lock(&self.listeners).callbacks.values().cloned().collect();
        for callback in callbacks {
            callback(snapshot);
        }
    }

    fn has_listeners(&self) -> bool {
        !lock(&self.listeners).callbacks.is_empty()
    }

    fn remove_listener(&self, id: u64) {
        let mut listeners = lock(&self.listeners);
        listeners.callbacks.remove(&id);
        if listeners.callbacks.is_empty() {
            self.stop_polling();
        }
    }

    fn ensure_polling(self: &Arc<Self>) {
        let mut poller = lock(&self.poller);
        if poller.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                coordinator = %self.options.name,
                "No async runtime, interval polling disabled"
            );
            return;
        };

        let weak = Arc::downgrade(self);
        let refreshed = Arc::clone(&self.refreshed);
        let interval = self.options.update_interval;
        debug!(
            coordinator = %self.options.name,
            interval_secs = interval.as_secs(),
            "Polling started"
        );
        *poller = Some(runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = refreshed.notified() => continue,
                }
                let Some(inner) = weak.upgrade() else { break };
                if !inner.has_listeners() {
                    break;
                }
                inner.refresh().await;
            }
        }));
    }

    fn stop_polling(&self) {
        if let Some(handle) = lock(&self.poller).take() {
            handle.abort();
            debug!(coordinator = %self.options.name, "Polling suspended");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOUR: Duration = Duration::from_secs(3600);

    /// Update method that replays scripted outcomes and counts its calls.
    fn scripted(
        outcomes: Vec<Result<f64, UpdateFailed>>,
        delay: Duration,
    ) -> (Coordinator<f64>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let outcomes = Arc::new(Mutex::new(outcomes.into_iter()));
        let counter = Arc::clone(&calls);
        let coordinator = Coordinator::new(CoordinatorOptions::new("sensor", HOUR), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let next = outcomes.lock().unwrap().next();
            async move {
                tokio::time::sleep(delay).await;
                next.unwrap_or(Ok(0.0))
            }
        });
        (coordinator, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn starts_without_data() {
        let (coordinator, calls) = scripted(vec![], Duration::ZERO);
        assert_eq!(coordinator.current_value(), None);
        assert!(coordinator.is_available());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_refresh_stores_value() {
        let (coordinator, calls) = scripted(vec![Ok(3.5)], Duration::from_millis(5));
        coordinator.refresh_now().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.current_value(), Some(3.5));
        assert!(coordinator.is_available());
        let snapshot = coordinator.snapshot();
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.last_refresh.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_previous_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let coordinator = Coordinator::new(CoordinatorOptions::new("sensor", HOUR), move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if call > 0 {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok(12.25)
            }
        });

        coordinator.refresh_now().await;
        assert_eq!(coordinator.current_value(), Some(12.25));

        coordinator.refresh_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.current_value(), Some(12.25));
        assert!(!coordinator.is_available());
        assert_eq!(coordinator.snapshot().last_error, Some(UpdateFailed::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_request_timeout_applies() {
        let coordinator = Coordinator::new(
            CoordinatorOptions::new("sensor", HOUR).request_timeout(Duration::from_secs(2)),
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1.0)
            },
        );
        coordinator.refresh_now().await;
        assert!(!coordinator.is_available());
        assert_eq!(coordinator.current_value(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_errors_behave_like_timeouts() {
        let failures = [
            "connection refused",
            "HTTP 500 from usage/hourlydetail",
            "Reading 3 has no numeric kWh value",
        ];
        for reason in failures {
            let (coordinator, _) = scripted(
                vec![Ok(7.0), Err(UpdateFailed::Fetch(reason.to_string()))],
                Duration::ZERO,
            );
            coordinator.refresh_now().await;
            coordinator.refresh_now().await;

            assert_eq!(coordinator.current_value(), Some(7.0), "{}", reason);
            assert!(!coordinator.is_available(), "{}", reason);
            assert_eq!(
                coordinator.snapshot().last_error,
                Some(UpdateFailed::Fetch(reason.to_string()))
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_failure_leaves_no_data() {
        let (coordinator, _) = scripted(
            vec![Err(UpdateFailed::Fetch("connection refused".into()))],
            Duration::ZERO,
        );
        coordinator.refresh_now().await;
        assert_eq!(coordinator.current_value(), None);
        assert!(!coordinator.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_clears_error() {
        let (coordinator, _) = scripted(
            vec![Err(UpdateFailed::Timeout), Ok(4.0)],
            Duration::ZERO,
        );
        coordinator.refresh_now().await;
        assert!(!coordinator.is_available());
        coordinator.refresh_now().await;
        assert!(coordinator.is_available());
        assert_eq!(coordinator.current_value(), Some(4.0));
        assert!(coordinator.snapshot().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_share_one_fetch() {
        let (coordinator, calls) = scripted(vec![Ok(1.0)], Duration::from_secs(1));
        tokio::join!(coordinator.refresh_now(), coordinator.refresh_now());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.current_value(), Some(1.0));

        coordinator.refresh_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn listeners_see_every_outcome() {
        let (coordinator, _) = scripted(
            vec![Ok(2.0), Err(UpdateFailed::Timeout)],
            Duration::ZERO,
        );
        let seen: Arc<Mutex<Vec<CoordinatorSnapshot<f64>>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let _handle = coordinator.register_listener(move |snapshot| {
            sink.lock().unwrap().push(snapshot.clone());
        });

        coordinator.refresh_now().await;
        coordinator.refresh_now().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].data, Some(2.0));
        assert!(seen[0].last_update_success);
        assert_eq!(seen[1].data, Some(2.0));
        assert!(!seen[1].last_update_success);
    }

    #[tokio::test(start_paused = true)]
    async fn registering_does_not_fetch() {
        let (coordinator, calls) = scripted(vec![], Duration::ZERO);
        let _handle = coordinator.register_listener(|_| {});
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(coordinator.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn polls_only_while_listeners_exist() {
        let (coordinator, calls) = scripted(vec![], Duration::ZERO);

        tokio::time::sleep(HOUR * 3).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!coordinator.is_polling());

        let handle = coordinator.register_listener(|_| {});
        tokio::time::sleep(HOUR * 2 + Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        handle.unregister();
        assert!(!coordinator.is_polling());
        tokio::time::sleep(HOUR * 3).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let _again = coordinator.register_listener(|_| {});
        tokio::time::sleep(HOUR + Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_continues_until_last_listener_leaves() {
        let (coordinator, _) = scripted(vec![], Duration::ZERO);
        let first = coordinator.register_listener(|_| {});
        let second = coordinator.register_listener(|_| {});
        assert_eq!(coordinator.listener_count(), 2);

        drop(first);
        assert!(coordinator.is_polling());
        drop(second);
        assert!(!coordinator.is_polling());
        assert_eq!(coordinator.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_refresh_completes_after_last_listener_leaves() {
        let (coordinator, calls) = scripted(vec![Ok(9.0)], Duration::from_secs(2));
        let handle = coordinator.register_listener(|_| {});

        let background = coordinator.clone();
        let refresh = tokio::spawn(async move { background.refresh_now().await });
        tokio::task::yield_now().await;
        drop(handle);

        refresh.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.current_value(), Some(9.0));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_removes_listeners() {
        let (coordinator, calls) = scripted(vec![], Duration::ZERO);
        let _handle = coordinator.register_listener(|_| {});
        coordinator.shutdown();
        assert_eq!(coordinator.listener_count(), 0);
        assert!(!coordinator.is_polling());

        tokio::time::sleep(HOUR * 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_restarts_interval() {
        let (coordinator, calls) = scripted(vec![], Duration::ZERO);
        let _handle = coordinator.register_listener(|_| {});

        tokio::time::sleep(Duration::from_secs(59 * 60)).await;
        coordinator.refresh_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The scheduled fetch at the 60 minute mark is skipped.
        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(59 * 60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(coordinator.is_polling());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn register_racing_last_unregister_keeps_polling() {
        let (coordinator, _) = scripted(vec![], Duration::ZERO);

        for _ in 0..500 {
            let old = coordinator.register_listener(|_| {});
            let registrar = coordinator.clone();
            let dropper = tokio::spawn(async move { drop(old) });
            let register = tokio::spawn(async move { registrar.register_listener(|_| {}) });

            dropper.await.unwrap();
            let new = register.await.unwrap();
            assert_eq!(coordinator.listener_count(), 1);
            assert!(coordinator.is_polling(), "listener registered without polling");
            drop(new);
            assert!(!coordinator.is_polling());
        }
    }
}
