use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::events::{Command, Notification, SyncEvent};
use super::filter::{self, FilterState, HideRead, TimelineView};
use super::ledger::ReadLedger;
use super::optimistic::{FlagField, OptimisticFlag};
use super::ports::{FeedApi, History, LocalStore};
use super::post::{Post, Segment, Subscription, TimelineData};
use super::route::Route;
use super::scheduler::SyncScheduler;
use super::store::PostStore;
use super::timer::{Debouncer, RefreshTimer};
use super::writer::{LocalWriter, WriteOp};
use crate::feed::DEFAULT_AVATAR_URL;
use crate::util::{catch_task_panic, host_of, normalize_href};

/// Capacity of the notification broadcast. Slow observers skip ahead.
const NOTIFICATION_CAPACITY: usize = 256;

/// Timer resolution of `run`.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct TimelineConfig {
    /// Period of the background refresh. Zero disables it.
    pub refresh_interval: Duration,
    /// Quiet period before pending reads are written back.
    pub read_sync_delay: Duration,
    /// Budget for the final read flush in `shutdown`.
    pub shutdown_flush_timeout: Duration,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5 * 60),
            read_sync_delay: Duration::from_secs(3),
            shutdown_flush_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteMode {
    /// Initial load or external navigation: the route is authoritative and
    /// may open a post.
    Navigate,
    /// Background reload: only drop references that no longer resolve.
    Reconcile,
}

enum Step {
    Command(Command),
    Event(SyncEvent),
    Tick,
    Stop,
}

// ============================================================================
// Timeline
// ============================================================================

/// The timeline engine.
///
/// All state is owned here and mutated through `&mut self` on one task.
/// Background work is spawned onto the runtime and reports back through an
/// internal channel; call [`Timeline::process_next`] / [`Timeline::settle`]
/// or hand control to [`Timeline::run`] to apply the results.
pub struct Timeline {
    api: Arc<dyn FeedApi>,
    local: Arc<dyn LocalStore>,
    history: Arc<dyn History>,
    config: TimelineConfig,

    store: PostStore,
    ledger: ReadLedger,
    scheduler: SyncScheduler,
    read_flush: Debouncer,
    refresh: RefreshTimer,

    filter: FilterState,
    feed_filter_label: Option<String>,
    /// The open post was explicitly marked unread while open.
    unread_override: bool,
    bookmark_toggling: HashSet<String>,
    hide_read_touched: bool,

    route: Route,
    /// Route waiting for the next load to finish before it can be resolved.
    pending_route: Option<Route>,

    writer: LocalWriter,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
    outstanding: usize,
    tasks: Vec<JoinHandle<()>>,
    notify_tx: broadcast::Sender<Notification>,
    started: bool,
    stopped: bool,
}

impl Timeline {
    /// Create an engine. Must be called inside a Tokio runtime (the local
    /// writer task is spawned here).
    pub fn new(
        api: Arc<dyn FeedApi>,
        local: Arc<dyn LocalStore>,
        history: Arc<dyn History>,
        config: TimelineConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let writer = LocalWriter::spawn(Arc::clone(&local), events_tx.clone());
        Self {
            api,
            local,
            history,
            read_flush: Debouncer::new(config.read_sync_delay),
            refresh: RefreshTimer::new(config.refresh_interval),
            config,
            store: PostStore::new(),
            ledger: ReadLedger::new(),
            scheduler: SyncScheduler::new(),
            filter: FilterState::default(),
            feed_filter_label: None,
            unread_override: false,
            bookmark_toggling: HashSet::new(),
            hide_read_touched: false,
            route: Route::empty(),
            pending_route: None,
            writer,
            events_tx,
            events_rx,
            outstanding: 0,
            tasks: Vec::new(),
            notify_tx,
            started: false,
            stopped: false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }

    fn notify(&self, notification: Notification) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.notify_tx.send(notification);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Read the current location, kick off the first load and start the
    /// periodic refresh. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        let route = Route::parse(&self.history.read_location());
        if !route.is_empty() {
            tracing::debug!(route = %route, "Resolving initial route after first load");
            self.notify(Notification::ResolvingRoute);
        }
        self.pending_route = Some(route);

        let local = Arc::clone(&self.local);
        self.spawn_task(
            "load_hide_read",
            async move {
                SyncEvent::HideReadLoaded {
                    result: local.load_hide_read().await.map_err(|e| e.to_string()),
                }
            },
            |error| SyncEvent::HideReadLoaded { result: Err(error) },
        );

        self.trigger_sync();
        self.refresh.start();
    }

    /// Stop timers, make a best-effort final flush of pending reads, wait for
    /// queued local writes and abort remaining background tasks.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.refresh.stop();
        self.read_flush.cancel();

        let ids = self.ledger.take_pending();
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Flushing pending reads before shutdown");
            let result = tokio::time::timeout(
                self.config.shutdown_flush_timeout,
                self.api.mark_entries_read(&ids),
            )
            .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(count = ids.len(), error = %e, "Final read flush failed");
                    self.ledger.requeue(ids);
                }
                Err(_) => {
                    tracing::warn!(count = ids.len(), "Final read flush timed out");
                    self.ledger.requeue(ids);
                }
            }
        }

        self.writer.close().await;
        for handle in self.tasks.drain(..) {
            handle.abort();
        }
        self.outstanding = 0;
        self.scheduler.reset();
        tracing::debug!("Timeline shut down");
    }

    // ========================================================================
    // Driving
    // ========================================================================

    /// Service due timers: flush pending reads, periodic refresh.
    pub fn tick(&mut self) {
        let now = Instant::now();
        if self.read_flush.fire_if_due(now) {
            self.flush_reads();
        }
        if self.refresh.fire_if_due(now) {
            tracing::debug!("Periodic refresh");
            self.trigger_sync();
        }
    }

    /// Wait for and apply one background result.
    pub async fn process_next(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.receive(event);
        }
    }

    /// Apply background results until no work is outstanding.
    pub async fn settle(&mut self) {
        while self.outstanding > 0 {
            self.process_next().await;
        }
    }

    /// Number of background operations whose result has not been applied.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Run until `commands` closes or yields `Command::Shutdown`.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        self.start();
        let mut tick = tokio::time::interval(TICK_INTERVAL);

        loop {
            let step = tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => Step::Stop,
                    Some(command) => Step::Command(command),
                },
                Some(event) = self.events_rx.recv() => Step::Event(event),
                _ = tick.tick() => Step::Tick,
            };
            match step {
                Step::Command(command) => self.execute(command),
                Step::Event(event) => self.receive(event),
                Step::Tick => self.tick(),
                Step::Stop => break,
            }
        }

        self.shutdown().await;
    }

    pub fn execute(&mut self, command: Command) {
        tracing::trace!(?command, "Executing command");
        match command {
            Command::OpenPost(id) => self.open_post(&id),
            Command::ClearSelection => self.clear_selection(),
            Command::SetFeedFilter { feed_id, label } => {
                self.set_feed_filter(&feed_id, label.as_deref())
            }
            Command::ClearFeedFilter => self.clear_feed_filter(),
            Command::SetSegment(segment) => self.set_segment(segment),
            Command::SetSearchQuery(query) => self.set_search_query(&query),
            Command::ClearSearch => self.clear_search(),
            Command::SelectFirstSearchResult => self.select_first_search_result(),
            Command::ToggleHideRead => self.toggle_hide_read(),
            Command::ToggleBookmark => self.toggle_bookmark(),
            Command::MarkRead(id) => self.mark_read(&id),
            Command::MarkUnread(id) => self.mark_unread(&id),
            Command::MarkAllRead => self.mark_all_read(),
            Command::MarkVisibleRead => self.mark_visible_read(),
            Command::SelectAdjacent(offset) => self.select_adjacent(offset),
            Command::TriggerSync => self.trigger_sync(),
            Command::LocationChanged(fragment) => self.handle_location_change(&fragment),
            Command::Shutdown => {
                tracing::debug!("Shutdown is handled by run(); ignoring");
            }
        }
    }

    /// Spawn background work that reports exactly one event. A panic is
    /// converted into the event built by `on_panic`.
    fn spawn_task<F, P>(&mut self, task: &'static str, future: F, on_panic: P)
    where
        F: Future<Output = SyncEvent> + Send + 'static,
        P: FnOnce(String) -> SyncEvent + Send + 'static,
    {
        let tx = self.events_tx.clone();
        self.outstanding += 1;
        self.tasks.retain(|handle| !handle.is_finished());
        self.tasks.push(tokio::spawn(async move {
            let event = match catch_task_panic(future).await {
                Ok(event) => event,
                Err(error) => {
                    tracing::error!(task, error = %error, "Background task panicked");
                    on_panic(error)
                }
            };
            if let Err(e) = tx.send(event) {
                tracing::warn!(task, error = %e, "Failed to deliver task result (receiver dropped)");
            }
        }));
    }

    fn submit_write(&mut self, op: WriteOp) {
        if self.writer.submit(op) {
            self.outstanding += 1;
        } else {
            tracing::warn!("Local writer closed, dropping write");
        }
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Request a full refresh. Coalesces with an in-flight load.
    pub fn trigger_sync(&mut self) {
        if let Some(token) = self.scheduler.request() {
            self.start_load(token);
        }
    }

    fn start_load(&mut self, token: u64) {
        self.ledger.begin_reload();
        tracing::debug!(token, "Starting timeline load");
        self.notify(Notification::SyncStarted { token });

        let api = Arc::clone(&self.api);
        let local = Arc::clone(&self.local);
        self.spawn_task(
            "load_timeline",
            async move {
                let (data, read_ids) = tokio::join!(api.load_timeline_data(), local.load_read_ids());
                let result = match data {
                    Ok(data) => {
                        let read_ids = read_ids.unwrap_or_else(|e| {
                            tracing::warn!(error = %e, "Failed to load persisted read ids, continuing without them");
                            HashSet::new()
                        });
                        Ok((data, read_ids))
                    }
                    Err(e) => Err(e.to_string()),
                };
                SyncEvent::TimelineLoaded { token, result }
            },
            move |error| SyncEvent::TimelineLoaded {
                token,
                result: Err(error),
            },
        );
    }

    fn spawn_enrichments(&mut self, token: u64) {
        let api = Arc::clone(&self.api);
        self.spawn_task(
            "load_icons",
            async move {
                SyncEvent::IconsLoaded {
                    token,
                    result: api.load_icon_map().await.map_err(|e| e.to_string()),
                }
            },
            move |error| SyncEvent::IconsLoaded {
                token,
                result: Err(error),
            },
        );

        let api = Arc::clone(&self.api);
        self.spawn_task(
            "load_starred",
            async move {
                SyncEvent::StarredLoaded {
                    token,
                    result: api.load_starred_ids().await.map_err(|e| e.to_string()),
                }
            },
            move |error| SyncEvent::StarredLoaded {
                token,
                result: Err(error),
            },
        );
    }

    fn receive(&mut self, event: SyncEvent) {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.handle_event(event);
    }

    /// Apply one background result. Results of superseded loads are dropped.
    pub fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::TimelineLoaded { token, result } => self.on_timeline_loaded(token, result),
            SyncEvent::IconsLoaded { token, result } => self.on_icons_loaded(token, result),
            SyncEvent::StarredLoaded { token, result } => self.on_starred_loaded(token, result),
            SyncEvent::ReadFlushCompleted { ids, result } => self.on_read_flush(ids, result),
            SyncEvent::BulkReadCompleted { ids, result } => self.on_bulk_read(ids, result),
            SyncEvent::RemoteUnreadCompleted { post_id, result } => {
                if let Err(error) = result {
                    tracing::warn!(post_id = %post_id, error = %error, "Failed to mark entry unread on server");
                }
            }
            SyncEvent::BookmarkCompleted { flag, result } => {
                self.on_bookmark_completed(flag, result)
            }
            SyncEvent::HideReadLoaded { result } => self.on_hide_read_loaded(result),
            SyncEvent::LocalWriteFinished { op, result } => {
                if let Err(error) = result {
                    tracing::debug!(op, error = %error, "Local write reported failure");
                }
            }
        }
    }

    fn on_timeline_loaded(
        &mut self,
        token: u64,
        result: Result<(TimelineData, HashSet<String>), String>,
    ) {
        if !self.scheduler.is_current(token) {
            tracing::debug!(
                token,
                current = self.scheduler.token(),
                "Ignoring stale timeline load (token mismatch)"
            );
            return;
        }

        match result {
            Ok((mut data, persisted)) => {
                let server_read: Vec<String> = data
                    .posts
                    .iter()
                    .filter(|p| p.is_read)
                    .map(|p| p.id.clone())
                    .collect();
                self.ledger.merge_reload(persisted, server_read);

                // Keep known bookmarks until the starred refresh lands.
                for post in data.posts.iter_mut() {
                    if let Some(old) = self.store.get(&post.id) {
                        if self.bookmark_toggling.contains(&post.id) {
                            post.is_bookmarked = old.is_bookmarked;
                        } else {
                            post.is_bookmarked |= old.is_bookmarked;
                        }
                    }
                }

                self.store.replace(data);
                self.store.sync_read_flags(self.ledger.read_ids());
                tracing::info!(
                    token,
                    posts = self.store.len(),
                    read = self.ledger.read_ids().len(),
                    "Timeline updated"
                );
                self.notify(Notification::DataChanged);
                if !self.store.is_empty() {
                    self.spawn_enrichments(token);
                }
            }
            Err(error) => {
                tracing::warn!(token, error = %error, "Timeline load failed, keeping previous posts");
                self.notify(Notification::SyncFailed { error });
            }
        }

        self.reconcile_after_load();
        self.notify(Notification::SyncStopped { token });

        if let Some(next) = self.scheduler.complete(token) {
            self.start_load(next);
        }
    }

    fn on_icons_loaded(
        &mut self,
        token: u64,
        result: Result<std::collections::HashMap<String, String>, String>,
    ) {
        if !self.scheduler.is_current(token) {
            tracing::debug!(
                token,
                current = self.scheduler.token(),
                "Ignoring stale icon map (token mismatch)"
            );
            return;
        }
        match result {
            Ok(icons) => {
                let changed = self.store.apply_icons(&icons, DEFAULT_AVATAR_URL, host_of);
                if changed > 0 {
                    tracing::debug!(token, changed, "Applied source icons");
                    self.notify(Notification::DataChanged);
                }
            }
            Err(error) => tracing::warn!(token, error = %error, "Failed to load source icons"),
        }
    }

    fn on_starred_loaded(&mut self, token: u64, result: Result<HashSet<String>, String>) {
        if !self.scheduler.is_current(token) {
            tracing::debug!(
                token,
                current = self.scheduler.token(),
                "Ignoring stale starred ids (token mismatch)"
            );
            return;
        }
        match result {
            Ok(starred) => {
                let changed = self.store.apply_starred(&starred, &self.bookmark_toggling);
                if changed > 0 {
                    tracing::debug!(token, changed, "Applied starred state");
                    self.notify(Notification::DataChanged);
                }
            }
            Err(error) => tracing::warn!(token, error = %error, "Failed to load starred entries"),
        }
    }

    fn on_hide_read_loaded(&mut self, result: Result<bool, String>) {
        match result {
            Ok(true) if !self.hide_read_touched && !self.filter.hide_read.is_enabled() => {
                self.filter.hide_read = HideRead::Live;
                self.notify(Notification::FilterChanged);
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(error = %error, "Failed to load hide-read preference"),
        }
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// External navigation (back/forward). Resolved like the initial route,
    /// without pushing a history entry.
    pub fn handle_location_change(&mut self, fragment: &str) {
        let parsed = Route::parse(fragment);
        if !self.store.is_loaded() {
            if !parsed.is_empty() {
                self.notify(Notification::ResolvingRoute);
            }
            self.pending_route = Some(parsed);
            return;
        }
        self.apply_route(parsed, RouteMode::Navigate);
    }

    fn reconcile_after_load(&mut self) {
        match self.pending_route.take() {
            Some(route) => self.apply_route(route, RouteMode::Navigate),
            None => self.apply_route(self.route.clone(), RouteMode::Reconcile),
        }
    }

    fn apply_route(&mut self, parsed: Route, mode: RouteMode) {
        let feed_id = parsed
            .feed_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| {
                parsed
                    .feed_url
                    .as_deref()
                    .and_then(|url| self.resolve_feed_url(url))
            });
        let feed_id = match feed_id {
            Some(id) if self.store.has_feed(&id) => Some(id),
            Some(id) => {
                tracing::debug!(feed_id = %id, "Route references unknown feed, dropping filter");
                None
            }
            None => None,
        };

        if let Some(post_id) = parsed.post_id.as_deref() {
            if !self.store.contains(post_id) {
                tracing::info!(post_id, "Route references a post that is not loaded, resetting");
                self.reset_route();
                return;
            }
        }

        if feed_id != self.filter.feed_filter {
            self.feed_filter_label = feed_id.as_deref().and_then(|id| self.subscription_label(id));
            self.filter.feed_filter = feed_id;
            self.notify(Notification::FilterChanged);
        }

        if mode == RouteMode::Navigate {
            match parsed.post_id.as_deref() {
                Some(post_id) => {
                    if self.filter.open_post.as_deref() != Some(post_id) {
                        self.open_post_internal(post_id, false);
                    }
                }
                None => {
                    if self.filter.open_post.take().is_some() {
                        self.unread_override = false;
                        self.notify(Notification::SelectionCleared);
                    }
                }
            }
        }

        let canonical = Route::from_parts(
            self.filter.feed_filter.as_deref(),
            self.filter.open_post.as_deref(),
        );
        self.replace_route(canonical);
    }

    /// Drop every reference and broadcast that nothing is selected.
    fn reset_route(&mut self) {
        self.filter.open_post = None;
        self.unread_override = false;
        if self.filter.feed_filter.take().is_some() {
            self.feed_filter_label = None;
            self.notify(Notification::FilterChanged);
        }
        self.replace_route(Route::empty());
        self.notify(Notification::SelectionCleared);
    }

    fn replace_route(&mut self, route: Route) {
        let fragment = route.to_fragment();
        if self.history.read_location() != fragment {
            self.history.replace_location(&fragment);
        }
        if route != self.route {
            self.route = route.clone();
            self.notify(Notification::RouteChanged { route });
        }
    }

    fn push_route(&mut self, route: Route) {
        self.history.push_location(&route.to_fragment());
        self.route = route.clone();
        self.notify(Notification::RouteChanged { route });
    }

    fn resolve_feed_url(&self, url: &str) -> Option<String> {
        let wanted = normalize_href(url)?;
        self.store
            .subscriptions()
            .iter()
            .find(|s| normalize_href(s.match_url()).as_deref() == Some(wanted.as_str()))
            .map(|s| s.feed_id.clone())
    }

    fn subscription_label(&self, feed_id: &str) -> Option<String> {
        self.store
            .subscription(feed_id)
            .and_then(Subscription::label)
            .map(str::to_string)
    }

    // ========================================================================
    // Selection & Filters
    // ========================================================================

    /// Open a post, marking it read, and push a history entry.
    pub fn open_post(&mut self, post_id: &str) {
        self.open_post_internal(post_id, true);
    }

    fn open_post_internal(&mut self, post_id: &str, push: bool) {
        if !self.store.contains(post_id) {
            tracing::warn!(post_id, "Cannot open unknown post");
            return;
        }
        let changed = self.filter.open_post.as_deref() != Some(post_id);
        if changed {
            self.filter.open_post = Some(post_id.to_string());
            self.unread_override = false;
        }
        if changed || !self.ledger.contains(post_id) {
            self.mark_read(post_id);
        }
        self.notify(Notification::PostOpened {
            post_id: post_id.to_string(),
        });
        if push {
            self.push_route(Route::from_parts(
                self.filter.feed_filter.as_deref(),
                Some(post_id),
            ));
        }
    }

    /// Close the open post. Pushes a history entry even when nothing was open.
    pub fn clear_selection(&mut self) {
        self.unread_override = false;
        if self.filter.open_post.take().is_some() {
            self.notify(Notification::SelectionCleared);
        }
        self.push_route(Route::from_parts(self.filter.feed_filter.as_deref(), None));
    }

    /// Narrow the timeline to one feed. `label` overrides the subscription
    /// title when non-blank.
    pub fn set_feed_filter(&mut self, feed_id: &str, label: Option<&str>) {
        let feed_id = feed_id.trim();
        if feed_id.is_empty() {
            return;
        }
        self.filter.feed_filter = Some(feed_id.to_string());
        self.feed_filter_label = label
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .or_else(|| self.subscription_label(feed_id));

        let open_in_feed = self.filter.open_post.as_deref().map(|open| {
            self.store
                .get(open)
                .is_some_and(|p| p.feed_id.as_deref() == Some(feed_id))
        });
        if open_in_feed == Some(false) {
            self.filter.open_post = None;
            self.unread_override = false;
            self.notify(Notification::SelectionCleared);
        }

        self.notify(Notification::FilterChanged);
        self.push_route(Route::from_parts(
            Some(feed_id),
            self.filter.open_post.as_deref(),
        ));
    }

    pub fn clear_feed_filter(&mut self) {
        self.filter.feed_filter = None;
        self.feed_filter_label = None;
        self.notify(Notification::FilterChanged);
        self.push_route(Route::from_parts(None, self.filter.open_post.as_deref()));
    }

    /// Switch segment. Leaving the segment the hide-read snapshot was taken
    /// in falls back to live filtering.
    pub fn set_segment(&mut self, segment: Segment) {
        if self.filter.segment == segment {
            return;
        }
        self.filter.segment = segment;
        if self.filter.hide_read.has_snapshot() {
            self.filter.hide_read = HideRead::Live;
        }
        self.notify(Notification::FilterChanged);
    }

    /// Enter or update search mode.
    pub fn set_search_query(&mut self, query: &str) {
        self.filter.search = Some(query.trim().to_string());
        self.notify(Notification::FilterChanged);
    }

    pub fn clear_search(&mut self) {
        if self.filter.search.take().is_some() {
            self.notify(Notification::FilterChanged);
        }
    }

    pub fn select_first_search_result(&mut self) {
        if self.filter.search.is_none() {
            return;
        }
        if let Some(first) = self.visible_ids().into_iter().next() {
            self.open_post(&first);
        }
    }

    /// Toggle hide-read. Turning it on freezes the current read set.
    pub fn toggle_hide_read(&mut self) {
        self.hide_read_touched = true;
        let enabled = if self.filter.hide_read.is_enabled() {
            self.filter.hide_read = HideRead::Off;
            false
        } else {
            self.filter.hide_read = HideRead::Snapshot(self.ledger.read_ids().clone());
            true
        };
        tracing::debug!(enabled, "Hide read toggled");
        self.submit_write(WriteOp::SaveHideRead(enabled));
        self.notify(Notification::FilterChanged);
    }

    /// Open the post `offset` positions away in the visible list. With
    /// nothing open, a positive offset opens the first post and a negative
    /// one the last.
    pub fn select_adjacent(&mut self, offset: isize) {
        if !self.store.is_loaded() || offset == 0 {
            return;
        }
        let visible = self.visible_ids();
        if visible.is_empty() {
            return;
        }
        let current = self
            .filter
            .open_post
            .as_deref()
            .and_then(|open| visible.iter().position(|id| id == open));
        let target = match current {
            Some(index) => {
                let target = index as isize + offset;
                if target < 0 || target >= visible.len() as isize {
                    return;
                }
                target as usize
            }
            None if offset > 0 => 0,
            None => visible.len() - 1,
        };
        self.open_post(&visible[target]);
    }

    // ========================================================================
    // Read State
    // ========================================================================

    /// Mark read locally, persist, and queue a debounced write-back.
    pub fn mark_read(&mut self, post_id: &str) {
        let newly_read = !self.ledger.contains(post_id);
        self.store.set_read(post_id, true);
        self.ledger.enqueue(post_id);
        self.read_flush.arm();
        if self.filter.open_post.as_deref() == Some(post_id) {
            self.unread_override = false;
        }
        if newly_read {
            self.submit_write(WriteOp::MarkRead(post_id.to_string()));
            self.notify(Notification::ReadStateChanged {
                post_ids: vec![post_id.to_string()],
                is_read: true,
            });
        }
    }

    /// Mark unread locally and drop it from the pending queue. The server is
    /// only told when it may already have seen the read.
    pub fn mark_unread(&mut self, post_id: &str) {
        let outcome = self.ledger.remove(post_id);
        self.store.set_read(post_id, false);
        if let HideRead::Snapshot(hidden) = &mut self.filter.hide_read {
            hidden.remove(post_id);
        }
        if self.filter.open_post.as_deref() == Some(post_id) {
            self.unread_override = true;
        }
        if !self.ledger.has_pending() {
            self.read_flush.cancel();
        }
        self.submit_write(WriteOp::ClearRead(post_id.to_string()));

        if outcome.was_read && !outcome.was_pending {
            let api = Arc::clone(&self.api);
            let id = post_id.to_string();
            let panic_id = id.clone();
            self.spawn_task(
                "mark_unread",
                async move {
                    let result = api
                        .mark_entries_unread(std::slice::from_ref(&id))
                        .await
                        .map_err(|e| e.to_string());
                    SyncEvent::RemoteUnreadCompleted {
                        post_id: id,
                        result,
                    }
                },
                move |error| SyncEvent::RemoteUnreadCompleted {
                    post_id: panic_id,
                    result: Err(error),
                },
            );
        }

        self.notify(Notification::ReadStateChanged {
            post_ids: vec![post_id.to_string()],
            is_read: false,
        });
    }

    /// Send the pending queue as one batch. The queue is cleared up front and
    /// refilled if the write fails.
    fn flush_reads(&mut self) {
        let ids = self.ledger.take_pending();
        if ids.is_empty() {
            return;
        }
        tracing::debug!(count = ids.len(), "Flushing read state");
        let api = Arc::clone(&self.api);
        let panic_ids = ids.clone();
        self.spawn_task(
            "flush_reads",
            async move {
                let result = api.mark_entries_read(&ids).await.map_err(|e| e.to_string());
                SyncEvent::ReadFlushCompleted { ids, result }
            },
            move |error| SyncEvent::ReadFlushCompleted {
                ids: panic_ids,
                result: Err(error),
            },
        );
    }

    fn on_read_flush(&mut self, ids: Vec<String>, result: Result<(), String>) {
        match result {
            Ok(()) => tracing::debug!(count = ids.len(), "Read state synced"),
            Err(error) => {
                let count = ids.len();
                let requeued = self.ledger.requeue(ids);
                tracing::warn!(count, requeued, error = %error, "Read sync failed, re-queued");
                if requeued > 0 {
                    self.read_flush.arm();
                }
            }
        }
    }

    /// Mark every loaded post read. Applied locally only once the server
    /// accepts the batch; a failure leaves everything as it was.
    pub fn mark_all_read(&mut self) {
        let ids: Vec<String> = self.store.posts().iter().map(|p| p.id.clone()).collect();
        self.bulk_mark_read(ids);
    }

    /// Mark the currently visible posts read, with the same policy as
    /// [`Timeline::mark_all_read`].
    pub fn mark_visible_read(&mut self) {
        let ids = self.visible_ids();
        self.bulk_mark_read(ids);
    }

    fn bulk_mark_read(&mut self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        tracing::info!(count = ids.len(), "Marking posts read");
        let api = Arc::clone(&self.api);
        let panic_ids = ids.clone();
        self.spawn_task(
            "mark_all_read",
            async move {
                let result = api.mark_entries_read(&ids).await.map_err(|e| e.to_string());
                SyncEvent::BulkReadCompleted { ids, result }
            },
            move |error| SyncEvent::BulkReadCompleted {
                ids: panic_ids,
                result: Err(error),
            },
        );
    }

    fn on_bulk_read(&mut self, ids: Vec<String>, result: Result<(), String>) {
        if let Err(error) = result {
            tracing::warn!(count = ids.len(), error = %error, "Mark all read failed");
            self.notify(Notification::MarkAllReadFailed { error });
            return;
        }
        self.ledger.apply_bulk(ids.iter().map(String::as_str));
        for id in &ids {
            self.store.set_read(id, true);
        }
        if self
            .filter
            .open_post
            .as_ref()
            .is_some_and(|open| ids.contains(open))
        {
            self.unread_override = false;
        }
        if !self.ledger.has_pending() {
            self.read_flush.cancel();
        }
        self.submit_write(WriteOp::MarkReadMany(ids.clone()));
        self.notify(Notification::ReadStateChanged {
            post_ids: ids,
            is_read: true,
        });
    }

    // ========================================================================
    // Bookmarks
    // ========================================================================

    /// Toggle the bookmark on the open post.
    pub fn toggle_bookmark(&mut self) {
        match self.filter.open_post.clone() {
            Some(post_id) => self.toggle_bookmark_for(&post_id),
            None => tracing::debug!("No open post to bookmark"),
        }
    }

    /// Optimistically flip the bookmark on `post_id` and confirm with the
    /// server, rolling back on failure. One toggle per post at a time.
    pub fn toggle_bookmark_for(&mut self, post_id: &str) {
        if self.bookmark_toggling.contains(post_id) {
            tracing::debug!(post_id, "Bookmark toggle already in flight, ignoring");
            return;
        }
        let Some(flag) = OptimisticFlag::flip(&mut self.store, post_id, FlagField::Bookmarked)
        else {
            tracing::warn!(post_id, "Cannot bookmark unknown post");
            return;
        };
        self.bookmark_toggling.insert(post_id.to_string());
        self.notify(Notification::BookmarkChanged {
            post_id: post_id.to_string(),
            is_bookmarked: flag.applied(),
        });

        let api = Arc::clone(&self.api);
        let task_flag = flag.clone();
        self.spawn_task(
            "toggle_bookmark",
            async move {
                let ids = [task_flag.post_id().to_string()];
                let result = if task_flag.applied() {
                    api.set_starred(&ids).await
                } else {
                    api.clear_starred(&ids).await
                };
                SyncEvent::BookmarkCompleted {
                    flag: task_flag,
                    result: result.map_err(|e| e.to_string()),
                }
            },
            move |error| SyncEvent::BookmarkCompleted {
                flag,
                result: Err(error),
            },
        );
    }

    fn on_bookmark_completed(&mut self, flag: OptimisticFlag, result: Result<(), String>) {
        self.bookmark_toggling.remove(flag.post_id());
        match result {
            Ok(()) => tracing::debug!(
                post_id = flag.post_id(),
                bookmarked = flag.applied(),
                "Bookmark saved"
            ),
            Err(error) => {
                tracing::warn!(
                    post_id = flag.post_id(),
                    original_status = flag.previous(),
                    error = %error,
                    "Bookmark toggle failed, rolling back"
                );
                if flag.rollback(&mut self.store) {
                    self.notify(Notification::BookmarkChanged {
                        post_id: flag.post_id().to_string(),
                        is_bookmarked: flag.previous(),
                    });
                }
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn visible_posts(&self) -> Vec<Post> {
        filter::visible_posts(self.store.posts(), &self.filter)
            .into_iter()
            .cloned()
            .collect()
    }

    fn visible_ids(&self) -> Vec<String> {
        filter::visible_posts(self.store.posts(), &self.filter)
            .into_iter()
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn view(&self) -> TimelineView {
        let posts = self.visible_posts();
        let loading = !self.store.is_loaded();
        let empty_state = (posts.is_empty() && !loading).then(|| {
            filter::empty_state(
                self.filter.feed_filter.is_some(),
                self.store.subscription_count(),
            )
        });
        TimelineView {
            posts,
            empty_state,
            segment: self.filter.segment,
            feed_filter: self.filter.feed_filter.clone(),
            feed_filter_label: self.feed_filter_label.clone(),
            search_query: self.filter.search.clone(),
            hide_read: self.filter.hide_read.is_enabled(),
            open_post_id: self.filter.open_post.clone(),
            loading,
        }
    }

    pub fn post(&self, post_id: &str) -> Option<&Post> {
        self.store.get(post_id)
    }

    pub fn posts(&self) -> &[Post] {
        self.store.posts()
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        self.store.subscriptions()
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn open_post_id(&self) -> Option<&str> {
        self.filter.open_post.as_deref()
    }

    /// True when the open post was marked unread while open.
    pub fn unread_override(&self) -> bool {
        self.unread_override
    }

    pub fn is_syncing(&self) -> bool {
        self.scheduler.is_loading()
    }

    pub fn load_token(&self) -> u64 {
        self.scheduler.token()
    }

    pub fn pending_reads(&self) -> &[String] {
        self.ledger.pending()
    }

    pub fn read_ids(&self) -> &HashSet<String> {
        self.ledger.read_ids()
    }

    pub fn hide_read(&self) -> &HideRead {
        &self.filter.hide_read
    }

    pub fn segment(&self) -> Segment {
        self.filter.segment
    }

    pub fn feed_filter(&self) -> Option<&str> {
        self.filter.feed_filter.as_deref()
    }

    pub fn feed_filter_label(&self) -> Option<&str> {
        self.feed_filter_label.as_deref()
    }

    pub fn search_query(&self) -> Option<&str> {
        self.filter.search.as_deref()
    }

    pub fn is_bookmark_in_flight(&self, post_id: &str) -> bool {
        self.bookmark_toggling.contains(post_id)
    }
}

impl Drop for Timeline {
    fn drop(&mut self) {
        for handle in self.tasks.drain(..) {
            handle.abort();
        }
    }
}
