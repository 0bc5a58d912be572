use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::rc::Rc;
use std::time::{Duration, Instant};

use photon_shared::{
    DEFAULT_LIVE_STALE_THRESHOLD_SECS, FrameHeader, HistoryPoint, LinkRecord, LinkSnapshot,
    LiveLinks, LiveLinksUpdate, RoutePlanRequest, TelemetryFrame,
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::Backend;
use crate::chart::ChartHistory;
use crate::config::{ClientConfig, SCHEDULER_RESOLUTION_MS};
use crate::error::ClientError;
use crate::markers::MarkerTable;
use crate::meta_cache::MetadataCache;
use crate::overlay::{self, OverlayEntity, OverlayTable, StyleContext};
use crate::route::{RouteEffect, RouteEvent, RoutePhase, RouteSelection};
use crate::scheduler::{PollKind, PollScheduler, PollTask, TickOutcome};
use crate::style::ViewMode;
use crate::summary::{NetworkSummary, SummaryThrottle};
use crate::surface::RenderSurface;

struct EngineState<S> {
    surface: S,
    view_mode: ViewMode,
    markers_enabled: bool,
    cache: MetadataCache,
    overlay: OverlayTable,
    markers: MarkerTable,
    route: RouteSelection,
    scheduler: PollScheduler,
    /// Newest snapshot entry per id from any poll kind; source for restyles.
    latest: HashMap<String, LinkSnapshot>,
    /// Entries of the last full snapshot; source for marker re-creation.
    last_full: Vec<LinkSnapshot>,
    header: Option<FrameHeader>,
    stale_threshold_sec: f64,
    needs_geometry: bool,
    /// Ids already fetched with coordinates that still came back without.
    geometry_requested: HashSet<String>,
    summary: Option<NetworkSummary>,
    summary_throttle: SummaryThrottle,
    chart: ChartHistory,
    registry: Vec<LinkRecord>,
    /// Bumped whenever route polling starts or stops.
    route_generation: u64,
}

impl<S: RenderSurface> EngineState<S> {
    fn style_context(&self) -> StyleContext<'_> {
        StyleContext {
            mode: self.view_mode,
            route: &self.route,
        }
    }

    fn restyle(&mut self) {
        let links: Vec<LinkSnapshot> = self.latest.values().cloned().collect();
        let instructions = overlay::diff(
            &links,
            false,
            &self.cache,
            &self.overlay,
            self.style_context(),
        );
        let stats = self.overlay.apply(instructions, &mut self.surface);
        if stats.writes() > 0 {
            debug!(restyled = stats.restyled, created = stats.created, "overlay restyled");
        }
    }

    fn apply_focus(&mut self) {
        let instructions = overlay::focus_diff(&self.overlay, self.style_context());
        let stats = self.overlay.apply(instructions, &mut self.surface);
        if stats.visibility > 0 {
            debug!(
                changed = stats.visibility,
                focused = self.route.is_focused(),
                "focus applied"
            );
        }
        self.refresh_markers();
    }

    /// Markers are hidden while focused or switched off, otherwise rebuilt
    /// from the last full snapshot.
    fn refresh_markers(&mut self) {
        if self.route.is_focused() || !self.markers_enabled {
            self.markers.clear(&mut self.surface);
        } else {
            self.markers.sync(
                &self.last_full,
                &self.cache,
                self.stale_threshold_sec,
                &mut self.surface,
            );
        }
    }

    /// Coordinates are requested again only for ids not yet asked for.
    fn note_missing_geometry(&mut self, missing: &[String], requested: bool) {
        if requested {
            self.geometry_requested.extend(missing.iter().cloned());
        }
        if missing.iter().any(|id| !self.geometry_requested.contains(id)) {
            self.needs_geometry = true;
        }
    }

    fn perform(&mut self, effect: RouteEffect) {
        match effect {
            RouteEffect::StartRoutePolling => {
                self.scheduler.start_route_polling();
                self.route_generation = self.route_generation.wrapping_add(1);
                info!("route polling started");
            }
            RouteEffect::StopRoutePolling => {
                if self.scheduler.task(PollKind::Route).enabled {
                    info!("route polling stopped");
                }
                self.scheduler.stop_route_polling();
                self.route_generation = self.route_generation.wrapping_add(1);
            }
            RouteEffect::ApplyFocus => self.apply_focus(),
            RouteEffect::Restyle => self.restyle(),
            RouteEffect::RequestPlan { .. } | RouteEffect::RequestActivation(_) => {}
        }
    }
}

fn sanitize_threshold(threshold: f64) -> f64 {
    if threshold.is_finite() && threshold > 0.0 {
        threshold
    } else {
        DEFAULT_LIVE_STALE_THRESHOLD_SECS
    }
}

struct Inner<B, S> {
    backend: B,
    state: RefCell<EngineState<S>>,
}

/// Poll orchestration, reconciliation and the route workflow wired to a
/// backend and a render surface.
///
/// Clones share the same engine. State is only touched from poll completions
/// and user actions on a single-threaded local set, and no borrow is held
/// across an await point.
pub struct Engine<B, S> {
    inner: Rc<Inner<B, S>>,
}

impl<B, S> Clone for Engine<B, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<B, S> Engine<B, S>
where
    B: Backend + 'static,
    S: RenderSurface + 'static,
{
    pub fn new(backend: B, surface: S, config: &ClientConfig) -> Self {
        let state = EngineState {
            surface,
            view_mode: config.view_mode,
            markers_enabled: config.show_markers,
            cache: MetadataCache::default(),
            overlay: OverlayTable::default(),
            markers: MarkerTable::default(),
            route: RouteSelection::default(),
            scheduler: PollScheduler::new(&config.intervals),
            latest: HashMap::new(),
            last_full: Vec::new(),
            header: None,
            stale_threshold_sec: DEFAULT_LIVE_STALE_THRESHOLD_SECS,
            needs_geometry: true,
            geometry_requested: HashSet::new(),
            summary: None,
            summary_throttle: SummaryThrottle::new(config.summary_refresh),
            chart: ChartHistory::default(),
            registry: Vec::new(),
            route_generation: 0,
        };
        Self {
            inner: Rc::new(Inner {
                backend,
                state: RefCell::new(state),
            }),
        }
    }

    pub fn route(&self) -> RouteSelection {
        self.inner.state.borrow().route.clone()
    }

    pub fn phase(&self) -> RoutePhase {
        self.inner.state.borrow().route.phase()
    }

    pub fn plan_message(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .route
            .plan_message()
            .map(str::to_string)
    }

    pub fn summary(&self) -> Option<NetworkSummary> {
        self.inner.state.borrow().summary.clone()
    }

    pub fn frame_header(&self) -> Option<FrameHeader> {
        self.inner.state.borrow().header.clone()
    }

    pub fn chart_points(&self) -> Vec<HistoryPoint> {
        self.inner.state.borrow().chart.points().cloned().collect()
    }

    pub fn registry(&self) -> Vec<LinkRecord> {
        self.inner.state.borrow().registry.clone()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.inner.state.borrow().view_mode
    }

    pub fn markers_enabled(&self) -> bool {
        self.inner.state.borrow().markers_enabled
    }

    pub fn overlay_entity(&self, id: &str) -> Option<OverlayEntity> {
        self.inner.state.borrow().overlay.get(id).cloned()
    }

    pub fn overlay_len(&self) -> usize {
        self.inner.state.borrow().overlay.len()
    }

    pub fn has_marker(&self, id: &str) -> bool {
        self.inner.state.borrow().markers.contains(id)
    }

    pub fn marker_len(&self) -> usize {
        self.inner.state.borrow().markers.len()
    }

    pub fn cached_links(&self) -> usize {
        self.inner.state.borrow().cache.len()
    }

    pub fn poll_task(&self, kind: PollKind) -> PollTask {
        self.inner.state.borrow().scheduler.task(kind).clone()
    }

    pub fn with_surface<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.state.borrow().surface)
    }

    // Poll orchestration

    /// Fires every poll kind that is due and spawns its request on the
    /// current local set. Returns the kinds that fired.
    pub fn tick(&self, now: Instant) -> Vec<PollKind> {
        let fired: Vec<PollKind> = {
            let mut state = self.inner.state.borrow_mut();
            PollKind::ALL
                .into_iter()
                .filter(|kind| match state.scheduler.try_fire(*kind, now) {
                    TickOutcome::Fired => true,
                    TickOutcome::InFlight => {
                        debug!(kind = kind.as_str(), "poll skipped, previous request in flight");
                        false
                    }
                    TickOutcome::Hidden => {
                        debug!(kind = kind.as_str(), "poll skipped, not visible");
                        false
                    }
                    TickOutcome::Disabled | TickOutcome::NotDue => false,
                })
                .collect()
        };

        for kind in fired.iter().copied() {
            let engine = self.clone();
            tokio::task::spawn_local(async move {
                engine.execute(kind, now).await;
            });
        }
        fired
    }

    /// Runs one poll of `kind` inline, subject to the same guards as `tick`.
    pub async fn poll(&self, kind: PollKind, now: Instant) -> TickOutcome {
        let outcome = self.inner.state.borrow_mut().scheduler.try_fire(kind, now);
        if outcome == TickOutcome::Fired {
            self.execute(kind, now).await;
        }
        outcome
    }

    /// Drives `tick` until `shutdown` resolves. Must run inside a
    /// [`tokio::task::LocalSet`].
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(SCHEDULER_RESOLUTION_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                instant = ticker.tick() => {
                    self.tick(instant.into_std());
                }
            }
        }
        info!("poll loop stopped");
    }

    async fn execute(&self, kind: PollKind, now: Instant) {
        match kind {
            PollKind::Full => self.poll_full(now).await,
            PollKind::Route => self.poll_route().await,
            PollKind::Chart => self.poll_chart().await,
        }
        self.inner.state.borrow_mut().scheduler.complete(kind);
    }

    async fn poll_full(&self, now: Instant) {
        let include_coordinates = self.inner.state.borrow().needs_geometry;
        match self.inner.backend.fetch_telemetry(include_coordinates).await {
            Ok(frame) => self.apply_frame(frame, include_coordinates, now),
            Err(e) => {
                warn!(kind = PollKind::Full.as_str(), error = %e, "poll failed, keeping last state");
            }
        }
    }

    fn apply_frame(&self, frame: TelemetryFrame, with_coordinates: bool, now: Instant) {
        let (header, links, dropped) = frame.split_links();
        if dropped > 0 {
            warn!(dropped, "skipped malformed link entries");
        }

        let mut guard = self.inner.state.borrow_mut();
        let state = &mut *guard;

        let ctx = StyleContext {
            mode: state.view_mode,
            route: &state.route,
        };
        let reconciled = overlay::reconcile(
            links,
            true,
            &mut state.cache,
            &mut state.overlay,
            ctx,
            &mut state.surface,
        );
        state.needs_geometry = false;
        state.note_missing_geometry(&reconciled.missing_geometry, with_coordinates);
        state.stale_threshold_sec = sanitize_threshold(header.policy.live_stale_threshold_sec);

        debug!(
            links = reconciled.links.len(),
            created = reconciled.stats.created,
            restyled = reconciled.stats.restyled,
            removed = reconciled.stats.removed,
            missing_geometry = reconciled.missing_geometry.len(),
            "full snapshot reconciled"
        );

        state.latest = reconciled
            .links
            .iter()
            .map(|link| (link.id.clone(), link.clone()))
            .collect();
        state.last_full = reconciled.links;
        state.refresh_markers();

        if state.summary_throttle.ready(now) {
            let summary =
                NetworkSummary::compute(&state.last_full, &header, state.stale_threshold_sec);
            info!(
                links = summary.links,
                live = summary.live,
                stale = summary.stale_live,
                congested = summary.congested,
                mean_ci = summary.mean_ci,
                total_flow = summary.total_flow,
                weather = summary.weather.as_deref().unwrap_or("-"),
                paused = summary.paused,
                "network summary"
            );
            state.summary = Some(summary);
        }
        state.header = Some(header);
    }

    async fn poll_route(&self) {
        let generation = self.inner.state.borrow().route_generation;
        let mut live = match self.inner.backend.fetch_route_live().await {
            Ok(live) => live,
            Err(e) => {
                warn!(kind = PollKind::Route.as_str(), error = %e, "poll failed, keeping last state");
                return;
            }
        };
        if self.inner.state.borrow().route_generation != generation {
            debug!("discarding stale route-live response");
            return;
        }

        let (links, dropped) = live.take_links();
        if dropped > 0 {
            warn!(dropped, "skipped malformed route link entries");
        }
        let server_route = live.effective_route().cloned();
        self.apply_route_event(RouteEvent::ServerRoute(server_route));

        let mut guard = self.inner.state.borrow_mut();
        let state = &mut *guard;
        if !state.route.has_active_route() || links.is_empty() {
            return;
        }
        let ctx = StyleContext {
            mode: state.view_mode,
            route: &state.route,
        };
        let reconciled = overlay::reconcile(
            links,
            false,
            &mut state.cache,
            &mut state.overlay,
            ctx,
            &mut state.surface,
        );
        state.note_missing_geometry(&reconciled.missing_geometry, false);
        for link in reconciled.links {
            state.latest.insert(link.id.clone(), link);
        }
    }

    async fn poll_chart(&self) {
        match self.inner.backend.fetch_history().await {
            Ok(points) => {
                let mut state = self.inner.state.borrow_mut();
                state.chart.replace(points);
                debug!(points = state.chart.len(), "chart history updated");
            }
            Err(e) => {
                warn!(kind = PollKind::Chart.as_str(), error = %e, "poll failed, keeping last state");
            }
        }
    }

    // Route workflow

    /// Applies `event` and performs its local effects; returns the request
    /// effects still to be issued.
    fn apply_route_event(&self, event: RouteEvent) -> Vec<RouteEffect> {
        let mut state = self.inner.state.borrow_mut();
        let effects = state.route.apply(event);
        let mut requests = Vec::new();
        for effect in effects {
            match effect {
                RouteEffect::RequestPlan { .. } | RouteEffect::RequestActivation(_) => {
                    requests.push(effect);
                }
                other => state.perform(other),
            }
        }
        requests
    }

    async fn dispatch(&self, event: RouteEvent) {
        let mut pending: VecDeque<RouteEffect> = self.apply_route_event(event).into();
        while let Some(effect) = pending.pop_front() {
            let resolved = match effect {
                RouteEffect::RequestPlan { start, end } => {
                    let request = RoutePlanRequest {
                        start_link_id: start.clone(),
                        end_link_id: end.clone(),
                    };
                    let outcome = self
                        .inner
                        .backend
                        .plan_route(request)
                        .await
                        .map_err(|e| {
                            warn!(error = %e, "route plan request failed");
                            e.user_message()
                        });
                    RouteEvent::PlanResolved {
                        start,
                        end,
                        outcome,
                    }
                }
                RouteEffect::RequestActivation(request) => {
                    let outcome = self
                        .inner
                        .backend
                        .activate_route(request.clone())
                        .await
                        .map_err(|e| {
                            warn!(error = %e, "route activation request failed");
                            e.user_message()
                        });
                    RouteEvent::ActivateResolved { request, outcome }
                }
                _ => continue,
            };
            pending.extend(self.apply_route_event(resolved));
        }
    }

    pub fn select_link(&self, id: &str) {
        self.apply_route_event(RouteEvent::SelectLink(id.to_string()));
    }

    /// Plans a route between the selected endpoints. Failures end up in
    /// [`Engine::plan_message`].
    pub async fn plan_route(&self) -> RoutePhase {
        self.dispatch(RouteEvent::PlanRequested).await;
        self.phase()
    }

    pub async fn activate_route(&self) -> RoutePhase {
        self.dispatch(RouteEvent::ActivateRequested).await;
        self.phase()
    }

    pub fn clear_route(&self) {
        self.apply_route_event(RouteEvent::Clear);
    }

    pub fn toggle_focus(&self) {
        self.apply_route_event(RouteEvent::ToggleFocus);
    }

    // Display controls

    pub fn set_view_mode(&self, mode: ViewMode) {
        let mut state = self.inner.state.borrow_mut();
        if state.view_mode == mode {
            return;
        }
        state.view_mode = mode;
        state.restyle();
    }

    pub fn set_markers_enabled(&self, enabled: bool) {
        let mut state = self.inner.state.borrow_mut();
        state.markers_enabled = enabled;
        state.refresh_markers();
    }

    pub fn set_visible(&self, visible: bool) {
        self.inner.state.borrow_mut().scheduler.set_visible(visible);
    }

    // Administration

    /// Loads the link catalogue and seeds the metadata cache with its
    /// geometry.
    pub async fn refresh_registry(&self) -> Result<usize, ClientError> {
        let registry = self.inner.backend.fetch_registry().await?;
        let mut state = self.inner.state.borrow_mut();
        for record in &registry.links {
            state.cache.prime(record);
        }
        let count = registry.links.len();
        state.registry = registry.links;
        info!(links = count, cached = state.cache.len(), "link registry loaded");
        Ok(count)
    }

    pub async fn live_links(&self) -> Result<LiveLinks, ClientError> {
        self.inner.backend.fetch_live_links().await
    }

    pub async fn set_live_links(&self, link_ids: Vec<String>) -> Result<LiveLinks, ClientError> {
        self.update_live_links(LiveLinksUpdate::only(link_ids)).await
    }

    pub async fn set_all_live(&self) -> Result<LiveLinks, ClientError> {
        self.update_live_links(LiveLinksUpdate::all()).await
    }

    async fn update_live_links(&self, update: LiveLinksUpdate) -> Result<LiveLinks, ClientError> {
        let live = self.inner.backend.update_live_links(update).await?;
        if !live.unknown_links.is_empty() {
            warn!(unknown = ?live.unknown_links, "backend ignored unknown link ids");
        }
        info!(live = live.live_mode_links.len(), "live link set updated");
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use photon_shared::{ActiveRoute, LinkRegistry, RouteLive, RoutePlan};
    use serde_json::json;
    use tokio::task::LocalSet;

    use super::*;
    use crate::style::{ACTIVE_GLOW_OPACITY, CongestionBucket, palette};
    use crate::testing::{FakeBackend, Op, RecordingSurface, frame, link_json};

    type TestEngine = Engine<FakeBackend, RecordingSurface>;

    fn engine(backend: &FakeBackend) -> TestEngine {
        Engine::new(
            backend.clone(),
            RecordingSurface::default(),
            &ClientConfig::default(),
        )
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    /// Polls a full snapshot, then plans and activates L1 -> L3 over
    /// `[L1, L2, L3]` with a server length of 1200 m.
    async fn activated(backend: &FakeBackend, t0: Instant) -> TestEngine {
        backend.set_links(vec![
            link_json("L1", 0.2, true),
            link_json("L2", 0.5, true),
            link_json("L3", 0.3, true),
            link_json("L4", 0.1, true),
        ]);
        let engine = engine(backend);
        engine.poll(PollKind::Full, t0).await;
        engine.select_link("L1");
        engine.select_link("L3");
        backend.set_plan(Ok(RoutePlan {
            link_ids: vec!["L1".into(), "L2".into(), "L3".into()],
            total_length_m: 900.0,
        }));
        assert_eq!(engine.plan_route().await, RoutePhase::Planned);
        backend.set_activation(Some(Ok(ActiveRoute {
            link_ids: vec!["L1".into(), "L2".into(), "L3".into()],
            total_length_m: Some(1200.0),
            ..ActiveRoute::default()
        })));
        assert_eq!(engine.activate_route().await, RoutePhase::Active);
        engine
    }

    #[tokio::test]
    async fn coordinates_requested_first_and_after_cache_miss() {
        let backend = FakeBackend::default();
        backend.set_links(vec![link_json("L1", 0.2, true)]);
        let engine = engine(&backend);
        let t0 = Instant::now();

        engine.poll(PollKind::Full, t0).await;
        assert!(engine.overlay_entity("L1").is_some());
        engine.poll(PollKind::Full, t0 + secs(2)).await;

        // A new link appears; its geometry only arrives on request.
        backend.set_links(vec![link_json("L1", 0.2, true), link_json("L2", 0.2, true)]);
        engine.poll(PollKind::Full, t0 + secs(4)).await;
        assert!(engine.overlay_entity("L2").is_none());
        engine.poll(PollKind::Full, t0 + secs(6)).await;
        assert!(engine.overlay_entity("L2").is_some());

        assert_eq!(backend.coordinate_requests(), vec![true, false, false, true]);
        assert_eq!(engine.with_surface(|s| s.creates("L1")), 1);
    }

    #[tokio::test]
    async fn link_without_backend_geometry_is_requested_once() {
        let backend = FakeBackend::default();
        let mut bare = link_json("L2", 0.2, true);
        bare["coordinates"] = json!([]);
        backend.set_links(vec![link_json("L1", 0.2, true), bare]);
        let engine = engine(&backend);
        let t0 = Instant::now();

        engine.poll(PollKind::Full, t0).await;
        engine.poll(PollKind::Full, t0 + secs(2)).await;
        engine.poll(PollKind::Full, t0 + secs(4)).await;

        assert_eq!(backend.coordinate_requests(), vec![true, false, false]);
        assert!(engine.overlay_entity("L1").is_some());
        assert!(engine.overlay_entity("L2").is_none());
    }

    #[tokio::test]
    async fn congested_live_link_renders_danger_style() {
        let backend = FakeBackend::default();
        backend.set_links(vec![link_json("L1", 0.9, true)]);
        let engine = engine(&backend);
        engine.poll(PollKind::Full, Instant::now()).await;

        let style = engine.overlay_entity("L1").expect("entity").style;
        assert_eq!(style.color, palette::DANGER);
        assert_eq!(style.weight, CongestionBucket::Danger.weight());
        assert_eq!(style.opacity, 1.0);
        assert_eq!(
            engine.with_surface(|s| s.links.get("L1").map(|(drawn, _)| *drawn)),
            Some(style)
        );
    }

    #[tokio::test]
    async fn identical_snapshot_writes_nothing_twice() {
        let backend = FakeBackend::default();
        backend.set_links(vec![link_json("L1", 0.9, true), link_json("L2", 0.1, false)]);
        let engine = engine(&backend);
        let t0 = Instant::now();

        engine.poll(PollKind::Full, t0).await;
        let writes = engine.with_surface(|s| s.style_writes());
        engine.poll(PollKind::Full, t0 + secs(2)).await;
        assert_eq!(engine.with_surface(|s| s.style_writes()), writes);
    }

    #[tokio::test]
    async fn full_snapshot_prunes_entity_and_marker() {
        let backend = FakeBackend::default();
        backend.set_links(vec![link_json("L1", 0.2, true), link_json("L2", 0.2, true)]);
        let engine = engine(&backend);
        let t0 = Instant::now();

        engine.poll(PollKind::Full, t0).await;
        assert!(engine.has_marker("L2"));

        backend.set_links(vec![link_json("L1", 0.2, true)]);
        engine.poll(PollKind::Full, t0 + secs(2)).await;
        assert!(engine.overlay_entity("L2").is_none());
        assert!(!engine.has_marker("L2"));
        assert!(engine.with_surface(|s| !s.links.contains_key("L2") && !s.markers.contains_key("L2")));
    }

    #[tokio::test]
    async fn malformed_entries_do_not_abort_the_batch() {
        let backend = FakeBackend::default();
        backend.set_links(vec![
            json!({"name": "no id", "ci": 0.3}),
            json!({"id": 42}),
            link_json("L1", 0.3, true),
        ]);
        let engine = engine(&backend);
        engine.poll(PollKind::Full, Instant::now()).await;
        assert_eq!(engine.overlay_len(), 1);
        assert_eq!(engine.summary().map(|s| s.links), Some(1));
    }

    #[tokio::test]
    async fn overlapping_full_tick_issues_no_request() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let backend = FakeBackend::default();
                backend.set_links(vec![link_json("L1", 0.2, true)]);
                backend.hold(Op::Telemetry);
                let engine = engine(&backend);
                let t0 = Instant::now();

                let fired = engine.tick(t0);
                assert!(fired.contains(&PollKind::Full));
                settle().await;
                assert!(engine.poll_task(PollKind::Full).in_flight);

                assert!(!engine.tick(t0 + secs(10)).contains(&PollKind::Full));
                settle().await;
                assert_eq!(backend.calls(Op::Telemetry), 1);

                backend.release(Op::Telemetry);
                settle().await;
                assert!(!engine.poll_task(PollKind::Full).in_flight);
                assert_eq!(engine.overlay_len(), 1);

                assert!(engine.tick(t0 + secs(20)).contains(&PollKind::Full));
                settle().await;
                assert_eq!(backend.calls(Op::Telemetry), 2);
            })
            .await;
    }

    #[tokio::test]
    async fn hidden_page_suspends_polling() {
        let backend = FakeBackend::default();
        let engine = engine(&backend);
        engine.set_visible(false);
        assert_eq!(
            engine.poll(PollKind::Full, Instant::now()).await,
            TickOutcome::Hidden
        );
        assert_eq!(backend.calls(Op::Telemetry), 0);
    }

    #[tokio::test]
    async fn failed_poll_keeps_rendered_state() {
        let backend = FakeBackend::default();
        backend.set_links(vec![link_json("L1", 0.2, true)]);
        let engine = engine(&backend);
        let t0 = Instant::now();
        engine.poll(PollKind::Full, t0).await;
        let summary = engine.summary();

        backend.set_frame(Err("upstream down".into()));
        engine.poll(PollKind::Full, t0 + secs(5)).await;
        assert_eq!(engine.overlay_len(), 1);
        assert!(engine.has_marker("L1"));
        assert_eq!(engine.summary(), summary);
        assert!(!engine.poll_task(PollKind::Full).in_flight);
    }

    #[tokio::test]
    async fn activation_enters_active_focus_and_route_polling() {
        let backend = FakeBackend::default();
        let engine = activated(&backend, Instant::now()).await;

        let route = engine.route();
        assert!(route.is_focused());
        assert_eq!(route.active_length_m(), Some(1200.0));
        assert!(engine.poll_task(PollKind::Route).enabled);
        assert_eq!(
            engine.poll_task(PollKind::Full).interval,
            ClientConfig::default().intervals.full_while_routed
        );

        // Focus hides links off the route and every marker.
        assert_eq!(engine.with_surface(|s| s.is_link_visible("L4")), Some(false));
        assert_eq!(engine.with_surface(|s| s.is_link_visible("L2")), Some(true));
        assert_eq!(engine.marker_len(), 0);
        assert_eq!(engine.overlay_len(), 4);

        let mid = engine.overlay_entity("L2").expect("entity").style;
        assert_eq!(mid.glow_color, palette::ACTIVE_GLOW);
        assert!(mid.glow_opacity >= ACTIVE_GLOW_OPACITY);
    }

    #[tokio::test]
    async fn toggling_focus_off_shows_links_and_rebuilds_markers() {
        let backend = FakeBackend::default();
        let engine = activated(&backend, Instant::now()).await;
        assert_eq!(engine.marker_len(), 0);

        engine.toggle_focus();
        assert!(!engine.route().is_focused());
        assert_eq!(engine.phase(), RoutePhase::Active);
        assert_eq!(engine.with_surface(|s| s.is_link_visible("L4")), Some(true));
        assert_eq!(engine.marker_len(), 4);
        assert!(engine.with_surface(|s| s.markers.contains_key("L4")));

        engine.toggle_focus();
        assert_eq!(engine.with_surface(|s| s.is_link_visible("L4")), Some(false));
        assert_eq!(engine.marker_len(), 0);
        assert_eq!(engine.overlay_len(), 4);
    }

    #[tokio::test]
    async fn changed_server_route_refocuses_view() {
        let backend = FakeBackend::default();
        let t0 = Instant::now();
        let engine = activated(&backend, t0).await;
        engine.toggle_focus();
        assert!(!engine.route().is_focused());

        backend.set_route_live(Ok(RouteLive {
            active: true,
            route: Some(ActiveRoute {
                link_ids: vec!["L1".into(), "L4".into()],
                total_length_m: Some(700.0),
                ..ActiveRoute::default()
            }),
            links: None,
        }));
        engine.poll(PollKind::Route, t0 + secs(3)).await;

        assert!(engine.route().is_focused());
        assert_eq!(engine.with_surface(|s| s.is_link_visible("L2")), Some(false));
        assert_eq!(engine.with_surface(|s| s.is_link_visible("L4")), Some(true));
        assert_eq!(engine.marker_len(), 0);
    }

    #[tokio::test]
    async fn server_clearing_route_returns_to_idle() {
        let backend = FakeBackend::default();
        let t0 = Instant::now();
        let engine = activated(&backend, t0).await;

        backend.set_route_live(Ok(RouteLive {
            active: false,
            ..RouteLive::default()
        }));
        engine.poll(PollKind::Route, t0 + secs(3)).await;

        assert_eq!(engine.phase(), RoutePhase::Idle);
        assert!(!engine.route().is_focused());
        assert!(!engine.poll_task(PollKind::Route).enabled);
        assert_eq!(
            engine.poll_task(PollKind::Full).interval,
            ClientConfig::default().intervals.full
        );
        assert_eq!(engine.with_surface(|s| s.is_link_visible("L4")), Some(true));
        assert_eq!(engine.marker_len(), 4);
    }

    #[tokio::test]
    async fn route_poll_restyles_without_pruning() {
        let backend = FakeBackend::default();
        let t0 = Instant::now();
        let engine = activated(&backend, t0).await;

        backend.set_route_live(Ok(RouteLive {
            active: true,
            route: Some(ActiveRoute {
                link_ids: vec!["L1".into(), "L2".into(), "L3".into()],
                total_length_m: Some(1250.0),
                ..ActiveRoute::default()
            }),
            links: Some(vec![json!({"id": "L2", "ci": 0.95, "is_live": true})]),
        }));
        engine.poll(PollKind::Route, t0 + secs(3)).await;

        assert_eq!(engine.overlay_len(), 4);
        assert_eq!(engine.route().active_length_m(), Some(1250.0));
        assert!(engine.route().is_focused());
        let mid = engine.overlay_entity("L2").expect("entity").style;
        assert_eq!(mid.color, palette::DANGER);
        assert_eq!(mid.glow_color, palette::ACTIVE_GLOW);
    }

    #[tokio::test]
    async fn route_live_result_after_clear_is_discarded() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let backend = FakeBackend::default();
                let t0 = Instant::now();
                let engine = activated(&backend, t0).await;

                backend.set_route_live(Ok(RouteLive {
                    active: true,
                    route: Some(ActiveRoute {
                        link_ids: vec!["L4".into()],
                        ..ActiveRoute::default()
                    }),
                    links: None,
                }));
                backend.hold(Op::RouteLive);
                assert!(engine.tick(t0 + secs(3)).contains(&PollKind::Route));
                settle().await;

                engine.clear_route();
                backend.release(Op::RouteLive);
                settle().await;

                assert_eq!(engine.phase(), RoutePhase::Idle);
                assert!(engine.route().active_link_ids().is_empty());
                assert!(!engine.poll_task(PollKind::Route).in_flight);
            })
            .await;
    }

    #[tokio::test]
    async fn plan_failure_keeps_selection_and_sets_message() {
        let backend = FakeBackend::default();
        backend.set_links(vec![link_json("L1", 0.2, true), link_json("L2", 0.2, true)]);
        let engine = engine(&backend);
        engine.poll(PollKind::Full, Instant::now()).await;
        engine.select_link("L1");
        engine.select_link("L2");

        backend.set_plan(Err("No path between links".into()));
        assert_eq!(engine.plan_route().await, RoutePhase::BothSelected);
        let route = engine.route();
        assert_eq!(route.start(), Some("L1"));
        assert_eq!(route.end(), Some("L2"));
        assert_eq!(engine.plan_message().as_deref(), Some("No path between links"));
        assert!(route.planned_link_ids().is_empty());
    }

    #[tokio::test]
    async fn activation_failure_stays_planned() {
        let backend = FakeBackend::default();
        backend.set_links(vec![link_json("L1", 0.2, true), link_json("L2", 0.2, true)]);
        let engine = engine(&backend);
        engine.poll(PollKind::Full, Instant::now()).await;
        engine.select_link("L1");
        engine.select_link("L2");
        backend.set_plan(Ok(RoutePlan {
            link_ids: vec!["L1".into(), "L2".into()],
            total_length_m: 400.0,
        }));
        engine.plan_route().await;

        backend.set_activation(Some(Err("Route links changed".into())));
        assert_eq!(engine.activate_route().await, RoutePhase::Planned);
        assert_eq!(engine.plan_message().as_deref(), Some("Route links changed"));
        assert!(!engine.poll_task(PollKind::Route).enabled);
    }

    #[tokio::test]
    async fn plan_result_for_old_selection_is_discarded() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let backend = FakeBackend::default();
                backend.set_links(vec![
                    link_json("L1", 0.2, true),
                    link_json("L2", 0.2, true),
                    link_json("L3", 0.2, true),
                ]);
                let engine = engine(&backend);
                engine.poll(PollKind::Full, Instant::now()).await;
                engine.select_link("L1");
                engine.select_link("L2");
                backend.set_plan(Ok(RoutePlan {
                    link_ids: vec!["L1".into(), "L2".into()],
                    total_length_m: 400.0,
                }));
                backend.hold(Op::Plan);

                let planner = engine.clone();
                let handle = tokio::task::spawn_local(async move { planner.plan_route().await });
                settle().await;
                engine.select_link("L3");
                backend.release(Op::Plan);
                let phase = handle.await.expect("plan task");

                assert_eq!(phase, RoutePhase::StartSelected);
                assert_eq!(engine.route().start(), Some("L3"));
                assert!(engine.route().planned_link_ids().is_empty());
            })
            .await;
    }

    #[tokio::test]
    async fn view_mode_switch_restyles_from_last_snapshot() {
        let backend = FakeBackend::default();
        backend.set_links(vec![link_json("L1", 0.9, true), link_json("L2", 0.9, false)]);
        let engine = engine(&backend);
        engine.poll(PollKind::Full, Instant::now()).await;
        assert_eq!(
            engine.overlay_entity("L2").map(|e| e.style.color),
            Some(palette::DIM_ROAD)
        );

        engine.set_view_mode(ViewMode::Simulation);
        assert_eq!(
            engine.overlay_entity("L1").map(|e| e.style.color),
            Some(palette::DIM_ROAD)
        );
        assert_eq!(
            engine.overlay_entity("L2").map(|e| e.style.color),
            Some(palette::DANGER)
        );

        let writes = engine.with_surface(|s| s.style_writes());
        engine.set_view_mode(ViewMode::Simulation);
        assert_eq!(engine.with_surface(|s| s.style_writes()), writes);
    }

    #[tokio::test]
    async fn marker_toggle_clears_and_restores() {
        let backend = FakeBackend::default();
        backend.set_links(vec![link_json("L1", 0.2, true), link_json("L2", 0.2, false)]);
        let engine = engine(&backend);
        let t0 = Instant::now();
        engine.poll(PollKind::Full, t0).await;
        assert_eq!(engine.marker_len(), 1);

        engine.set_markers_enabled(false);
        assert_eq!(engine.marker_len(), 0);
        engine.poll(PollKind::Full, t0 + secs(2)).await;
        assert_eq!(engine.marker_len(), 0);

        engine.set_markers_enabled(true);
        assert!(engine.has_marker("L1"));
        assert!(!engine.has_marker("L2"));
    }

    #[tokio::test]
    async fn frame_threshold_drives_marker_staleness() {
        let backend = FakeBackend::default();
        let mut stale = link_json("L1", 0.2, true);
        stale["age_sec"] = json!(8.0);
        let mut telemetry = frame(vec![stale]);
        telemetry.policy.live_stale_threshold_sec = 5.0;
        backend.set_frame(Ok(telemetry));

        let engine = engine(&backend);
        engine.poll(PollKind::Full, Instant::now()).await;
        assert_eq!(
            engine.with_surface(|s| s.markers.get("L1").map(|(_, stale)| *stale)),
            Some(true)
        );
        assert_eq!(engine.summary().map(|s| s.stale_live), Some(1));
    }

    #[tokio::test]
    async fn unusable_threshold_is_shared_by_markers_and_summary() {
        let backend = FakeBackend::default();
        let mut fresh = link_json("L1", 0.2, true);
        fresh["age_sec"] = json!(3.0);
        let mut telemetry = frame(vec![fresh]);
        telemetry.policy.live_stale_threshold_sec = 0.0;
        backend.set_frame(Ok(telemetry));

        let engine = engine(&backend);
        engine.poll(PollKind::Full, Instant::now()).await;
        assert_eq!(
            engine.with_surface(|s| s.markers.get("L1").map(|(_, stale)| *stale)),
            Some(false)
        );
        assert_eq!(engine.summary().map(|s| s.stale_live), Some(0));
    }

    #[tokio::test]
    async fn summary_refresh_is_throttled() {
        let backend = FakeBackend::default();
        backend.set_links(vec![link_json("L1", 0.2, true)]);
        let engine = engine(&backend);
        let t0 = Instant::now();
        engine.poll(PollKind::Full, t0).await;
        assert_eq!(engine.summary().map(|s| s.links), Some(1));

        backend.set_links(vec![link_json("L1", 0.2, true), link_json("L2", 0.9, true)]);
        engine.poll(PollKind::Full, t0 + Duration::from_millis(1500)).await;
        assert_eq!(engine.overlay_len(), 2);
        assert_eq!(engine.summary().map(|s| s.links), Some(1));

        engine.poll(PollKind::Full, t0 + Duration::from_millis(3000)).await;
        assert_eq!(engine.summary().map(|s| s.links), Some(2));
        assert_eq!(engine.summary().map(|s| s.congested), Some(1));
    }

    #[tokio::test]
    async fn chart_poll_replaces_series_and_survives_failure() {
        let backend = FakeBackend::default();
        let points: Vec<HistoryPoint> = (0..3)
            .map(|i| HistoryPoint {
                timestamp: 1_700_000_000.0 + f64::from(i),
                avg_ci: 0.4,
                total_flow: 900.0,
                sensitivity: 1.0,
            })
            .collect();
        backend.set_history(Ok(points));
        let engine = engine(&backend);
        let t0 = Instant::now();
        engine.poll(PollKind::Chart, t0).await;
        assert_eq!(engine.chart_points().len(), 3);

        backend.set_history(Err("boom".into()));
        engine.poll(PollKind::Chart, t0 + secs(10)).await;
        assert_eq!(engine.chart_points().len(), 3);
    }

    #[tokio::test]
    async fn registry_geometry_renders_links_polled_without_coordinates() {
        let backend = FakeBackend::default();
        backend.set_registry(Ok(LinkRegistry {
            links: vec![LinkRecord {
                id: "L9".into(),
                name: "Ring road".into(),
                link_type: photon_shared::LinkType::Transit,
                coordinates: vec![[47.1, 19.1], [47.2, 19.2]],
            }],
        }));
        backend.set_links(vec![json!({"id": "L9", "ci": 0.5, "is_live": true})]);
        let engine = engine(&backend);

        assert_eq!(engine.refresh_registry().await.expect("registry"), 1);
        assert_eq!(engine.cached_links(), 1);
        engine.poll(PollKind::Full, Instant::now()).await;

        let style = engine.overlay_entity("L9").expect("entity").style;
        assert_eq!(style.color, palette::TRANSIT);
        assert_eq!(engine.registry().len(), 1);
    }

    #[tokio::test]
    async fn live_set_administration_passes_through() {
        let backend = FakeBackend::default();
        backend.set_live_links(Ok(LiveLinks {
            live_mode_links: vec!["L1".into()],
            unknown_links: vec!["nope".into()],
        }));
        let engine = engine(&backend);

        let live = engine
            .set_live_links(vec!["L1".into(), "nope".into()])
            .await
            .expect("live links");
        assert_eq!(live.unknown_links, vec!["nope"]);
        engine.set_all_live().await.expect("all live");
        assert_eq!(
            engine.live_links().await.expect("read").live_mode_links,
            vec!["L1"]
        );

        let updates = backend.live_updates();
        assert_eq!(updates[0], LiveLinksUpdate::only(vec!["L1".into(), "nope".into()]));
        assert_eq!(updates[1], LiveLinksUpdate::all());
    }
}
