use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use photon_shared::{
    ActiveRoute, Coordinate, HistoryPoint, LinkRegistry, LiveLinks, LiveLinksUpdate,
    RouteActivation, RouteLive, RoutePlan, RoutePlanRequest, TelemetryFrame,
};
use serde_json::{Value, json};
use tokio::sync::Notify;

use crate::api::Backend;
use crate::error::ClientError;
use crate::style::LinkStyle;
use crate::surface::RenderSurface;

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    CreateLink(String),
    RestyleLink(String),
    RemoveLink(String),
    SetLinkVisible(String, bool),
    PlaceMarker(String),
    UpdateMarker(String),
    RemoveMarker(String),
}

/// Surface that records every call and mirrors the drawn state.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub calls: Vec<SurfaceCall>,
    pub links: HashMap<String, (LinkStyle, bool)>,
    pub markers: HashMap<String, (Coordinate, bool)>,
}

impl RecordingSurface {
    fn count(&self, wanted: impl Fn(&SurfaceCall) -> bool) -> usize {
        self.calls.iter().filter(|call| wanted(call)).count()
    }

    pub fn creates(&self, id: &str) -> usize {
        self.count(|call| matches!(call, SurfaceCall::CreateLink(c) if c == id))
    }

    pub fn restyles(&self, id: &str) -> usize {
        self.count(|call| matches!(call, SurfaceCall::RestyleLink(c) if c == id))
    }

    pub fn style_writes(&self) -> usize {
        self.count(|call| {
            matches!(
                call,
                SurfaceCall::CreateLink(_) | SurfaceCall::RestyleLink(_)
            )
        })
    }

    pub fn is_link_visible(&self, id: &str) -> Option<bool> {
        self.links.get(id).map(|(_, visible)| *visible)
    }
}

impl RenderSurface for RecordingSurface {
    fn create_link(&mut self, id: &str, _coordinates: &[Coordinate], style: &LinkStyle) {
        self.calls.push(SurfaceCall::CreateLink(id.to_string()));
        self.links.insert(id.to_string(), (*style, true));
    }

    fn restyle_link(&mut self, id: &str, style: &LinkStyle) {
        self.calls.push(SurfaceCall::RestyleLink(id.to_string()));
        if let Some(entry) = self.links.get_mut(id) {
            entry.0 = *style;
        }
    }

    fn remove_link(&mut self, id: &str) {
        self.calls.push(SurfaceCall::RemoveLink(id.to_string()));
        self.links.remove(id);
    }

    fn set_link_visible(&mut self, id: &str, visible: bool) {
        self.calls
            .push(SurfaceCall::SetLinkVisible(id.to_string(), visible));
        if let Some(entry) = self.links.get_mut(id) {
            entry.1 = visible;
        }
    }

    fn place_marker(&mut self, id: &str, position: Coordinate, stale: bool) {
        self.calls.push(SurfaceCall::PlaceMarker(id.to_string()));
        self.markers.insert(id.to_string(), (position, stale));
    }

    fn update_marker(&mut self, id: &str, position: Coordinate, stale: bool) {
        self.calls.push(SurfaceCall::UpdateMarker(id.to_string()));
        self.markers.insert(id.to_string(), (position, stale));
    }

    fn remove_marker(&mut self, id: &str) {
        self.calls.push(SurfaceCall::RemoveMarker(id.to_string()));
        self.markers.remove(id);
    }
}

/// Canned reply; `Err` carries the `detail` of a 4xx/5xx response.
pub type Reply<T> = Result<T, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Telemetry,
    Registry,
    LiveLinks,
    UpdateLiveLinks,
    Plan,
    Activate,
    RouteLive,
    History,
}

struct FakeState {
    frame: Reply<TelemetryFrame>,
    registry: Reply<LinkRegistry>,
    live_links: Reply<LiveLinks>,
    plan: Reply<RoutePlan>,
    activation: Option<Reply<ActiveRoute>>,
    route_live: Reply<RouteLive>,
    history: Reply<Vec<HistoryPoint>>,
    calls: HashMap<Op, usize>,
    coordinate_requests: Vec<bool>,
    live_updates: Vec<LiveLinksUpdate>,
    gates: HashMap<Op, Rc<Notify>>,
}

/// In-memory backend with call counters and per-operation gates.
///
/// A held operation blocks until [`FakeBackend::release`] is called, which
/// lets tests observe the engine while a request is in flight.
#[derive(Clone)]
pub struct FakeBackend {
    state: Rc<RefCell<FakeState>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            state: Rc::new(RefCell::new(FakeState {
                frame: Ok(TelemetryFrame::default()),
                registry: Ok(LinkRegistry::default()),
                live_links: Ok(LiveLinks::default()),
                plan: Err("no plan configured".to_string()),
                activation: None,
                route_live: Ok(RouteLive::default()),
                history: Ok(Vec::new()),
                calls: HashMap::new(),
                coordinate_requests: Vec::new(),
                live_updates: Vec::new(),
                gates: HashMap::new(),
            })),
        }
    }
}

fn to_error(detail: String) -> ClientError {
    ClientError::Status {
        status: 400,
        detail,
    }
}

impl FakeBackend {
    pub fn set_frame(&self, frame: Reply<TelemetryFrame>) {
        self.state.borrow_mut().frame = frame;
    }

    pub fn set_links(&self, links: Vec<Value>) {
        self.set_frame(Ok(frame(links)));
    }

    pub fn set_registry(&self, registry: Reply<LinkRegistry>) {
        self.state.borrow_mut().registry = registry;
    }

    pub fn set_live_links(&self, live: Reply<LiveLinks>) {
        self.state.borrow_mut().live_links = live;
    }

    pub fn set_plan(&self, plan: Reply<RoutePlan>) {
        self.state.borrow_mut().plan = plan;
    }

    /// `None` echoes the activation request back as the canonical route.
    pub fn set_activation(&self, activation: Option<Reply<ActiveRoute>>) {
        self.state.borrow_mut().activation = activation;
    }

    pub fn set_route_live(&self, live: Reply<RouteLive>) {
        self.state.borrow_mut().route_live = live;
    }

    pub fn set_history(&self, history: Reply<Vec<HistoryPoint>>) {
        self.state.borrow_mut().history = history;
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state.borrow().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn coordinate_requests(&self) -> Vec<bool> {
        self.state.borrow().coordinate_requests.clone()
    }

    pub fn live_updates(&self) -> Vec<LiveLinksUpdate> {
        self.state.borrow().live_updates.clone()
    }

    pub fn hold(&self, op: Op) {
        self.state
            .borrow_mut()
            .gates
            .insert(op, Rc::new(Notify::new()));
    }

    pub fn release(&self, op: Op) {
        if let Some(gate) = self.state.borrow_mut().gates.remove(&op) {
            gate.notify_one();
        }
    }

    async fn enter(&self, op: Op) {
        let gate = {
            let mut state = self.state.borrow_mut();
            *state.calls.entry(op).or_default() += 1;
            state.gates.get(&op).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

impl Backend for FakeBackend {
    async fn fetch_telemetry(
        &self,
        include_coordinates: bool,
    ) -> Result<TelemetryFrame, ClientError> {
        self.state
            .borrow_mut()
            .coordinate_requests
            .push(include_coordinates);
        self.enter(Op::Telemetry).await;
        let mut frame = self.state.borrow().frame.clone().map_err(to_error)?;
        if !include_coordinates {
            for link in &mut frame.links {
                if let Some(object) = link.as_object_mut() {
                    object.remove("coordinates");
                }
            }
        }
        Ok(frame)
    }

    async fn fetch_registry(&self) -> Result<LinkRegistry, ClientError> {
        self.enter(Op::Registry).await;
        self.state.borrow().registry.clone().map_err(to_error)
    }

    async fn fetch_live_links(&self) -> Result<LiveLinks, ClientError> {
        self.enter(Op::LiveLinks).await;
        self.state.borrow().live_links.clone().map_err(to_error)
    }

    async fn update_live_links(&self, update: LiveLinksUpdate) -> Result<LiveLinks, ClientError> {
        self.state.borrow_mut().live_updates.push(update);
        self.enter(Op::UpdateLiveLinks).await;
        self.state.borrow().live_links.clone().map_err(to_error)
    }

    async fn plan_route(&self, _request: RoutePlanRequest) -> Result<RoutePlan, ClientError> {
        self.enter(Op::Plan).await;
        self.state.borrow().plan.clone().map_err(to_error)
    }

    async fn activate_route(&self, request: RouteActivation) -> Result<ActiveRoute, ClientError> {
        self.enter(Op::Activate).await;
        let activation = self.state.borrow().activation.clone();
        match activation {
            Some(reply) => reply.map_err(to_error),
            None => Ok(ActiveRoute {
                link_ids: request.link_ids,
                total_length_m: Some(request.total_length_m),
                start_link_id: Some(request.start_link_id),
                end_link_id: Some(request.end_link_id),
            }),
        }
    }

    async fn fetch_route_live(&self) -> Result<RouteLive, ClientError> {
        self.enter(Op::RouteLive).await;
        self.state.borrow().route_live.clone().map_err(to_error)
    }

    async fn fetch_history(&self) -> Result<Vec<HistoryPoint>, ClientError> {
        self.enter(Op::History).await;
        self.state.borrow().history.clone().map_err(to_error)
    }
}

pub fn frame(links: Vec<Value>) -> TelemetryFrame {
    TelemetryFrame {
        timestamp: 1_700_000_000.0,
        sim_time: Some("08:00".to_string()),
        weather: Some("clear".to_string()),
        links,
        ..TelemetryFrame::default()
    }
}

/// Wire entry with a short two-point geometry derived from `id`.
pub fn link_json(id: &str, ci: f64, is_live: bool) -> Value {
    let offset = id.bytes().map(f64::from).sum::<f64>() / 1000.0;
    json!({
        "id": id,
        "name": format!("Link {id}"),
        "type": "road",
        "ci": ci,
        "flow": 100.0,
        "capacity": 200.0,
        "is_live": is_live,
        "age_sec": 1.0,
        "coordinates": [[47.0 + offset, 19.0], [47.0 + offset, 19.01]]
    })
}
