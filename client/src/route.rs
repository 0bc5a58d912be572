use std::collections::HashSet;

use photon_shared::{ActiveRoute, RouteActivation, RoutePlan};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePhase {
    Idle,
    StartSelected,
    BothSelected,
    Planned,
    Active,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteEvent {
    SelectLink(String),
    PlanRequested,
    PlanResolved {
        start: String,
        end: String,
        outcome: Result<RoutePlan, String>,
    },
    ActivateRequested,
    ActivateResolved {
        request: RouteActivation,
        outcome: Result<ActiveRoute, String>,
    },
    /// Result of a route-scoped poll; `None` means no active route remains.
    ServerRoute(Option<ActiveRoute>),
    Clear,
    ToggleFocus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteEffect {
    RequestPlan { start: String, end: String },
    RequestActivation(RouteActivation),
    StartRoutePolling,
    StopRoutePolling,
    /// Focus flag or active set changed; recompute visibility.
    ApplyFocus,
    /// Selection, plan or active set changed; recompute link styles.
    Restyle,
}

const NO_ROUTE_FOUND: &str = "No route found between the selected links";
const EMPTY_ACTIVATION: &str = "Activation returned an empty route";

/// Endpoint selection, planned and active route, and the focus bit.
///
/// Driven by [`RouteEvent`]s; every transition returns the effects the
/// caller must perform and never does I/O itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteSelection {
    start: Option<String>,
    end: Option<String>,
    planned: Vec<String>,
    planned_set: HashSet<String>,
    planned_length_m: Option<f64>,
    active: Vec<String>,
    active_set: HashSet<String>,
    active_length_m: Option<f64>,
    plan_message: Option<String>,
    focused: bool,
    pending_plan: Option<(String, String)>,
    pending_activation: Option<RouteActivation>,
}

impl RouteSelection {
    pub fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn end(&self) -> Option<&str> {
        self.end.as_deref()
    }

    pub fn planned_link_ids(&self) -> &[String] {
        &self.planned
    }

    pub fn planned_length_m(&self) -> Option<f64> {
        self.planned_length_m
    }

    pub fn active_link_ids(&self) -> &[String] {
        &self.active
    }

    pub fn active_length_m(&self) -> Option<f64> {
        self.active_length_m
    }

    pub fn plan_message(&self) -> Option<&str> {
        self.plan_message.as_deref()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_planned(&self, id: &str) -> bool {
        self.planned_set.contains(id)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active_set.contains(id)
    }

    pub fn has_active_route(&self) -> bool {
        !self.active.is_empty()
    }

    /// Phase of the selection/plan part, ignoring any active route.
    pub fn selection_phase(&self) -> RoutePhase {
        match (&self.start, &self.end) {
            (Some(_), Some(_)) if !self.planned.is_empty() => RoutePhase::Planned,
            (Some(_), Some(_)) => RoutePhase::BothSelected,
            (Some(_), None) => RoutePhase::StartSelected,
            _ => RoutePhase::Idle,
        }
    }

    pub fn phase(&self) -> RoutePhase {
        if self.has_active_route() {
            RoutePhase::Active
        } else {
            self.selection_phase()
        }
    }

    pub fn apply(&mut self, event: RouteEvent) -> Vec<RouteEffect> {
        let effects = match event {
            RouteEvent::SelectLink(id) => self.select_link(id),
            RouteEvent::PlanRequested => self.request_plan(),
            RouteEvent::PlanResolved {
                start,
                end,
                outcome,
            } => self.resolve_plan(start, end, outcome),
            RouteEvent::ActivateRequested => self.request_activation(),
            RouteEvent::ActivateResolved { request, outcome } => {
                self.resolve_activation(request, outcome)
            }
            RouteEvent::ServerRoute(route) => self.apply_server_route(route),
            RouteEvent::Clear => self.clear(),
            RouteEvent::ToggleFocus => self.toggle_focus(),
        };
        self.debug_check_invariants();
        effects
    }

    fn select_link(&mut self, id: String) -> Vec<RouteEffect> {
        if self.start.as_deref() == Some(id.as_str()) {
            // Deselecting the start promotes a selected end.
            self.start = self.end.take();
        } else if self.end.as_deref() == Some(id.as_str()) {
            self.end = None;
        } else if self.start.is_none() || self.end.is_some() {
            self.start = Some(id);
            self.end = None;
        } else {
            self.end = Some(id);
        }
        self.clear_plan();
        self.plan_message = None;
        vec![RouteEffect::Restyle]
    }

    fn request_plan(&mut self) -> Vec<RouteEffect> {
        if self.selection_phase() != RoutePhase::BothSelected {
            debug!(phase = ?self.selection_phase(), "plan request ignored outside BothSelected");
            return Vec::new();
        }
        let (Some(start), Some(end)) = (self.start.clone(), self.end.clone()) else {
            return Vec::new();
        };
        if self.pending_plan.as_ref() == Some(&(start.clone(), end.clone())) {
            return Vec::new();
        }
        self.pending_plan = Some((start.clone(), end.clone()));
        vec![RouteEffect::RequestPlan { start, end }]
    }

    fn resolve_plan(
        &mut self,
        start: String,
        end: String,
        outcome: Result<RoutePlan, String>,
    ) -> Vec<RouteEffect> {
        let current = (start, end);
        if self.pending_plan.as_ref() != Some(&current) {
            debug!(start = %current.0, end = %current.1, "discarding stale plan response");
            return Vec::new();
        }
        self.pending_plan = None;

        match outcome {
            Ok(plan) if !plan.link_ids.is_empty() => {
                info!(
                    links = plan.link_ids.len(),
                    length_m = plan.total_length_m,
                    "route planned"
                );
                self.planned_set = plan.link_ids.iter().cloned().collect();
                self.planned = plan.link_ids;
                self.planned_length_m = Some(plan.total_length_m);
                self.plan_message = None;
            }
            Ok(_) => self.fail_plan(NO_ROUTE_FOUND.to_string()),
            Err(reason) => self.fail_plan(reason),
        }
        vec![RouteEffect::Restyle]
    }

    fn fail_plan(&mut self, reason: String) {
        info!(%reason, "route planning failed");
        self.clear_plan();
        self.plan_message = Some(reason);
    }

    fn request_activation(&mut self) -> Vec<RouteEffect> {
        if self.selection_phase() != RoutePhase::Planned || self.pending_activation.is_some() {
            debug!(phase = ?self.selection_phase(), "activation request ignored");
            return Vec::new();
        }
        let (Some(start), Some(end)) = (self.start.clone(), self.end.clone()) else {
            return Vec::new();
        };
        let request = RouteActivation {
            link_ids: self.planned.clone(),
            start_link_id: start,
            end_link_id: end,
            total_length_m: self.planned_length_m.unwrap_or_default(),
        };
        self.pending_activation = Some(request.clone());
        vec![RouteEffect::RequestActivation(request)]
    }

    fn resolve_activation(
        &mut self,
        request: RouteActivation,
        outcome: Result<ActiveRoute, String>,
    ) -> Vec<RouteEffect> {
        if self.pending_activation.as_ref() != Some(&request) {
            debug!("discarding stale activation response");
            return Vec::new();
        }
        self.pending_activation = None;

        match outcome {
            Ok(route) if !route.link_ids.is_empty() => {
                let length = route.total_length_m.or(Some(request.total_length_m));
                self.set_active(route.link_ids, length);
                self.focused = true;
                self.plan_message = None;
                info!(
                    links = self.active.len(),
                    length_m = ?self.active_length_m,
                    "route activated"
                );
                vec![
                    RouteEffect::StartRoutePolling,
                    RouteEffect::ApplyFocus,
                    RouteEffect::Restyle,
                ]
            }
            Ok(_) => {
                self.plan_message = Some(EMPTY_ACTIVATION.to_string());
                Vec::new()
            }
            Err(reason) => {
                info!(%reason, "route activation failed");
                self.plan_message = Some(reason);
                Vec::new()
            }
        }
    }

    fn apply_server_route(&mut self, route: Option<ActiveRoute>) -> Vec<RouteEffect> {
        let route = route.filter(|route| !route.link_ids.is_empty());
        let Some(route) = route else {
            if !self.has_active_route() {
                return vec![RouteEffect::StopRoutePolling];
            }
            info!("active route cleared by server");
            return self.clear();
        };

        let incoming: HashSet<String> = route.link_ids.iter().cloned().collect();
        if incoming != self.active_set {
            let length = route.total_length_m.or(self.active_length_m);
            self.set_active(route.link_ids, length);
            self.focused = true;
            info!(links = self.active.len(), "active route replaced by server");
            return vec![RouteEffect::ApplyFocus, RouteEffect::Restyle];
        }

        if let Some(length) = route.total_length_m
            && self.active_length_m != Some(length)
        {
            self.active_length_m = Some(length);
        }
        Vec::new()
    }

    fn clear(&mut self) -> Vec<RouteEffect> {
        *self = Self::default();
        vec![
            RouteEffect::StopRoutePolling,
            RouteEffect::ApplyFocus,
            RouteEffect::Restyle,
        ]
    }

    fn toggle_focus(&mut self) -> Vec<RouteEffect> {
        if !self.has_active_route() {
            return Vec::new();
        }
        self.focused = !self.focused;
        vec![RouteEffect::ApplyFocus]
    }

    fn set_active(&mut self, link_ids: Vec<String>, length_m: Option<f64>) {
        self.active_set = link_ids.iter().cloned().collect();
        self.active = link_ids;
        self.active_length_m = length_m;
        if self.active.is_empty() {
            self.focused = false;
        }
    }

    fn clear_plan(&mut self) {
        self.planned.clear();
        self.planned_set.clear();
        self.planned_length_m = None;
        self.pending_plan = None;
        self.pending_activation = None;
    }

    fn debug_check_invariants(&self) {
        debug_assert!(
            self.start.is_none() || self.start != self.end,
            "a link cannot be both route start and end"
        );
        debug_assert!(
            !self.focused || self.has_active_route(),
            "focus requires an active route"
        );
        debug_assert!(
            self.planned.is_empty() || (self.start.is_some() && self.end.is_some()),
            "a plan requires both endpoints"
        );
    }
}
