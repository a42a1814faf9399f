use crate::domain::ledger::SessionLedger;
use crate::domain::models::{
    mode_id_from_name, CalendarEvent, TaskTemplate, WeekMode, DEFAULT_WEEK_MODE_ID,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("{0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("external event {0} is read-only")]
    ReadOnly(String),
    #[error("no week mode change is pending")]
    NoPendingChange,
}

impl PlanError {
    fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSwitchState {
    Idle,
    PendingConfirm(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeChangeRequest {
    Unchanged,
    PendingConfirm(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceOutcome {
    Placed(CalendarEvent),
    QuotaExhausted { template_id: String },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TemplateSummary {
    pub template: TaskTemplate,
    pub used: u32,
    pub remaining: u32,
    pub is_active: bool,
}

/// The single owner of scheduling state: week modes, the active mode,
/// the shown events and the session ledger.
///
/// Every operation that adds or removes a local event updates the ledger in
/// the same call, so `ledger == SessionLedger::from_events(events)` holds
/// after each public method returns.
#[derive(Debug, Clone)]
pub struct Planner {
    modes: Vec<WeekMode>,
    active_mode_id: String,
    switch_state: ModeSwitchState,
    events: Vec<CalendarEvent>,
    ledger: SessionLedger,
    active_template_id: Option<String>,
}

impl Planner {
    pub fn new(modes: Vec<WeekMode>, active_mode_id: &str) -> Result<Self, PlanError> {
        if modes.is_empty() {
            return Err(PlanError::Validation(
                "at least one week mode is required".to_string(),
            ));
        }
        for mode in &modes {
            mode.validate().map_err(PlanError::Validation)?;
        }
        let active_mode_id = modes
            .iter()
            .find(|mode| mode.id == active_mode_id)
            .or_else(|| modes.iter().find(|mode| mode.id == DEFAULT_WEEK_MODE_ID))
            .unwrap_or(&modes[0])
            .id
            .clone();

        Ok(Self {
            modes,
            active_mode_id,
            switch_state: ModeSwitchState::Idle,
            events: Vec::new(),
            ledger: SessionLedger::new(),
            active_template_id: None,
        })
    }

    /// Rebuilds a planner from persisted parts. Returns `true` alongside when
    /// the stored ledger disagreed with the events and was re-derived.
    pub fn restore(
        modes: Vec<WeekMode>,
        active_mode_id: &str,
        events: Vec<CalendarEvent>,
        ledger: SessionLedger,
    ) -> Result<(Self, bool), PlanError> {
        let mut planner = Self::new(modes, active_mode_id)?;
        planner.events = events
            .into_iter()
            .filter(|event| event.validate().is_ok())
            .collect();
        let derived = SessionLedger::from_events(&planner.events);
        let reconciled = derived != ledger;
        planner.ledger = derived;
        Ok((planner, reconciled))
    }

    pub fn modes(&self) -> &[WeekMode] {
        &self.modes
    }

    pub fn active_mode_id(&self) -> &str {
        &self.active_mode_id
    }

    pub fn active_mode(&self) -> &WeekMode {
        self.modes
            .iter()
            .find(|mode| mode.id == self.active_mode_id)
            .unwrap_or(&self.modes[0])
    }

    pub fn switch_state(&self) -> &ModeSwitchState {
        &self.switch_state
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn event(&self, event_id: &str) -> Option<&CalendarEvent> {
        self.events.iter().find(|event| event.id == event_id)
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    pub fn active_template_id(&self) -> Option<&str> {
        self.active_template_id.as_deref()
    }

    pub fn remaining(&self, template_id: &str) -> u32 {
        self.active_mode()
            .template(template_id)
            .map(|template| self.ledger.remaining(template_id, template.session_quota))
            .unwrap_or(0)
    }

    pub fn template_summaries(&self) -> Vec<TemplateSummary> {
        self.active_mode()
            .templates
            .iter()
            .map(|template| TemplateSummary {
                template: template.clone(),
                used: self.ledger.used(&template.id),
                remaining: self.ledger.remaining(&template.id, template.session_quota),
                is_active: self.active_template_id.as_deref() == Some(template.id.as_str()),
            })
            .collect()
    }

    /// Marks a template for click-to-place. Templates with nothing left are not selectable.
    pub fn select_template(&mut self, template_id: &str) -> Result<(), PlanError> {
        if self.active_mode().template(template_id).is_none() {
            return Err(PlanError::not_found("template", template_id));
        }
        if self.remaining(template_id) == 0 {
            return Err(PlanError::Validation(format!(
                "no sessions remaining for template {template_id}"
            )));
        }
        self.active_template_id = Some(template_id.to_string());
        Ok(())
    }

    pub fn place_template(
        &mut self,
        template_id: &str,
        slot_start: DateTime<Utc>,
        event_id: String,
    ) -> Result<PlaceOutcome, PlanError> {
        let template = self
            .active_mode()
            .template(template_id)
            .cloned()
            .ok_or_else(|| PlanError::not_found("template", template_id))?;

        if !self.ledger.record(&template.id, template.session_quota) {
            return Ok(PlaceOutcome::QuotaExhausted {
                template_id: template.id,
            });
        }

        let event = CalendarEvent {
            id: event_id,
            title: template.title.clone(),
            start: slot_start,
            end: slot_start + Duration::minutes(i64::from(template.duration)),
            template_id: Some(template.id.clone()),
            is_external: false,
            remote_id: None,
        };
        self.events.push(event.clone());
        Ok(PlaceOutcome::Placed(event))
    }

    pub fn place_active_template(
        &mut self,
        slot_start: DateTime<Utc>,
        event_id: String,
    ) -> Result<PlaceOutcome, PlanError> {
        let template_id = self.active_template_id.clone().ok_or_else(|| {
            PlanError::Validation("select a template before placing a session".to_string())
        })?;
        self.place_template(&template_id, slot_start, event_id)
    }

    pub fn move_event(
        &mut self,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CalendarEvent, PlanError> {
        if end <= start {
            return Err(PlanError::Validation(
                "event end must be after start".to_string(),
            ));
        }
        let event = self
            .events
            .iter_mut()
            .find(|event| event.id == event_id)
            .ok_or_else(|| PlanError::not_found("event", event_id))?;
        if !event.is_movable() {
            return Err(PlanError::ReadOnly(event_id.to_string()));
        }
        event.start = start;
        event.end = end;
        Ok(event.clone())
    }

    pub fn delete_event(&mut self, event_id: &str) -> Result<CalendarEvent, PlanError> {
        let index = self
            .events
            .iter()
            .position(|event| event.id == event_id)
            .ok_or_else(|| PlanError::not_found("event", event_id))?;
        if !self.events[index].is_movable() {
            return Err(PlanError::ReadOnly(event_id.to_string()));
        }
        let removed = self.events.remove(index);
        if let Some(template_id) = removed.local_template_id() {
            self.ledger.release(template_id);
        }
        Ok(removed)
    }

    /// Removes every local session and zeroes the ledger. External events stay.
    pub fn clear_sessions(&mut self) -> Vec<CalendarEvent> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(CalendarEvent::is_movable);
        self.events = kept;
        self.ledger.reset();
        self.active_template_id = None;
        removed
    }

    pub fn request_mode_change(&mut self, mode_id: &str) -> Result<ModeChangeRequest, PlanError> {
        if !self.modes.iter().any(|mode| mode.id == mode_id) {
            return Err(PlanError::not_found("week mode", mode_id));
        }
        if mode_id == self.active_mode_id {
            self.switch_state = ModeSwitchState::Idle;
            return Ok(ModeChangeRequest::Unchanged);
        }
        self.switch_state = ModeSwitchState::PendingConfirm(mode_id.to_string());
        Ok(ModeChangeRequest::PendingConfirm(mode_id.to_string()))
    }

    pub fn pending_mode(&self) -> Option<&str> {
        match &self.switch_state {
            ModeSwitchState::PendingConfirm(mode_id) => Some(mode_id.as_str()),
            ModeSwitchState::Idle => None,
        }
    }

    /// Applies the pending switch: local sessions are cleared and the ledger reset.
    pub fn confirm_mode_change(&mut self) -> Result<Vec<CalendarEvent>, PlanError> {
        let ModeSwitchState::PendingConfirm(mode_id) =
            std::mem::replace(&mut self.switch_state, ModeSwitchState::Idle)
        else {
            return Err(PlanError::NoPendingChange);
        };
        if !self.modes.iter().any(|mode| mode.id == mode_id) {
            return Err(PlanError::not_found("week mode", &mode_id));
        }
        let removed = self.clear_sessions();
        self.active_mode_id = mode_id;
        Ok(removed)
    }

    pub fn cancel_mode_change(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.switch_state, ModeSwitchState::Idle) {
            ModeSwitchState::PendingConfirm(mode_id) => Some(mode_id),
            ModeSwitchState::Idle => None,
        }
    }

    /// Adds a mode (`editing_id == None`) or renames/rebudgets an existing one.
    pub fn save_mode(
        &mut self,
        editing_id: Option<&str>,
        name: &str,
        total_session_budget: u32,
    ) -> Result<WeekMode, PlanError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PlanError::Validation("Mode name is required".to_string()));
        }
        if total_session_budget == 0 {
            return Err(PlanError::Validation(
                "Total sessions must be greater than 0".to_string(),
            ));
        }

        match editing_id {
            Some(mode_id) => {
                let mode = self
                    .modes
                    .iter_mut()
                    .find(|mode| mode.id == mode_id)
                    .ok_or_else(|| PlanError::not_found("week mode", mode_id))?;
                mode.name = name.to_string();
                mode.total_session_budget = total_session_budget;
                Ok(mode.clone())
            }
            None => {
                let id = mode_id_from_name(name);
                if self.modes.iter().any(|mode| mode.id == id) {
                    return Err(PlanError::Validation(format!(
                        "a week mode with id '{id}' already exists"
                    )));
                }
                let mode = WeekMode {
                    name: name.to_string(),
                    id,
                    total_session_budget,
                    templates: Vec::new(),
                };
                self.modes.push(mode.clone());
                Ok(mode)
            }
        }
    }

    /// Adds or edits a template of the active mode.
    pub fn save_template(
        &mut self,
        editing_id: Option<&str>,
        title: &str,
        session_quota: u32,
        duration: u32,
        new_id: String,
    ) -> Result<TaskTemplate, PlanError> {
        let candidate = TaskTemplate {
            id: editing_id.map(ToOwned::to_owned).unwrap_or(new_id),
            title: title.trim().to_string(),
            duration,
            session_quota,
        };
        candidate.validate().map_err(PlanError::Validation)?;

        let used = self.ledger.used(&candidate.id);
        let active_mode_id = self.active_mode_id.clone();
        let mode = self
            .modes
            .iter_mut()
            .find(|mode| mode.id == active_mode_id)
            .ok_or_else(|| PlanError::not_found("week mode", &active_mode_id))?;

        match editing_id {
            Some(template_id) => {
                let template = mode
                    .templates
                    .iter_mut()
                    .find(|template| template.id == template_id)
                    .ok_or_else(|| PlanError::not_found("template", template_id))?;
                if session_quota < used {
                    return Err(PlanError::Validation(format!(
                        "Number of sessions cannot be lower than the {used} already placed"
                    )));
                }
                *template = candidate.clone();
            }
            None => {
                if mode.template(&candidate.id).is_some() {
                    return Err(PlanError::Validation(format!(
                        "a template with id '{}' already exists",
                        candidate.id
                    )));
                }
                mode.templates.push(candidate.clone());
            }
        }
        Ok(candidate)
    }

    /// Swaps the shown external events for a freshly fetched set. Remote copies
    /// of sessions placed here are skipped; the local event already shows them.
    pub fn replace_external_events(&mut self, external: Vec<CalendarEvent>) {
        self.events.retain(CalendarEvent::is_movable);
        let mirrored: HashSet<String> = self
            .events
            .iter()
            .filter_map(|event| event.remote_id.clone())
            .collect();
        self.events.extend(
            external
                .into_iter()
                .filter(|event| event.is_external)
                .filter(|event| !event.id.trim().is_empty())
                .filter(|event| {
                    event
                        .remote_id
                        .as_deref()
                        .is_none_or(|remote_id| !mirrored.contains(remote_id))
                }),
        );
    }

    pub fn clear_external_events(&mut self) -> usize {
        let before = self.events.len();
        self.events.retain(CalendarEvent::is_movable);
        before - self.events.len()
    }

    pub fn clear_all_events(&mut self) {
        self.events.clear();
        self.ledger.reset();
        self.active_template_id = None;
    }

    pub fn set_remote_id(&mut self, event_id: &str, remote_id: String) -> bool {
        match self.events.iter_mut().find(|event| event.id == event_id) {
            Some(event) => {
                event.remote_id = Some(remote_id);
                true
            }
            None => false,
        }
    }

    pub fn unsynced_local_events(&self) -> Vec<CalendarEvent> {
        self.events
            .iter()
            .filter(|event| event.is_movable() && event.remote_id.is_none())
            .cloned()
            .collect()
    }

    pub fn total_placed(&self) -> u32 {
        self.ledger.total_used()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::default_week_modes;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn planner() -> Planner {
        Planner::new(default_week_modes(), "normal").expect("planner")
    }

    fn external(id: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: "Standup".to_string(),
            start: fixed_time("2026-02-16T10:00:00Z"),
            end: fixed_time("2026-02-16T10:30:00Z"),
            template_id: None,
            is_external: true,
            remote_id: Some(id.to_string()),
        }
    }

    fn place(planner: &mut Planner, template_id: &str, id: &str) -> PlaceOutcome {
        planner
            .place_template(template_id, fixed_time("2026-02-16T09:00:00Z"), id.to_string())
            .expect("place template")
    }

    #[test]
    fn unknown_active_mode_falls_back_to_default() {
        let planner = Planner::new(default_week_modes(), "missing").expect("planner");
        assert_eq!(planner.active_mode_id(), "normal");
    }

    #[test]
    fn place_creates_event_with_template_duration() {
        let mut planner = planner();
        let PlaceOutcome::Placed(event) = place(&mut planner, "exercise", "evt-1") else {
            panic!("expected placement");
        };
        assert_eq!(event.end - event.start, Duration::minutes(45));
        assert_eq!(event.template_id.as_deref(), Some("exercise"));
        assert_eq!(planner.remaining("exercise"), 4);
        assert_eq!(planner.events().len(), 1);
    }

    #[test]
    fn place_with_no_remaining_leaves_state_untouched() {
        let mut planner = planner();
        for index in 0..5 {
            place(&mut planner, "exercise", &format!("evt-{index}"));
        }
        let outcome = place(&mut planner, "exercise", "evt-extra");
        assert_eq!(
            outcome,
            PlaceOutcome::QuotaExhausted {
                template_id: "exercise".to_string()
            }
        );
        assert_eq!(planner.events().len(), 5);
        assert_eq!(planner.ledger().used("exercise"), 5);
    }

    #[test]
    fn place_rejects_template_outside_active_mode() {
        let mut planner = planner();
        let result =
            planner.place_template("writing", fixed_time("2026-02-16T09:00:00Z"), "e".to_string());
        assert!(matches!(result, Err(PlanError::NotFound { .. })));
    }

    #[test]
    fn click_to_place_requires_selected_template() {
        let mut planner = planner();
        let slot = fixed_time("2026-02-16T11:00:00Z");
        assert!(planner.place_active_template(slot, "e-1".to_string()).is_err());
        planner.select_template("reading").expect("select");
        let outcome = planner
            .place_active_template(slot, "e-1".to_string())
            .expect("place active");
        assert!(matches!(outcome, PlaceOutcome::Placed(_)));
    }

    #[test]
    fn exhausted_template_cannot_be_selected() {
        let mut planner = planner();
        planner.save_template(Some("exercise"), "Exercise", 1, 45, String::new())
            .expect("shrink quota");
        place(&mut planner, "exercise", "evt-1");
        assert!(planner.select_template("exercise").is_err());
    }

    #[test]
    fn delete_releases_exactly_one_session() {
        let mut planner = planner();
        place(&mut planner, "reading", "evt-1");
        place(&mut planner, "reading", "evt-2");
        planner.delete_event("evt-1").expect("delete");
        assert_eq!(planner.ledger().used("reading"), 1);
        planner.delete_event("evt-2").expect("delete");
        assert_eq!(planner.ledger().used("reading"), 0);
        assert!(planner.delete_event("evt-2").is_err());
    }

    #[test]
    fn external_events_cannot_be_moved_or_deleted() {
        let mut planner = planner();
        planner.replace_external_events(vec![external("g-1")]);
        let start = fixed_time("2026-02-16T12:00:00Z");
        assert_eq!(
            planner.move_event("g-1", start, start + Duration::minutes(30)),
            Err(PlanError::ReadOnly("g-1".to_string()))
        );
        assert_eq!(
            planner.delete_event("g-1"),
            Err(PlanError::ReadOnly("g-1".to_string()))
        );
    }

    #[test]
    fn move_keeps_ledger_and_rejects_inverted_range() {
        let mut planner = planner();
        place(&mut planner, "reading", "evt-1");
        let start = fixed_time("2026-02-17T13:00:00Z");
        let moved = planner
            .move_event("evt-1", start, start + Duration::minutes(60))
            .expect("move");
        assert_eq!(moved.start, start);
        assert_eq!(planner.ledger().used("reading"), 1);
        assert!(planner.move_event("evt-1", start, start).is_err());
    }

    #[test]
    fn clear_sessions_keeps_external_events() {
        let mut planner = planner();
        planner.replace_external_events(vec![external("g-1")]);
        place(&mut planner, "reading", "evt-1");
        let removed = planner.clear_sessions();
        assert_eq!(removed.len(), 1);
        assert_eq!(planner.events().len(), 1);
        assert_eq!(planner.ledger().total_used(), 0);
    }

    #[test]
    fn mode_switch_requires_confirmation() {
        let mut planner = planner();
        place(&mut planner, "reading", "evt-1");
        planner.replace_external_events(vec![external("g-1")]);

        assert_eq!(
            planner.request_mode_change("normal").expect("same mode"),
            ModeChangeRequest::Unchanged
        );
        assert_eq!(
            planner.request_mode_change("reduced").expect("request"),
            ModeChangeRequest::PendingConfirm("reduced".to_string())
        );
        assert_eq!(planner.cancel_mode_change(), Some("reduced".to_string()));
        assert_eq!(planner.active_mode_id(), "normal");
        assert_eq!(planner.ledger().used("reading"), 1);

        planner.request_mode_change("reduced").expect("request");
        let removed = planner.confirm_mode_change().expect("confirm");
        assert_eq!(removed.len(), 1);
        assert_eq!(planner.active_mode_id(), "reduced");
        assert_eq!(planner.events().len(), 1);
        assert!(planner.events()[0].is_external);
        assert_eq!(planner.ledger().total_used(), 0);
        assert_eq!(planner.remaining("reading"), 4);
        assert_eq!(planner.confirm_mode_change(), Err(PlanError::NoPendingChange));
    }

    #[test]
    fn save_mode_adds_and_edits() {
        let mut planner = planner();
        let created = planner.save_mode(None, " Exam Week ", 12).expect("add");
        assert_eq!(created.id, "exam-week");
        assert!(created.templates.is_empty());
        assert!(planner.save_mode(None, "exam week", 3).is_err());

        let edited = planner
            .save_mode(Some("normal"), "Standard", 25)
            .expect("edit");
        assert_eq!(edited.id, "normal");
        assert_eq!(edited.templates.len(), 2);
        assert!(planner.save_mode(Some("normal"), " ", 25).is_err());
        assert!(planner.save_mode(Some("normal"), "Standard", 0).is_err());
    }

    #[test]
    fn save_template_guards_placed_sessions() {
        let mut planner = planner();
        place(&mut planner, "reading", "evt-1");
        place(&mut planner, "reading", "evt-2");
        assert!(planner
            .save_template(Some("reading"), "Reading", 1, 30, String::new())
            .is_err());
        let edited = planner
            .save_template(Some("reading"), "Reading", 2, 60, String::new())
            .expect("edit");
        assert_eq!(edited.duration, 60);

        let added = planner
            .save_template(None, "Writing", 3, 90, "tpl-1".to_string())
            .expect("add");
        assert_eq!(planner.active_mode().template("tpl-1"), Some(&added));
        assert!(planner
            .save_template(None, "", 3, 90, "tpl-2".to_string())
            .is_err());
    }

    #[test]
    fn restore_rederives_inconsistent_ledger() {
        let mut source = planner();
        place(&mut source, "reading", "evt-1");
        let (restored, reconciled) = Planner::restore(
            default_week_modes(),
            "normal",
            source.events().to_vec(),
            SessionLedger::new(),
        )
        .expect("restore");
        assert!(reconciled);
        assert_eq!(restored.ledger().used("reading"), 1);

        let (_, reconciled) = Planner::restore(
            default_week_modes(),
            "normal",
            source.events().to_vec(),
            source.ledger().clone(),
        )
        .expect("restore");
        assert!(!reconciled);
    }

    #[test]
    fn unsynced_events_are_local_without_remote_id() {
        let mut planner = planner();
        planner.replace_external_events(vec![external("g-1")]);
        place(&mut planner, "reading", "evt-1");
        place(&mut planner, "reading", "evt-2");
        assert!(planner.set_remote_id("evt-1", "remote-1".to_string()));
        let pending = planner.unsynced_local_events();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "evt-2");
    }

    #[test]
    fn refetch_skips_remote_copies_of_local_sessions() {
        let mut planner = planner();
        place(&mut planner, "reading", "evt-1");
        assert!(planner.set_remote_id("evt-1", "remote-1".to_string()));

        planner.replace_external_events(vec![external("remote-1"), external("g-1")]);
        let ids: Vec<&str> = planner.events().iter().map(|event| event.id.as_str()).collect();
        assert_eq!(ids, ["evt-1", "g-1"]);

        planner.delete_event("evt-1").expect("delete");
        assert_eq!(planner.events().len(), 1);
        assert!(planner.events()[0].is_external);
        assert_eq!(planner.events()[0].id, "g-1");
    }

    #[derive(Debug, Clone)]
    enum Action {
        Place(bool),
        DeleteFirst,
        Clear,
        SwitchAndConfirm,
    }

    fn action_strategy() -> impl Strategy<Value = Action> {
        prop_oneof![
            5 => any::<bool>().prop_map(Action::Place),
            3 => Just(Action::DeleteFirst),
            1 => Just(Action::Clear),
            1 => Just(Action::SwitchAndConfirm),
        ]
    }

    proptest! {
        #[test]
        fn ledger_always_matches_local_events(actions in prop::collection::vec(action_strategy(), 0..60)) {
            let mut planner = planner();
            planner.replace_external_events(vec![external("g-1")]);
            for (index, action) in actions.into_iter().enumerate() {
                match action {
                    Action::Place(reading) => {
                        let template_id = if reading { "reading" } else { "exercise" };
                        let _ = planner.place_template(
                            template_id,
                            fixed_time("2026-02-16T09:00:00Z"),
                            format!("evt-{index}"),
                        );
                    }
                    Action::DeleteFirst => {
                        let first = planner
                            .events()
                            .iter()
                            .find(|event| event.is_movable())
                            .map(|event| event.id.clone());
                        if let Some(event_id) = first {
                            planner.delete_event(&event_id).expect("delete local");
                        }
                    }
                    Action::Clear => {
                        planner.clear_sessions();
                    }
                    Action::SwitchAndConfirm => {
                        let target = if planner.active_mode_id() == "normal" { "reduced" } else { "normal" };
                        planner.request_mode_change(target).expect("request");
                        planner.confirm_mode_change().expect("confirm");
                        prop_assert_eq!(planner.ledger().total_used(), 0);
                    }
                }
                prop_assert_eq!(planner.ledger(), &SessionLedger::from_events(planner.events()));
                prop_assert!(planner.ledger().is_within_quotas(planner.active_mode()) || planner.ledger().total_used() == 0);
                prop_assert!(planner.events().iter().any(|event| event.id == "g-1"));
            }
        }
    }
}
