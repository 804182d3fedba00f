//! Pure transition core of a machine.
//!
//! `StateMachine::apply` takes one input (a caller event or a unit
//! settlement), updates state and context, and returns the effects the
//! runtime has to carry out. It never awaits, spawns or sleeps, so every
//! transition can be tested without a runtime.

use std::sync::Arc;

use super::context::{MachineContext, Snapshot};
use super::event::Event;
use super::options::RetryOptions;
use super::outcome::{Settlement, UnitReport};
use super::payload::{Data, Payload};
use super::state::MachineState;
use crate::error::SettleError;

/// What to do with a `Fetch` that arrives while a unit is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InFlight {
    /// Refuse it with `SettleError::Busy`.
    #[default]
    Reject,

    /// Abort the running unit and start over with the new payload.
    Supersede,
}

/// What a failed background refetch does to the previous response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefetchFailure {
    /// Move to Rejected; the previous response is dropped.
    #[default]
    DiscardResponse,

    /// Return to Resolved with the previous response. The failure is still
    /// reported through the error hook.
    KeepResponse,
}

/// Behavior switches for the cases the state topology leaves open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MachinePolicy {
    pub in_flight: InFlight,
    pub refetch_failure: RefetchFailure,
}

/// Inputs consumed by the core.
pub enum Input<D, E, P> {
    Event(Event<D, P>),

    /// An execution unit settled. `generation` identifies which spawn it
    /// belongs to.
    Settled {
        generation: u64,
        report: UnitReport<D, E>,
    },

    /// The unit of `generation` died without settling (it panicked).
    Crashed { generation: u64 },
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect<D, E, P> {
    /// Start a new execution unit. Any unit still running is superseded.
    Spawn { generation: u64, payload: P },

    /// Run the success hook.
    NotifySuccess { data: D, payload: P },

    /// Run the error hook.
    NotifyError { error: E, payload: P },
}

/// The unit currently owned by the machine.
#[derive(Debug, Clone)]
struct Flight<P> {
    generation: u64,
    payload: P,
    /// Settled (or Idle) state to fall back to if the unit crashes.
    resume: MachineState,
}

/// Orchestrator state + context + policy.
#[derive(Debug)]
pub struct StateMachine<D, E, P> {
    state: MachineState,
    context: MachineContext<D, E, P>,
    policy: MachinePolicy,
    generation: u64,
    in_flight: Option<Flight<P>>,
}

impl<D: Data, E: Data, P: Payload> StateMachine<D, E, P> {
    pub fn new(options: Arc<RetryOptions>, policy: MachinePolicy) -> Self {
        Self {
            state: MachineState::Idle,
            context: MachineContext::new(options),
            policy,
            generation: 0,
            in_flight: None,
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn context(&self) -> &MachineContext<D, E, P> {
        &self.context
    }

    pub fn policy(&self) -> MachinePolicy {
        self.policy
    }

    pub fn snapshot(&self) -> Snapshot<D, E, P> {
        Snapshot {
            state: self.state,
            context: self.context.clone(),
        }
    }

    /// Generation of the most recent spawn (0 before the first fetch).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Would a settlement from `generation` be honored?
    pub fn is_current(&self, generation: u64) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|flight| flight.generation == generation)
    }

    pub fn apply(&mut self, input: Input<D, E, P>) -> Result<Vec<Effect<D, E, P>>, SettleError> {
        match input {
            Input::Event(event) => self.on_event(event),
            Input::Settled { generation, report } => Ok(self.on_settled(generation, report)),
            Input::Crashed { generation } => {
                self.on_crashed(generation);
                Ok(Vec::new())
            }
        }
    }

    fn on_event(&mut self, event: Event<D, P>) -> Result<Vec<Effect<D, E, P>>, SettleError> {
        let kind = event.kind();
        match (self.state, event) {
            (state, Event::Fetch { payload }) => {
                if state.is_in_flight() && self.policy.in_flight == InFlight::Reject {
                    return Err(SettleError::Busy { state });
                }
                Ok(vec![self.start(MachineState::Pending, payload)])
            }
            (MachineState::Resolved, Event::FetchBackground { payload }) => {
                let current = self.context.payload().ok_or(SettleError::MissingPayload)?;
                let next = payload.resolve(current)?;
                Ok(vec![self.start(MachineState::Refetching, next)])
            }
            (MachineState::Resolved, Event::Update { transform }) => {
                self.context.project(transform);
                Ok(Vec::new())
            }
            (state, _) => Err(SettleError::NotAccepted { event: kind, state }),
        }
    }

    /// Enter `state` and hand out a fresh generation for the unit.
    fn start(&mut self, state: MachineState, payload: P) -> Effect<D, E, P> {
        let resume = match &self.in_flight {
            Some(flight) => flight.resume,
            None => self.state,
        };
        self.generation += 1;
        self.state = state;
        self.context.meta_mut().begin(payload.clone());
        self.in_flight = Some(Flight {
            generation: self.generation,
            payload: payload.clone(),
            resume,
        });
        Effect::Spawn {
            generation: self.generation,
            payload,
        }
    }

    fn on_settled(&mut self, generation: u64, report: UnitReport<D, E>) -> Vec<Effect<D, E, P>> {
        if !self.is_current(generation) {
            return Vec::new();
        }
        let Some(flight) = self.in_flight.take() else {
            return Vec::new();
        };

        let was_refetching = self.state == MachineState::Refetching;
        self.context.meta_mut().retry_attempts = report.retry_attempts;

        match report.settlement {
            Settlement::Resolved(data) => {
                self.state = MachineState::Resolved;
                self.context.settle(Settlement::Resolved(data.clone()));
                vec![Effect::NotifySuccess {
                    data,
                    payload: flight.payload,
                }]
            }
            Settlement::Rejected(error) => {
                let keep = was_refetching
                    && self.policy.refetch_failure == RefetchFailure::KeepResponse
                    && self.context.response().is_some();
                if keep {
                    self.state = MachineState::Resolved;
                } else {
                    self.state = MachineState::Rejected;
                    self.context.settle(Settlement::Rejected(error.clone()));
                }
                vec![Effect::NotifyError {
                    error,
                    payload: flight.payload,
                }]
            }
        }
    }

    /// Drop the current flight and fall back to the state it started from.
    /// Context is left as the last settlement wrote it.
    fn on_crashed(&mut self, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        if let Some(flight) = self.in_flight.take() {
            self.state = flight.resume;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::BackgroundPayload;
    use rstest::rstest;
    use serde_json::{Value, json};

    type Machine = StateMachine<Vec<u32>, String, Value>;

    fn machine(policy: MachinePolicy) -> Machine {
        let options = RetryOptions {
            retry_enabled: true,
            retry_count: 2,
            retry_delay: Duration::from_millis(10),
        };
        StateMachine::new(Arc::new(options), policy)
    }

    fn fetch(m: &mut Machine, payload: Value) -> u64 {
        let effects = m.apply(Input::Event(Event::fetch(payload))).unwrap();
        match effects.as_slice() {
            [Effect::Spawn { generation, .. }] => *generation,
            other => panic!("expected a single spawn, got {other:?}"),
        }
    }

    type Effects = Vec<Effect<Vec<u32>, String, Value>>;

    fn report(
        settlement: Settlement<Vec<u32>, String>,
        retry_attempts: u32,
    ) -> UnitReport<Vec<u32>, String> {
        UnitReport {
            settlement,
            retry_attempts,
            invocations: retry_attempts + 1,
        }
    }

    fn settle(
        m: &mut Machine,
        generation: u64,
        settlement: Settlement<Vec<u32>, String>,
    ) -> Effects {
        m.apply(Input::Settled {
            generation,
            report: report(settlement, 0),
        })
        .unwrap()
    }

    fn settle_current(m: &mut Machine, settlement: Settlement<Vec<u32>, String>) -> Effects {
        let generation = m.generation();
        settle(m, generation, settlement)
    }

    fn assert_exclusive(m: &Machine) {
        assert!(
            !(m.context().response().is_some() && m.context().error().is_some()),
            "response and error both present in state={}",
            m.state()
        );
    }

    fn resolved_machine(policy: MachinePolicy, payload: Value, data: Vec<u32>) -> Machine {
        let mut m = machine(policy);
        let generation = fetch(&mut m, payload);
        settle(&mut m, generation, Settlement::Resolved(data));
        assert_eq!(m.state(), MachineState::Resolved);
        m
    }

    #[test]
    fn starts_idle_and_empty() {
        let m = machine(MachinePolicy::default());
        assert_eq!(m.state(), MachineState::Idle);
        assert!(m.context().response().is_none());
        assert!(m.context().error().is_none());
        assert_eq!(m.generation(), 0);
    }

    #[test]
    fn fetch_from_idle_enters_pending_and_spawns() {
        let mut m = machine(MachinePolicy::default());
        let effects = m.apply(Input::Event(Event::fetch(json!({ "id": 1 })))).unwrap();

        assert_eq!(m.state(), MachineState::Pending);
        assert_eq!(m.context().payload(), Some(&json!({ "id": 1 })));
        assert_eq!(m.context().meta().retry_attempts, 0);
        assert_eq!(
            effects,
            vec![Effect::Spawn {
                generation: 1,
                payload: json!({ "id": 1 })
            }]
        );
    }

    #[test]
    fn success_resolves_and_notifies() {
        let mut m = machine(MachinePolicy::default());
        let generation = fetch(&mut m, json!("x"));
        let effects = m
            .apply(Input::Settled {
                generation,
                report: report(Settlement::Resolved(vec![1]), 1),
            })
            .unwrap();

        assert_eq!(m.state(), MachineState::Resolved);
        assert_eq!(m.context().response(), Some(&vec![1]));
        assert!(m.context().error().is_none());
        assert_eq!(m.context().meta().retry_attempts, 1);
        assert_eq!(
            effects,
            vec![Effect::NotifySuccess {
                data: vec![1],
                payload: json!("x")
            }]
        );
    }

    #[test]
    fn failure_rejects_and_notifies() {
        let mut m = machine(MachinePolicy::default());
        let generation = fetch(&mut m, json!("x"));
        let effects = settle(&mut m, generation, Settlement::Rejected("boom".to_string()));

        assert_eq!(m.state(), MachineState::Rejected);
        assert!(m.context().response().is_none());
        assert_eq!(m.context().error().map(String::as_str), Some("boom"));
        assert_eq!(
            effects,
            vec![Effect::NotifyError {
                error: "boom".to_string(),
                payload: json!("x")
            }]
        );
    }

    #[test]
    fn fetch_from_rejected_is_manual_retry() {
        let mut m = machine(MachinePolicy::default());
        let generation = fetch(&mut m, json!("x"));
        m.apply(Input::Settled {
            generation,
            report: report(Settlement::Rejected("boom".to_string()), 2),
        })
        .unwrap();
        assert_eq!(m.context().meta().retry_attempts, 2);

        let generation = fetch(&mut m, json!("y"));
        assert_eq!(m.state(), MachineState::Pending);
        assert_eq!(m.context().meta().retry_attempts, 0);
        assert_eq!(m.context().payload(), Some(&json!("y")));

        settle(&mut m, generation, Settlement::Resolved(vec![7]));
        assert_eq!(m.state(), MachineState::Resolved);
        assert_eq!(m.context().response(), Some(&vec![7]));
        assert!(m.context().error().is_none());
    }

    #[test]
    fn fetch_from_resolved_restarts_in_foreground() {
        let mut m = resolved_machine(MachinePolicy::default(), json!("a"), vec![1]);
        let generation = fetch(&mut m, json!("b"));

        assert_eq!(generation, 2);
        assert_eq!(m.state(), MachineState::Pending);
        assert_eq!(m.context().payload(), Some(&json!("b")));
    }

    #[test]
    fn background_fetch_merges_partial_payload() {
        let mut m = resolved_machine(MachinePolicy::default(), json!({ "a": 1, "b": 2 }), vec![1]);
        let effects = m
            .apply(Input::Event(Event::fetch_background(BackgroundPayload::partial(
                json!({ "b": 3 }),
            ))))
            .unwrap();

        assert_eq!(m.state(), MachineState::Refetching);
        assert_eq!(m.context().response(), Some(&vec![1]));
        assert_eq!(m.context().payload(), Some(&json!({ "a": 1, "b": 3 })));
        assert_eq!(
            effects,
            vec![Effect::Spawn {
                generation: 2,
                payload: json!({ "a": 1, "b": 3 })
            }]
        );
    }

    #[test]
    fn background_fetch_derives_and_reuses_payload() {
        let mut m = resolved_machine(MachinePolicy::default(), json!({ "page": 1 }), vec![1]);
        m.apply(Input::Event(Event::fetch_background(BackgroundPayload::derive(
            |p: &Value| json!({ "page": p["page"].as_u64().unwrap_or(0) + 1 }),
        ))))
        .unwrap();
        assert_eq!(m.context().payload(), Some(&json!({ "page": 2 })));

        settle_current(&mut m, Settlement::Resolved(vec![2]));
        let effects = m
            .apply(Input::Event(Event::fetch_background(BackgroundPayload::Reuse)))
            .unwrap();
        assert_eq!(
            effects,
            vec![Effect::Spawn {
                generation: 3,
                payload: json!({ "page": 2 })
            }]
        );
    }

    #[test]
    fn bad_partial_payload_leaves_machine_untouched() {
        let mut m = resolved_machine(MachinePolicy::default(), json!("scalar"), vec![1]);
        let err = m
            .apply(Input::Event(Event::fetch_background(BackgroundPayload::partial(
                json!({ "b": 3 }),
            ))))
            .unwrap_err();

        assert!(matches!(err, SettleError::PayloadNotObject));
        assert_eq!(m.state(), MachineState::Resolved);
        assert_eq!(m.generation(), 1);
    }

    #[test]
    fn failed_refetch_discards_response_by_default() {
        let mut m = resolved_machine(MachinePolicy::default(), json!("a"), vec![1]);
        m.apply(Input::Event(Event::fetch_background(BackgroundPayload::Reuse)))
            .unwrap();
        settle_current(&mut m, Settlement::Rejected("boom".to_string()));

        assert_eq!(m.state(), MachineState::Rejected);
        assert!(m.context().response().is_none());
        assert_eq!(m.context().error().map(String::as_str), Some("boom"));
    }

    #[test]
    fn failed_refetch_can_keep_response() {
        let policy = MachinePolicy {
            refetch_failure: RefetchFailure::KeepResponse,
            ..Default::default()
        };
        let mut m = resolved_machine(policy, json!("a"), vec![1]);
        m.apply(Input::Event(Event::fetch_background(BackgroundPayload::Reuse)))
            .unwrap();
        let effects = settle_current(&mut m, Settlement::Rejected("boom".to_string()));

        assert_eq!(m.state(), MachineState::Resolved);
        assert_eq!(m.context().response(), Some(&vec![1]));
        assert!(m.context().error().is_none());
        assert!(matches!(effects.as_slice(), [Effect::NotifyError { .. }]));
    }

    #[test]
    fn foreground_failure_ignores_keep_response() {
        let policy = MachinePolicy {
            refetch_failure: RefetchFailure::KeepResponse,
            ..Default::default()
        };
        let mut m = resolved_machine(policy, json!("a"), vec![1]);
        let generation = fetch(&mut m, json!("a"));
        settle(&mut m, generation, Settlement::Rejected("boom".to_string()));

        assert_eq!(m.state(), MachineState::Rejected);
        assert!(m.context().response().is_none());
    }

    #[test]
    fn update_projects_response_without_transition() {
        let mut m = resolved_machine(MachinePolicy::default(), json!("a"), vec![1, 2, 3]);
        let effects = m
            .apply(Input::Event(Event::update(|mut xs: Vec<u32>| {
                xs.push(4);
                xs
            })))
            .unwrap();

        assert!(effects.is_empty());
        assert_eq!(m.state(), MachineState::Resolved);
        assert_eq!(m.context().response(), Some(&vec![1, 2, 3, 4]));
        assert_eq!(m.generation(), 1);
    }

    #[test]
    fn identity_update_changes_nothing() {
        let mut m = resolved_machine(MachinePolicy::default(), json!("a"), vec![1, 2, 3]);
        let before = m.snapshot();
        let effects = m.apply(Input::Event(Event::update(|xs| xs))).unwrap();

        assert!(effects.is_empty());
        assert_eq!(m.state(), before.state);
        assert_eq!(m.context().response(), before.response());
        assert_eq!(m.context().payload(), before.context.payload());
    }

    #[rstest]
    #[case::idle_update(MachineState::Idle, true)]
    #[case::idle_background(MachineState::Idle, false)]
    #[case::pending_update(MachineState::Pending, true)]
    #[case::pending_background(MachineState::Pending, false)]
    #[case::rejected_update(MachineState::Rejected, true)]
    #[case::rejected_background(MachineState::Rejected, false)]
    fn events_outside_resolved_are_refused(#[case] state: MachineState, #[case] update: bool) {
        let mut m = machine(MachinePolicy::default());
        if state != MachineState::Idle {
            let generation = fetch(&mut m, json!("x"));
            if state == MachineState::Rejected {
                settle(&mut m, generation, Settlement::Rejected("boom".to_string()));
            }
        }
        assert_eq!(m.state(), state);

        let event = if update {
            Event::update(|xs| xs)
        } else {
            Event::fetch_background(BackgroundPayload::Reuse)
        };
        let kind = event.kind();
        let err = m.apply(Input::Event(event)).unwrap_err();

        assert!(matches!(
            err,
            SettleError::NotAccepted { event, state: s } if event == kind && s == state
        ));
        assert_eq!(m.state(), state);
    }

    #[test]
    fn fetch_while_in_flight_is_rejected_by_default() {
        let mut m = machine(MachinePolicy::default());
        fetch(&mut m, json!("a"));
        let err = m.apply(Input::Event(Event::fetch(json!("b")))).unwrap_err();

        assert!(matches!(err, SettleError::Busy { state: MachineState::Pending }));
        assert_eq!(m.context().payload(), Some(&json!("a")));
        assert_eq!(m.generation(), 1);
    }

    #[test]
    fn supersede_policy_restarts_and_ignores_stale_settlement() {
        let policy = MachinePolicy {
            in_flight: InFlight::Supersede,
            ..Default::default()
        };
        let mut m = machine(policy);
        let first = fetch(&mut m, json!("a"));
        let second = fetch(&mut m, json!("b"));
        assert_ne!(first, second);
        assert!(!m.is_current(first));
        assert!(m.is_current(second));

        let effects = settle(&mut m, first, Settlement::Resolved(vec![1]));
        assert!(effects.is_empty());
        assert_eq!(m.state(), MachineState::Pending);
        assert!(m.context().response().is_none());

        settle(&mut m, second, Settlement::Resolved(vec![2]));
        assert_eq!(m.state(), MachineState::Resolved);
        assert_eq!(m.context().response(), Some(&vec![2]));
    }

    #[test]
    fn settlement_after_settling_is_ignored() {
        let mut m = resolved_machine(MachinePolicy::default(), json!("a"), vec![1]);
        let effects = settle(&mut m, 1, Settlement::Rejected("late".to_string()));

        assert!(effects.is_empty());
        assert_eq!(m.state(), MachineState::Resolved);
        assert_eq!(m.context().response(), Some(&vec![1]));
    }

    #[test]
    fn response_and_error_stay_exclusive_across_a_long_run() {
        let mut m = machine(MachinePolicy::default());
        assert_exclusive(&m);

        let g = fetch(&mut m, json!("a"));
        assert_exclusive(&m);
        settle(&mut m, g, Settlement::Rejected("e1".to_string()));
        assert_exclusive(&m);

        let g = fetch(&mut m, json!("a"));
        assert_exclusive(&m);
        settle(&mut m, g, Settlement::Resolved(vec![1]));
        assert_exclusive(&m);

        m.apply(Input::Event(Event::fetch_background(BackgroundPayload::Reuse)))
            .unwrap();
        assert_exclusive(&m);
        settle_current(&mut m, Settlement::Rejected("e2".to_string()));
        assert_exclusive(&m);

        let g = fetch(&mut m, json!("b"));
        settle(&mut m, g, Settlement::Resolved(vec![2]));
        m.apply(Input::Event(Event::update(|mut xs: Vec<u32>| {
            xs.clear();
            xs
        })))
        .unwrap();
        assert_exclusive(&m);
    }

    #[test]
    fn background_fetch_resets_attempts_and_advances_generation() {
        let mut m = machine(MachinePolicy::default());
        let first = fetch(&mut m, json!({ "page": 1 }));
        m.apply(Input::Settled {
            generation: first,
            report: report(Settlement::Resolved(vec![1]), 2),
        })
        .unwrap();
        assert_eq!(m.context().meta().retry_attempts, 2);

        let effects = m
            .apply(Input::Event(Event::fetch_background(BackgroundPayload::Reuse)))
            .unwrap();

        assert_eq!(m.state(), MachineState::Refetching);
        assert_eq!(m.context().meta().retry_attempts, 0);
        assert_eq!(m.generation(), first + 1);
        assert!(matches!(
            effects.as_slice(),
            [Effect::Spawn { generation, .. }] if *generation == first + 1
        ));
    }

    #[test]
    fn crash_from_idle_falls_back_to_idle() {
        let mut m = machine(MachinePolicy::default());
        let generation = fetch(&mut m, json!("a"));

        let effects = m.apply(Input::Crashed { generation }).unwrap();

        assert!(effects.is_empty());
        assert_eq!(m.state(), MachineState::Idle);
        assert!(!m.is_current(generation));
        assert!(m.context().response().is_none());
        assert!(m.context().error().is_none());

        let next = fetch(&mut m, json!("b"));
        assert_eq!(m.state(), MachineState::Pending);
        assert!(m.is_current(next));
    }

    #[test]
    fn crash_during_refetch_keeps_the_previous_response() {
        let mut m = resolved_machine(MachinePolicy::default(), json!("a"), vec![1, 2]);
        m.apply(Input::Event(Event::fetch_background(BackgroundPayload::Reuse)))
            .unwrap();
        let generation = m.generation();

        m.apply(Input::Crashed { generation }).unwrap();

        assert_eq!(m.state(), MachineState::Resolved);
        assert_eq!(m.context().response(), Some(&vec![1, 2]));
        assert_exclusive(&m);
    }

    #[test]
    fn crash_after_supersede_resumes_the_last_settled_state() {
        let policy = MachinePolicy {
            in_flight: InFlight::Supersede,
            ..Default::default()
        };
        let mut m = machine(policy);
        let g = fetch(&mut m, json!("a"));
        settle(&mut m, g, Settlement::Rejected("boom".to_string()));

        fetch(&mut m, json!("b"));
        let latest = fetch(&mut m, json!("c"));
        m.apply(Input::Crashed { generation: latest }).unwrap();

        assert_eq!(m.state(), MachineState::Rejected);
        assert_eq!(m.context().error().map(String::as_str), Some("boom"));
    }

    #[test]
    fn stale_crash_is_ignored() {
        let mut m = resolved_machine(MachinePolicy::default(), json!("a"), vec![1]);
        let generation = fetch(&mut m, json!("b"));

        m.apply(Input::Crashed { generation: generation - 1 }).unwrap();

        assert_eq!(m.state(), MachineState::Pending);
        assert!(m.is_current(generation));
    }
}
