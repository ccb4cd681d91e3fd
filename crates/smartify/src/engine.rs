//! Controller engine
//!
//! The [`Engine`] is the machinery every controller shares: current state,
//! the single timer, the poll interval, listeners, entity tracking and
//! actuation. A [`Machine`] supplies the controller-specific parts: which
//! entities to watch, how a state change maps to an event, and the
//! `(state, event)` transition table. [`Controller`] ties the two together.
//!
//! ```text
//! bus ──► EntityTracker ──► Machine::on_state_change ──► event
//!                                                         │
//! timer / poll ──────────────────────────────────────────►│
//!                                                         ▼
//!                                  Machine::on_event(engine, event)
//!                                    set_state · set_timer · service_call
//! ```

use crate::error::{ControllerError, ControllerResult};
use crate::host::Host;
use crate::listeners::{ControllerView, ListenerHandle, Listeners, Status};
use crate::timer::{Poll, Timer};
use crate::tracker::EntityTracker;
use async_trait::async_trait;
use smartify_core::{attributes, EntityId, Event, State, StateChangedData};
use smartify_event_bus::ListenerId;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// State changes of a controller's tracked entities
pub type StateChanges = mpsc::UnboundedReceiver<Event<StateChangedData>>;

/// Bounds shared by controller states and events
pub trait StateValue: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> StateValue for T where T: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {}

/// Controller-specific behaviour on top of the [`Engine`]
#[async_trait]
pub trait Machine: Clone + Send + Sync + 'static {
    type State: StateValue;
    type Event: StateValue;

    /// Name used until the controlled entity reports a friendly name
    fn title(&self) -> String;

    /// The actuator this controller drives, if any
    fn controlled_entity(&self) -> Option<EntityId>;

    /// Entities whose state changes the controller receives, in order
    fn tracked_entity_ids(&self) -> Vec<EntityId>;

    fn initial_state(&self) -> Self::State;

    /// Whether the controller reports "on" in this state
    fn is_on(state: Self::State) -> bool;

    /// Event fired once setup has seeded every tracked entity
    fn setup_event(&self) -> Option<Self::Event> {
        None
    }

    /// Interval and event for periodic re-evaluation
    fn poll(&self) -> Option<(Duration, Self::Event)> {
        None
    }

    /// Map a forwarded state change to an event, updating cached inputs
    fn on_state_change(&mut self, engine: &Engine<Self::State>, state: &State) -> Option<Self::Event>;

    /// Event fired when the controller timer expires
    fn on_timer_expired(&self) -> Self::Event;

    /// The transition table
    async fn on_event(
        &mut self,
        engine: &mut Engine<Self::State>,
        event: Self::Event,
    ) -> ControllerResult<()>;
}

/// Shared controller machinery
pub struct Engine<S> {
    name: String,
    controlled_entity: Option<EntityId>,
    tracked_entity_ids: Vec<EntityId>,
    state: S,
    is_on: fn(S) -> bool,
    timer: Timer,
    poll: Poll,
    listeners: Listeners,
    status: Arc<RwLock<Status>>,
    tracker: EntityTracker,
    host: Host,
    subscription: Option<ListenerId>,
    is_setup: bool,
}

impl<S: StateValue> Engine<S> {
    pub fn new(
        host: Host,
        name: impl Into<String>,
        controlled_entity: Option<EntityId>,
        tracked_entity_ids: Vec<EntityId>,
        initial_state: S,
        is_on: fn(S) -> bool,
    ) -> Self {
        let name = name.into();
        let status = Status {
            name: name.clone(),
            state: initial_state.to_string(),
            is_on: is_on(initial_state),
        };

        Self {
            name,
            controlled_entity,
            tracked_entity_ids,
            state: initial_state,
            is_on,
            timer: Timer::new(),
            poll: Poll::new(),
            listeners: Listeners::new(),
            status: Arc::new(RwLock::new(status)),
            tracker: EntityTracker::new(),
            host,
            subscription: None,
            is_setup: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> S {
        self.state
    }

    pub fn is_on(&self) -> bool {
        (self.is_on)(self.state)
    }

    pub fn is_setup(&self) -> bool {
        self.is_setup
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn controlled_entity(&self) -> Option<&EntityId> {
        self.controlled_entity.as_ref()
    }

    pub fn tracked_entity_ids(&self) -> &[EntityId] {
        &self.tracked_entity_ids
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn poll(&self) -> &Poll {
        &self.poll
    }

    /// Change the current state and notify listeners
    ///
    /// Setting the current state again does nothing.
    pub fn set_state(&mut self, new_state: S) {
        if self.state == new_state {
            return;
        }

        debug!(
            controller = %self.name,
            state = %self.state,
            "Changing state to '{}'",
            new_state
        );
        self.state = new_state;
        {
            let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
            status.state = new_state.to_string();
            status.is_on = (self.is_on)(new_state);
        }
        self.listeners.notify();
    }

    /// Start the timer, or cancel it with `None`
    ///
    /// Any pending timer is canceled first, so at most one is ever live.
    pub fn set_timer(&mut self, period: Option<Duration>) {
        if self.timer.cancel() {
            debug!(controller = %self.name, state = %self.state, "Canceled timer");
        }

        if let Some(period) = period {
            self.timer.start(period);
            debug!(
                controller = %self.name,
                state = %self.state,
                "Started timer for {:?}",
                period
            );
        }
    }

    /// Current state of any entity on the host
    pub fn entity_state(&self, entity_id: &EntityId) -> Option<State> {
        self.host.states.get(&entity_id.to_string())
    }

    /// Whether an entity currently holds exactly `value`
    pub fn is_entity_state(&self, entity_id: Option<&EntityId>, value: &str) -> bool {
        entity_id.is_some_and(|id| self.host.states.is_state(&id.to_string(), value))
    }

    /// Call a service on the controlled entity
    ///
    /// The call carries a context the tracker recognises, so the state change
    /// it causes is not mistaken for an external one.
    pub async fn service_call(
        &mut self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
    ) -> ControllerResult<()> {
        let entity_id = self
            .controlled_entity
            .as_ref()
            .ok_or_else(|| ControllerError::NoControlledEntity(self.name.clone()))?;

        debug!(
            controller = %self.name,
            state = %self.state,
            "Calling '{}.{}' service",
            domain,
            service
        );

        let mut data = match data {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        data.insert(
            attributes::ENTITY_ID.to_string(),
            serde_json::Value::String(entity_id.to_string()),
        );

        let context = self.tracker.issue_context();
        let services = self.host.services.clone();
        services
            .call(domain, service, serde_json::Value::Object(data), context)
            .await?;
        Ok(())
    }

    pub fn add_listener(&self, callback: impl Fn() + Send + Sync + 'static) -> ListenerHandle {
        self.listeners.add(callback)
    }

    /// Observer view that outlives borrows of the engine
    pub fn view(&self) -> ControllerView {
        ControllerView::new(self.status.clone(), self.listeners.clone())
    }

    fn set_name(&mut self, name: String) {
        self.status
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .name = name.clone();
        self.name = name;
    }
}

/// A [`Machine`] running on an [`Engine`]
pub struct Controller<M: Machine> {
    engine: Engine<M::State>,
    machine: M,
    /// Copy of the machine as configured, restored on teardown
    pristine: M,
}

impl<M: Machine> Controller<M> {
    pub fn new(host: Host, machine: M) -> Self {
        let engine = Engine::new(
            host,
            machine.title(),
            machine.controlled_entity(),
            machine.tracked_entity_ids(),
            machine.initial_state(),
            M::is_on,
        );

        Self {
            engine,
            pristine: machine.clone(),
            machine,
        }
    }

    pub fn engine(&self) -> &Engine<M::State> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<M::State> {
        &mut self.engine
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn state(&self) -> M::State {
        self.engine.state
    }

    pub fn view(&self) -> ControllerView {
        self.engine.view()
    }

    /// Subscribe to the tracked entities and seed them from the host
    ///
    /// Returns the subscription, or `None` if the controller was already set
    /// up. Entities missing from the host are skipped with a warning.
    pub async fn setup(&mut self) -> Option<StateChanges> {
        if self.engine.is_setup {
            warn!(controller = %self.engine.name, "Controller already started");
            return None;
        }

        let listener = self.engine.host.bus.track_state_change(
            self.engine
                .tracked_entity_ids
                .iter()
                .map(|entity_id| entity_id.to_string()),
        );
        self.engine.subscription = Some(listener.id);

        let tracked = self.engine.tracked_entity_ids.clone();
        for entity_id in &tracked {
            let Some(state) = self.engine.entity_state(entity_id) else {
                warn!(
                    controller = %self.engine.name,
                    "Referenced entity '{}' is missing",
                    entity_id
                );
                continue;
            };

            if self.engine.controlled_entity.as_ref() == Some(entity_id) {
                if let Some(name) = state.attribute::<String>(attributes::FRIENDLY_NAME) {
                    self.engine.set_name(name);
                }
            }

            if self.engine.tracker.accept(&state) {
                self.deliver(&state).await;
            }
        }

        if let Some((period, _)) = self.machine.poll() {
            self.engine.poll.start(period);
        }
        self.engine.is_setup = true;
        debug!(controller = %self.engine.name, state = %self.engine.state, "Controller started");

        if let Some(event) = self.machine.setup_event() {
            self.fire_event(event).await;
        }

        Some(listener.rx)
    }

    /// Revoke the subscription, cancel timers and return to the initial state
    ///
    /// Safe to call more than once and directly before another `setup`.
    pub fn teardown(&mut self) {
        if let Some(id) = self.engine.subscription.take() {
            self.engine.host.bus.untrack(id);
        }
        self.engine.set_timer(None);
        self.engine.poll.stop();
        self.engine.tracker.reset();
        self.machine = self.pristine.clone();

        let initial = self.machine.initial_state();
        self.engine.set_state(initial);

        if self.engine.is_setup {
            debug!(controller = %self.engine.name, "Controller stopped");
        }
        self.engine.is_setup = false;
    }

    /// Run the transition table for one event
    pub async fn fire_event(&mut self, event: M::Event) {
        debug!(
            controller = %self.engine.name,
            state = %self.engine.state,
            "Processing '{}' event",
            event
        );

        if let Err(err) = self.machine.on_event(&mut self.engine, event).await {
            error!(
                controller = %self.engine.name,
                state = %self.engine.state,
                error = %err,
                "Failed to handle '{}' event",
                event
            );
        }
    }

    /// Handle a `state_changed` event from the bus
    pub async fn handle_state_changed(&mut self, event: Event<StateChangedData>) {
        if !self.engine.is_setup {
            return;
        }
        if let Some(state) = self.engine.tracker.filter(&event) {
            debug!(
                controller = %self.engine.name,
                state = %self.engine.state,
                "{} changed from '{}' to '{}'",
                state.name(),
                event
                    .data
                    .old_state
                    .as_ref()
                    .map(|s| s.state.as_str())
                    .unwrap_or("None"),
                state.state
            );
            self.deliver(&state).await;
        }
    }

    /// Fire the timer event if the timer has expired
    pub async fn expire_timer(&mut self) {
        if self.engine.timer.take_expired(Instant::now()) {
            let event = self.machine.on_timer_expired();
            self.fire_event(event).await;
        }
    }

    /// Fire the poll event if a tick is due
    pub async fn poll(&mut self) {
        if !self.engine.poll.take_due(Instant::now()) {
            return;
        }
        if let Some((_, event)) = self.machine.poll() {
            debug!(controller = %self.engine.name, state = %self.engine.state, "Polling for changes");
            self.fire_event(event).await;
        }
    }

    async fn deliver(&mut self, state: &State) {
        if let Some(event) = self.machine.on_state_change(&self.engine, state) {
            self.fire_event(event).await;
        }
    }
}
