//! Surface State Machine
//!
//! Every playback surface owns one `StateMachine`: a fixed set of categories,
//! each holding exactly one value from its own domain. Writes that change a
//! value notify every listener synchronously before returning; writes that
//! repeat the current value are silent.
//!
//! # Categories
//!
//! ```text
//!   category     domain                                              default
//!   ───────────  ──────────────────────────────────────────────────  ───────────
//!   playback     idle loading ready playing paused seeking ended     idle
//!                error
//!   volume       muted unmuted                                       unmuted
//!   display      windowed fullscreen                                 windowed
//!   visualMode   normal cinematic                                    normal
//!   subtitles    on off                                              off
//!   settings     open closed                                         closed
//!   loop         looping not_looping                                 not_looping
//!   pip          enabled disabled                                    disabled
//!   seeking      idle seeking                                        idle
//! ```
//!
//! # Re-entrancy
//!
//! Listeners are invoked after the value lock is released, so a listener may
//! read state or even write another category. Writes issued from inside a
//! listener notify recursively, in call order.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// A state category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    /// Load and transport state
    Playback,
    /// Muted or audible
    Volume,
    /// Windowed or fullscreen
    Display,
    /// Normal or cinematic dimming
    VisualMode,
    /// Subtitle track shown
    Subtitles,
    /// Settings menu open
    Settings,
    /// Loop on end of media
    Loop,
    /// Picture-in-picture
    Pip,
    /// User is dragging the seek range
    Seeking,
}

impl Category {
    /// Every category, in storage order
    pub const ALL: [Category; 9] = [
        Category::Playback,
        Category::Volume,
        Category::Display,
        Category::VisualMode,
        Category::Subtitles,
        Category::Settings,
        Category::Loop,
        Category::Pip,
        Category::Seeking,
    ];

    const fn index(self) -> usize {
        self as usize
    }

    /// Name used by hosts and in logs
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Playback => "playback",
            Self::Volume => "volume",
            Self::Display => "display",
            Self::VisualMode => "visualMode",
            Self::Subtitles => "subtitles",
            Self::Settings => "settings",
            Self::Loop => "loop",
            Self::Pip => "pip",
            Self::Seeking => "seeking",
        }
    }

    /// Values this category may hold
    #[must_use]
    pub const fn domain(self) -> &'static [StateValue] {
        use StateValue::*;
        match self {
            Self::Playback => &[Idle, Loading, Ready, Playing, Paused, Seeking, Ended, Error],
            Self::Volume => &[Muted, Unmuted],
            Self::Display => &[Windowed, Fullscreen],
            Self::VisualMode => &[Normal, Cinematic],
            Self::Subtitles => &[On, Off],
            Self::Settings => &[Open, Closed],
            Self::Loop => &[Looping, NotLooping],
            Self::Pip => &[Enabled, Disabled],
            Self::Seeking => &[Idle, Seeking],
        }
    }

    /// Value held right after construction
    #[must_use]
    pub const fn default_value(self) -> StateValue {
        match self {
            Self::Playback | Self::Seeking => StateValue::Idle,
            Self::Volume => StateValue::Unmuted,
            Self::Display => StateValue::Windowed,
            Self::VisualMode => StateValue::Normal,
            Self::Subtitles => StateValue::Off,
            Self::Settings => StateValue::Closed,
            Self::Loop => StateValue::NotLooping,
            Self::Pip => StateValue::Disabled,
        }
    }

    /// Whether `value` belongs to this category's domain
    #[must_use]
    pub fn accepts(self, value: StateValue) -> bool {
        self.domain().contains(&value)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| StateError::UnknownCategory(s.to_string()))
    }
}

/// A value a category can hold
///
/// `Idle` and `Seeking` appear in both the `playback` and `seeking` domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum StateValue {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Seeking,
    Ended,
    Error,
    Muted,
    Unmuted,
    Windowed,
    Fullscreen,
    Normal,
    Cinematic,
    On,
    Off,
    Open,
    Closed,
    Looping,
    NotLooping,
    Enabled,
    Disabled,
}

impl StateValue {
    const ALL: [StateValue; 22] = [
        Self::Idle,
        Self::Loading,
        Self::Ready,
        Self::Playing,
        Self::Paused,
        Self::Seeking,
        Self::Ended,
        Self::Error,
        Self::Muted,
        Self::Unmuted,
        Self::Windowed,
        Self::Fullscreen,
        Self::Normal,
        Self::Cinematic,
        Self::On,
        Self::Off,
        Self::Open,
        Self::Closed,
        Self::Looping,
        Self::NotLooping,
        Self::Enabled,
        Self::Disabled,
    ];

    /// Name used by hosts and in logs
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Seeking => "seeking",
            Self::Ended => "ended",
            Self::Error => "error",
            Self::Muted => "muted",
            Self::Unmuted => "unmuted",
            Self::Windowed => "windowed",
            Self::Fullscreen => "fullscreen",
            Self::Normal => "normal",
            Self::Cinematic => "cinematic",
            Self::On => "on",
            Self::Off => "off",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Looping => "looping",
            Self::NotLooping => "not_looping",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StateValue {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| StateError::UnknownValue(s.to_string()))
    }
}

/// Point-in-time copy of every category's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    values: [StateValue; 9],
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            values: Category::ALL.map(Category::default_value),
        }
    }
}

impl StateSnapshot {
    /// Value of one category
    #[must_use]
    pub fn get(&self, category: Category) -> StateValue {
        self.values[category.index()]
    }

    fn set(&mut self, category: Category, value: StateValue) {
        self.values[category.index()] = value;
    }

    /// Iterate `(category, value)` pairs in storage order
    pub fn iter(&self) -> impl Iterator<Item = (Category, StateValue)> + '_ {
        Category::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}

impl Serialize for StateSnapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<&str, StateValue> = self.iter().map(|(c, v)| (c.name(), v)).collect();
        map.serialize(serializer)
    }
}

/// Payload delivered to listeners on every effective change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// Category that changed
    pub category: Category,
    /// New value
    pub value: StateValue,
    /// Value before the change
    pub previous: StateValue,
    /// Full state after the change
    pub snapshot: StateSnapshot,
}

/// Handle returned by [`StateMachine::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Per-surface categorical state store
pub struct StateMachine {
    values: Mutex<StateSnapshot>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a state machine with every category at its default
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: Mutex::new(StateSnapshot::default()),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Set a category, reporting domain violations to the caller
    ///
    /// Returns `Ok(true)` when the value changed and listeners ran,
    /// `Ok(false)` when it already held `value`.
    pub fn try_set_state(&self, category: Category, value: StateValue) -> Result<bool, StateError> {
        if !category.accepts(value) {
            return Err(StateError::OutsideDomain { category, value });
        }
        Ok(self.apply(category, |_| value))
    }

    /// Set a category
    ///
    /// Invalid requests are logged and ignored.
    pub fn set_state(&self, category: Category, value: StateValue) -> bool {
        match self.try_set_state(category, value) {
            Ok(changed) => changed,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring invalid state request");
                false
            }
        }
    }

    /// Set a category addressed by name
    pub fn set_state_by_name(&self, category: &str, value: &str) -> bool {
        let request = category
            .parse::<Category>()
            .and_then(|c| value.parse::<StateValue>().map(|v| (c, v)));
        match request {
            Ok((category, value)) => self.set_state(category, value),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring invalid state request");
                false
            }
        }
    }

    /// Current value of a category
    #[must_use]
    pub fn get_state(&self, category: Category) -> StateValue {
        self.values.lock().get(category)
    }

    /// Current value of a category addressed by name, `None` if unknown
    #[must_use]
    pub fn get_state_by_name(&self, category: &str) -> Option<StateValue> {
        category.parse().ok().map(|c| self.get_state(c))
    }

    /// Whether a category currently holds `value`
    #[must_use]
    pub fn is(&self, category: Category, value: StateValue) -> bool {
        self.get_state(category) == value
    }

    /// Flip between two values
    ///
    /// Moves to `b` when the current value is `a`, otherwise to `a`.
    pub fn toggle_state(&self, category: Category, a: StateValue, b: StateValue) -> bool {
        if let Some(bad) = [a, b].into_iter().find(|v| !category.accepts(*v)) {
            tracing::warn!(
                error = %StateError::OutsideDomain { category, value: bad },
                "Ignoring invalid toggle request"
            );
            return false;
        }
        self.apply(category, |current| if current == a { b } else { a })
    }

    /// Copy of every category's value
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        *self.values.lock()
    }

    /// Subscribe to effective changes
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Unsubscribe one listener; returns whether it was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Drop every listener
    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
    }

    /// Number of registered listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn apply(&self, category: Category, next: impl FnOnce(StateValue) -> StateValue) -> bool {
        let change = {
            let mut values = self.values.lock();
            let previous = values.get(category);
            let value = next(previous);
            if value == previous {
                return false;
            }
            values.set(category, value);
            StateChange {
                category,
                value,
                previous,
                snapshot: *values,
            }
        };

        tracing::trace!(
            category = %change.category,
            from = %change.previous,
            to = %change.value,
            "State transition"
        );

        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&change);
        }
        true
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("values", &self.snapshot())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use pretty_assertions::assert_eq;

    fn counting(machine: &StateMachine) -> (Arc<AtomicUsize>, Arc<Mutex<Vec<StateChange>>>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (c, s) = (Arc::clone(&count), Arc::clone(&seen));
        machine.add_listener(move |change| {
            c.fetch_add(1, Ordering::SeqCst);
            s.lock().push(*change);
        });
        (count, seen)
    }

    #[test]
    fn test_defaults_after_construction() {
        let machine = StateMachine::new();
        for category in Category::ALL {
            assert_eq!(machine.get_state(category), category.default_value());
            assert!(category.accepts(category.default_value()));
        }
    }

    #[test]
    fn test_set_same_value_is_silent() {
        let machine = StateMachine::new();
        let (count, _) = counting(&machine);

        assert!(!machine.set_state(Category::Playback, StateValue::Idle));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_set_new_value_notifies_once_with_snapshot() {
        let machine = StateMachine::new();
        let (count, seen) = counting(&machine);

        assert!(machine.set_state(Category::Playback, StateValue::Loading));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let change = seen.lock()[0];
        assert_eq!(change.category, Category::Playback);
        assert_eq!(change.value, StateValue::Loading);
        assert_eq!(change.previous, StateValue::Idle);
        assert_eq!(change.snapshot.get(Category::Playback), StateValue::Loading);
        assert_eq!(change.snapshot, machine.snapshot());
    }

    #[test]
    fn test_two_rapid_writes_notify_once() {
        let machine = StateMachine::new();
        let (count, _) = counting(&machine);

        assert!(machine.set_state(Category::Playback, StateValue::Playing));
        assert!(!machine.set_state(Category::Playback, StateValue::Playing));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_toggle_semantics() {
        let machine = StateMachine::new();
        let (a, b) = (StateValue::Looping, StateValue::NotLooping);

        // Current is b (default) so toggle goes to a
        assert!(machine.toggle_state(Category::Loop, a, b));
        assert_eq!(machine.get_state(Category::Loop), a);
        assert!(machine.toggle_state(Category::Loop, a, b));
        assert_eq!(machine.get_state(Category::Loop), b);

        // From a value outside {a, b} the toggle lands on a
        machine.set_state(Category::Playback, StateValue::Paused);
        assert!(machine.toggle_state(Category::Playback, StateValue::Playing, StateValue::Ended));
        assert_eq!(machine.get_state(Category::Playback), StateValue::Playing);
    }

    #[test]
    fn test_toggle_notifies_each_flip() {
        let machine = StateMachine::new();
        let (count, seen) = counting(&machine);

        machine.toggle_state(Category::Subtitles, StateValue::Off, StateValue::On);
        machine.toggle_state(Category::Subtitles, StateValue::Off, StateValue::On);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        let values: Vec<StateValue> = seen.lock().iter().map(|c| c.value).collect();
        assert_eq!(values, vec![StateValue::On, StateValue::Off]);
    }

    #[test]
    fn test_value_outside_domain_is_rejected() {
        let machine = StateMachine::new();
        let (count, _) = counting(&machine);

        assert_eq!(
            machine.try_set_state(Category::Volume, StateValue::Playing),
            Err(StateError::OutsideDomain {
                category: Category::Volume,
                value: StateValue::Playing,
            })
        );
        assert!(!machine.set_state(Category::Volume, StateValue::Playing));
        assert!(!machine.toggle_state(Category::Volume, StateValue::Muted, StateValue::On));
        assert_eq!(machine.get_state(Category::Volume), StateValue::Unmuted);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_by_name_access() {
        let machine = StateMachine::new();

        assert!(machine.set_state_by_name("visualMode", "cinematic"));
        assert_eq!(
            machine.get_state_by_name("visualMode"),
            Some(StateValue::Cinematic)
        );
        assert!(!machine.set_state_by_name("brightness", "high"));
        assert!(!machine.set_state_by_name("loop", "sideways"));
        assert_eq!(machine.get_state_by_name("brightness"), None);
    }

    #[test]
    fn test_remove_and_clear_listeners() {
        let machine = StateMachine::new();
        let id = machine.add_listener(|_| {});
        machine.add_listener(|_| {});
        assert_eq!(machine.listener_count(), 2);

        assert!(machine.remove_listener(id));
        assert!(!machine.remove_listener(id));
        assert_eq!(machine.listener_count(), 1);

        machine.clear_listeners();
        assert_eq!(machine.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_write_other_category() {
        let machine = Arc::new(StateMachine::new());
        let weak = Arc::downgrade(&machine);
        machine.add_listener(move |change| {
            if change.category == Category::Display {
                if let Some(m) = weak.upgrade() {
                    m.set_state(Category::VisualMode, StateValue::Normal);
                    m.set_state(Category::Settings, StateValue::Open);
                }
            }
        });

        assert!(machine.set_state(Category::Display, StateValue::Fullscreen));
        assert_eq!(machine.get_state(Category::Settings), StateValue::Open);
    }

    #[test]
    fn test_snapshot_serializes_by_name() {
        let machine = StateMachine::new();
        machine.set_state(Category::Loop, StateValue::Looping);

        let json = serde_json::to_value(machine.snapshot()).unwrap();
        assert_eq!(json["loop"], "looping");
        assert_eq!(json["visualMode"], "normal");
        assert_eq!(json["playback"], "idle");
    }

    #[test]
    fn test_values_order_for_sorted_maps() {
        let mut tally = std::collections::BTreeMap::new();
        for value in [StateValue::Error, StateValue::Loading, StateValue::Error] {
            *tally.entry(value).or_insert(0) += 1;
        }

        let keys: Vec<_> = tally.keys().copied().collect();
        assert_eq!(keys, vec![StateValue::Loading, StateValue::Error]);
        assert_eq!(tally[&StateValue::Error], 2);
    }
}
