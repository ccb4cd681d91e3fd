//! Required on/off conditions gating automatic transitions

use indexmap::IndexMap;
use smartify_core::{EntityId, STATE_OFF, STATE_ON};
use smartify_state_store::StateStore;

/// Entities that must hold an exact on/off value
///
/// Built from `required_on_entities` then `required_off_entities`; an entity
/// listed in both must be off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredConditions {
    expected: IndexMap<EntityId, &'static str>,
}

impl RequiredConditions {
    pub fn new(required_on: &[EntityId], required_off: &[EntityId]) -> Self {
        let mut expected = IndexMap::new();
        for entity_id in required_on {
            expected.insert(entity_id.clone(), STATE_ON);
        }
        for entity_id in required_off {
            expected.insert(entity_id.clone(), STATE_OFF);
        }
        Self { expected }
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }

    pub fn contains(&self, entity_id: &EntityId) -> bool {
        self.expected.contains_key(entity_id)
    }

    /// Required entities in configuration order
    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.expected.keys()
    }

    /// True when every entity's current value equals its expected value
    ///
    /// `current` returns the last known value of an entity; an unknown
    /// entity leaves the conditions unsatisfied.
    pub fn is_satisfied_with<F>(&self, mut current: F) -> bool
    where
        F: FnMut(&EntityId) -> Option<String>,
    {
        self.expected
            .iter()
            .all(|(entity_id, expected)| current(entity_id).as_deref() == Some(*expected))
    }

    /// Check the conditions against the host's current states
    pub fn is_satisfied(&self, states: &StateStore) -> bool {
        self.is_satisfied_with(|entity_id| states.get_state(&entity_id.to_string()))
    }
}
