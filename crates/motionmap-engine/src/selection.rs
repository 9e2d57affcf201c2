use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{Sensor, SensorId};

/// Sensors currently chosen for display. Transient view state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSelection(BTreeSet<SensorId>);

impl SensorSelection {
    pub fn all(sensors: &[Sensor]) -> Self {
        Self(sensors.iter().map(|s| s.id).collect())
    }

    pub fn from_ids(ids: impl IntoIterator<Item = SensorId>) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn contains(&self, id: SensorId) -> bool {
        self.0.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = SensorId> + '_ {
        self.0.iter().copied()
    }

    /// The only selected sensor, if exactly one is selected.
    pub fn single(&self) -> Option<SensorId> {
        match self.0.len() {
            1 => self.0.first().copied(),
            _ => None,
        }
    }

    pub fn toggle(&mut self, id: SensorId) {
        if !self.0.remove(&id) {
            self.0.insert(id);
        }
    }

    /// Drops ids that no longer exist. Resets to every sensor if nothing survives.
    pub fn prune(&mut self, sensors: &[Sensor]) {
        self.0.retain(|id| sensors.iter().any(|s| s.id == *id));
        if self.0.is_empty() && !sensors.is_empty() {
            *self = Self::all(sensors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(id: SensorId) -> Sensor {
        Sensor {
            id,
            name: format!("Sensor {id}"),
            kind: "motion".to_owned(),
            unique_id: format!("s-{id}"),
            is_hidden: false,
        }
    }

    #[test]
    fn toggle_adds_and_removes() {
        let mut selection = SensorSelection::from_ids([1]);
        selection.toggle(2);
        assert_eq!(selection.len(), 2);
        assert_eq!(selection.single(), None);
        selection.toggle(1);
        assert_eq!(selection.single(), Some(2));
    }

    #[test]
    fn prune_drops_vanished_ids() {
        let mut selection = SensorSelection::from_ids([1, 2, 9]);
        selection.prune(&[sensor(1), sensor(2)]);
        assert_eq!(selection.ids().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn prune_resets_to_all_when_emptied() {
        let mut selection = SensorSelection::from_ids([9]);
        selection.prune(&[sensor(1), sensor(2)]);
        assert_eq!(selection, SensorSelection::from_ids([1, 2]));

        let mut selection = SensorSelection::from_ids([9]);
        selection.prune(&[]);
        assert!(selection.is_empty());
    }
}
