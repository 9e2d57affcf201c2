//! Storage boundary and the in-memory snapshot the pipeline reads.

use std::fmt;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::{
    decode_adjustments, decode_events, Adjustment, AdjustmentId, Event, NewAdjustment,
    RawAdjustment, RawEvent, Sensor,
};
use crate::reconcile::SlotPlan;
use crate::timestamp::NaiveTimestampPolicy;

pub trait ActivityStore {
    type Error: fmt::Display + fmt::Debug;

    fn list_events(&self) -> Result<Vec<RawEvent>, Self::Error>;
    fn list_adjustments(&self) -> Result<Vec<RawAdjustment>, Self::Error>;
    fn list_sensors(&self) -> Result<Vec<Sensor>, Self::Error>;
    fn create_adjustment(&mut self, new: &NewAdjustment) -> Result<Adjustment, Self::Error>;
    fn delete_adjustment(&mut self, id: AdjustmentId) -> Result<(), Self::Error>;

    /// Deletes every planned id, then inserts the replacement.
    ///
    /// The default issues independent calls and stops at the first failure,
    /// leaving earlier deletes applied. Stores that can should override this
    /// with a single atomic write.
    fn apply_slot_plan(&mut self, plan: &SlotPlan) -> Result<Option<Adjustment>, Self::Error> {
        for &id in &plan.deletes {
            self.delete_adjustment(id)?;
        }
        match &plan.insert {
            Some(new) => self.create_adjustment(new).map(Some),
            None => Ok(None),
        }
    }
}

/// Decoded copy of everything the store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub events: Vec<Event>,
    pub adjustments: Vec<Adjustment>,
    pub sensors: Vec<Sensor>,
    /// Records dropped while decoding.
    pub skipped: usize,
}

impl Snapshot {
    pub fn load<S: ActivityStore>(store: &S, policy: NaiveTimestampPolicy) -> Result<Self> {
        let sensors = store
            .list_sensors()
            .map_err(|err| Error::transport("list sensors", err))?;
        let raw_events = store
            .list_events()
            .map_err(|err| Error::transport("list events", err))?;
        let raw_adjustments = store
            .list_adjustments()
            .map_err(|err| Error::transport("list adjustments", err))?;

        let (events, skipped_events) = decode_events(&raw_events, policy);
        let (adjustments, skipped_adjustments) = decode_adjustments(&raw_adjustments, policy);

        Ok(Self {
            events,
            adjustments,
            sensors,
            skipped: skipped_events + skipped_adjustments,
        })
    }

    /// Reloads from the store. On failure the previous contents stay in place.
    pub fn refresh<S: ActivityStore>(
        &mut self,
        store: &S,
        policy: NaiveTimestampPolicy,
    ) -> Result<()> {
        match Self::load(store, policy) {
            Ok(fresh) => {
                info!(
                    events = fresh.events.len(),
                    adjustments = fresh.adjustments.len(),
                    sensors = fresh.sensors.len(),
                    skipped = fresh.skipped,
                    "snapshot refreshed"
                );
                *self = fresh;
                Ok(())
            }
            Err(err) => {
                warn!("keeping previous snapshot: {err}");
                Err(err)
            }
        }
    }
}
