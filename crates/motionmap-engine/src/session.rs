//! Edit session state machine: `Closed -> Open -> {Saved | Cleared | Cancelled} -> Closed`.

use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};

use crate::error::{Error, Result, ValidationError};
use crate::model::Adjustment;
use crate::reconcile::{
    clear_adjustment, open_adjustment_target, save_adjustment, AdjustmentTarget, ReconcileContext,
    SlotPlan,
};
use crate::store::ActivityStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum State {
    #[default]
    Closed,
    Open(AdjustmentTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Saved {
        plan: SlotPlan,
        inserted: Option<Adjustment>,
    },
    Cleared {
        plan: SlotPlan,
    },
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct EditSession {
    state: State,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    pub fn target(&self) -> Option<&AdjustmentTarget> {
        match &self.state {
            State::Open(target) => Some(target),
            State::Closed => None,
        }
    }

    /// Opens the slot holding `at`. A failed open leaves the state unchanged.
    pub fn open<Tz: TimeZone>(
        &mut self,
        tz: &Tz,
        at: DateTime<Utc>,
        ctx: &ReconcileContext<'_>,
    ) -> Result<&AdjustmentTarget, ValidationError> {
        let target = open_adjustment_target(tz, at, ctx)?;
        self.state = State::Open(target);
        self.target().ok_or(ValidationError::SessionClosed)
    }

    pub fn save<S: ActivityStore>(
        &mut self,
        store: &mut S,
        new_total: i64,
        comment: &str,
    ) -> Result<SessionOutcome> {
        let target = self.target().ok_or(ValidationError::SessionClosed)?;
        let plan = save_adjustment(target, new_total, comment)?;
        let inserted = self.apply(store, &plan)?;
        info!(
            sensor_id = plan.sensor_id,
            slot = %plan.slot,
            deleted = plan.deletes.len(),
            new_total,
            "saved adjustment"
        );
        Ok(SessionOutcome::Saved { plan, inserted })
    }

    pub fn clear<S: ActivityStore>(&mut self, store: &mut S, confirmed: bool) -> Result<SessionOutcome> {
        let target = self.target().ok_or(ValidationError::SessionClosed)?;
        let plan = clear_adjustment(target, confirmed)?;
        self.apply(store, &plan)?;
        info!(
            sensor_id = plan.sensor_id,
            slot = %plan.slot,
            deleted = plan.deletes.len(),
            "cleared adjustments"
        );
        Ok(SessionOutcome::Cleared { plan })
    }

    pub fn cancel(&mut self) -> Result<SessionOutcome, ValidationError> {
        if !self.is_open() {
            return Err(ValidationError::SessionClosed);
        }
        self.state = State::Closed;
        Ok(SessionOutcome::Cancelled)
    }

    // Closes only once the store accepted every write.
    fn apply<S: ActivityStore>(&mut self, store: &mut S, plan: &SlotPlan) -> Result<Option<Adjustment>> {
        match store.apply_slot_plan(plan) {
            Ok(inserted) => {
                self.state = State::Closed;
                Ok(inserted)
            }
            Err(err) => {
                warn!(sensor_id = plan.sensor_id, slot = %plan.slot, "adjustment write failed: {err}");
                Err(Error::transport("apply adjustment", err))
            }
        }
    }
}
