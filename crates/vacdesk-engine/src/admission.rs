//! Per-user and global job admission.
//!
//! Two gates, checked in order: a user may have at most one job in
//! flight, and the whole engine may run at most `max_concurrent_jobs`.
//! Admission hands out an RAII permit; dropping it releases both gates,
//! so a panicking job path cannot leak a slot.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use vacdesk_core::UserId;

use crate::error::{EngineError, Result};

/// Tracks running jobs and enforces both admission gates.
#[derive(Clone)]
pub struct AdmissionController {
    running: Arc<Mutex<HashSet<UserId>>>,
    slots: Arc<Semaphore>,
}

impl AdmissionController {
    /// Create a controller with `max_concurrent_jobs` global slots.
    #[must_use]
    pub fn new(max_concurrent_jobs: usize) -> Self {
        Self {
            running: Arc::new(Mutex::new(HashSet::new())),
            slots: Arc::new(Semaphore::new(max_concurrent_jobs)),
        }
    }

    /// Try to admit a job for `user_id`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UserBusy`] when the user already has a job running,
    /// [`EngineError::AtCapacity`] when all global slots are taken. In
    /// both cases nothing is held afterwards.
    pub fn admit(&self, user_id: UserId) -> Result<AdmissionPermit> {
        // User gate first so a busy user cannot burn a global slot.
        {
            let mut running = self.running.lock().map_err(|_| EngineError::AtCapacity)?;
            if !running.insert(user_id) {
                return Err(EngineError::UserBusy);
            }
        }

        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => {
                tracing::debug!(user_id = %user_id, "job admitted");
                Ok(AdmissionPermit {
                    controller: self.clone(),
                    user_id,
                    slot: Some(permit),
                    released: false,
                })
            }
            Err(_) => {
                self.release_user(user_id);
                Err(EngineError::AtCapacity)
            }
        }
    }

    /// Whether `user_id` currently holds a permit.
    #[must_use]
    pub fn is_busy(&self, user_id: UserId) -> bool {
        self.running
            .lock()
            .map(|r| r.contains(&user_id))
            .unwrap_or(false)
    }

    /// Free global slots right now.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    fn release_user(&self, user_id: UserId) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&user_id);
        }
    }
}

/// Proof that a job was admitted. Dropping it releases both gates.
pub struct AdmissionPermit {
    controller: AdmissionController,
    user_id: UserId,
    slot: Option<OwnedSemaphorePermit>,
    released: bool,
}

impl AdmissionPermit {
    /// The admitted user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Release early. Idempotent; dropping after this is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.slot.take();
        self.controller.release_user(self.user_id);
        tracing::debug!(user_id = %self.user_id, "job slot released");
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_job_per_user() {
        let controller = AdmissionController::new(4);
        let user = UserId::new(1);

        let permit = controller.admit(user).unwrap();
        assert!(controller.is_busy(user));
        assert!(matches!(controller.admit(user), Err(EngineError::UserBusy)));

        drop(permit);
        assert!(!controller.is_busy(user));
        assert!(controller.admit(user).is_ok());
    }

    #[test]
    fn global_cap_is_enforced() {
        let controller = AdmissionController::new(2);

        let _a = controller.admit(UserId::new(1)).unwrap();
        let _b = controller.admit(UserId::new(2)).unwrap();
        assert_eq!(controller.available_slots(), 0);

        let denied = controller.admit(UserId::new(3));
        assert!(matches!(denied, Err(EngineError::AtCapacity)));
        // The denied user must not be left marked busy.
        assert!(!controller.is_busy(UserId::new(3)));
    }

    #[test]
    fn release_is_idempotent() {
        let controller = AdmissionController::new(1);
        let user = UserId::new(4);

        let mut permit = controller.admit(user).unwrap();
        permit.release();
        permit.release();
        assert_eq!(controller.available_slots(), 1);
        drop(permit);
        assert_eq!(controller.available_slots(), 1);
        assert!(!controller.is_busy(user));
    }

    #[test]
    fn freed_slot_admits_the_next_job() {
        let controller = AdmissionController::new(1);

        let permit = controller.admit(UserId::new(5)).unwrap();
        assert!(matches!(
            controller.admit(UserId::new(6)),
            Err(EngineError::AtCapacity)
        ));

        drop(permit);
        assert!(controller.admit(UserId::new(6)).is_ok());
    }
}
