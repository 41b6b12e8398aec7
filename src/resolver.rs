use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::directory::Directory;
use crate::error::{EngineError, EngineResult};
use crate::models::Schedule;
use crate::registry::validate_key;

/// Keeps key references between independently edited entities consistent.
/// Renaming or deleting a schedule and rewriting every environment that
/// references it happens under one directory write lock, so readers observe
/// either the fully-old or the fully-new state.
pub struct KeyReferenceResolver {
    directory: Arc<Directory>,
}

impl KeyReferenceResolver {
    pub fn new(directory: Arc<Directory>) -> Self {
        Self { directory }
    }

    pub fn rename_schedule(&self, schedule_id: Uuid, new_key: &str) -> EngineResult<Schedule> {
        validate_key(new_key)?;
        let mut inner = self.directory.write_inner();

        let (application_id, old_key) = match inner.schedules.get(&schedule_id) {
            Some(schedule) => (schedule.application_id, schedule.key.clone()),
            None => return Err(EngineError::ScheduleNotFound),
        };
        if old_key == new_key {
            return Ok(inner.schedules[&schedule_id].clone());
        }
        let taken = inner
            .schedules
            .values()
            .any(|s| s.application_id == application_id && s.key == new_key);
        if taken {
            return Err(EngineError::Validation("Key has already been taken".to_string()));
        }

        let schedule = inner
            .schedules
            .get_mut(&schedule_id)
            .ok_or(EngineError::ScheduleNotFound)?;
        schedule.key = new_key.to_string();
        let renamed = schedule.clone();

        let mut rewritten = 0usize;
        for environment in inner
            .environments
            .values_mut()
            .filter(|e| e.application_id == application_id)
        {
            if let Some(config) = environment.schedule_list.remove(&old_key) {
                environment.schedule_list.insert(new_key.to_string(), config);
                rewritten += 1;
            }
        }

        let stale = inner
            .environments
            .values()
            .filter(|e| e.application_id == application_id)
            .any(|e| e.schedule_list.contains_key(&old_key));
        if stale {
            error!(old_key = %old_key, new_key = %new_key, "schedule rename left a stale reference");
            return Err(EngineError::Integrity(
                "schedule rename left a stale reference".to_string(),
            ));
        }

        info!(old_key = %old_key, new_key = %new_key, rewritten, "renamed schedule key");
        Ok(renamed)
    }

    pub fn delete_schedule(&self, schedule_id: Uuid) -> EngineResult<()> {
        let mut inner = self.directory.write_inner();

        let schedule = inner
            .schedules
            .remove(&schedule_id)
            .ok_or(EngineError::ScheduleNotFound)?;

        let mut removed = 0usize;
        for environment in inner
            .environments
            .values_mut()
            .filter(|e| e.application_id == schedule.application_id)
        {
            if environment.schedule_list.remove(&schedule.key).is_some() {
                removed += 1;
            }
        }

        let stale = inner
            .environments
            .values()
            .filter(|e| e.application_id == schedule.application_id)
            .any(|e| e.schedule_list.contains_key(&schedule.key));
        if stale {
            error!(key = %schedule.key, "schedule delete left a stale reference");
            return Err(EngineError::Integrity(
                "schedule delete left a stale reference".to_string(),
            ));
        }

        info!(key = %schedule.key, removed, "deleted schedule");
        Ok(())
    }
}
