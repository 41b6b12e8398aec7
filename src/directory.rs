use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    Application, Company, Environment, NewApplication, NewRole, NewUser, Role, Schedule, User,
};
use crate::registry::{validate_key, validate_name};

const AUTH_TOKEN_LEN: usize = 20;

/// In-memory tenant directory. A single lock covers every entity kind so
/// cross-entity cascades (schedule rename/delete rewriting environments)
/// commit atomically with respect to readers.
pub struct Directory {
    inner: RwLock<DirectoryInner>,
}

#[derive(Default)]
pub(crate) struct DirectoryInner {
    pub(crate) companies: HashMap<Uuid, Company>,
    pub(crate) applications: HashMap<Uuid, Application>,
    pub(crate) users: HashMap<Uuid, User>,
    pub(crate) roles: HashMap<Uuid, Role>,
    pub(crate) user_roles: HashMap<Uuid, Vec<Uuid>>,
    pub(crate) schedules: HashMap<Uuid, Schedule>,
    pub(crate) environments: HashMap<Uuid, Environment>,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(DirectoryInner::default()),
        }
    }

    pub(crate) fn read_inner(&self) -> RwLockReadGuard<'_, DirectoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_inner(&self) -> RwLockWriteGuard<'_, DirectoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_company(&self, name: &str, key: &str) -> EngineResult<Company> {
        validate_name(name)?;
        validate_key(key)?;
        let mut inner = self.write_inner();
        if inner.companies.values().any(|c| c.key == key) {
            return Err(EngineError::Validation("Key has already been taken".to_string()));
        }
        let company = Company {
            id: Uuid::new_v4(),
            name: name.to_string(),
            key: key.to_string(),
            created_at: Utc::now(),
        };
        inner.companies.insert(company.id, company.clone());
        info!(company = %company.key, "created company");
        Ok(company)
    }

    pub fn create_application(&self, new: NewApplication) -> EngineResult<Application> {
        validate_name(&new.name)?;
        validate_key(&new.key)?;
        let mut inner = self.write_inner();
        if !inner.companies.contains_key(&new.company_id) {
            return Err(EngineError::Validation("Company does not exist".to_string()));
        }
        let duplicate = inner
            .applications
            .values()
            .any(|a| a.company_id == new.company_id && a.key == new.key);
        if duplicate {
            return Err(EngineError::Validation("Key has already been taken".to_string()));
        }
        let application = Application {
            id: Uuid::new_v4(),
            company_id: new.company_id,
            name: new.name,
            key: new.key,
            description: new.description,
            default_queue: new.default_queue,
            audit_trail: new.audit_trail,
            created_at: Utc::now(),
        };
        inner.applications.insert(application.id, application.clone());
        info!(application = %application.key, "created application");
        Ok(application)
    }

    /// Mints the long-lived api token used by non-interactive callers.
    pub fn create_user(&self, new: NewUser) -> EngineResult<User> {
        validate_name(&new.name)?;
        if new.email.trim().is_empty() {
            return Err(EngineError::Validation("Email can't be blank".to_string()));
        }
        let mut inner = self.write_inner();
        if !inner.companies.contains_key(&new.company_id) {
            return Err(EngineError::Validation("Company does not exist".to_string()));
        }
        if inner.users.values().any(|u| u.email == new.email) {
            return Err(EngineError::Validation("Email has already been taken".to_string()));
        }
        let authentication_token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(AUTH_TOKEN_LEN)
            .map(char::from)
            .collect();
        let user = User {
            id: Uuid::new_v4(),
            company_id: new.company_id,
            email: new.email,
            name: new.name,
            authentication_token,
            is_admin: new.is_admin,
            is_root: new.is_root,
            created_at: Utc::now(),
        };
        inner.users.insert(user.id, user.clone());
        info!(email = %user.email, "created user");
        Ok(user)
    }

    pub fn create_role(&self, new: NewRole) -> EngineResult<Role> {
        validate_name(&new.name)?;
        let mut inner = self.write_inner();
        if !inner.applications.contains_key(&new.application_id) {
            return Err(EngineError::Validation("Application does not exist".to_string()));
        }
        let role = Role {
            id: Uuid::new_v4(),
            application_id: new.application_id,
            name: new.name,
            api_attachment: new.api_attachment,
            has_upload: new.has_upload,
            has_download: new.has_download,
            has_delete_attachments: new.has_delete_attachments,
        };
        inner.roles.insert(role.id, role.clone());
        Ok(role)
    }

    pub fn grant_role(&self, user_id: Uuid, role_id: Uuid) -> EngineResult<()> {
        let mut inner = self.write_inner();
        if !inner.users.contains_key(&user_id) {
            return Err(EngineError::Validation("User does not exist".to_string()));
        }
        if !inner.roles.contains_key(&role_id) {
            return Err(EngineError::Validation("Role does not exist".to_string()));
        }
        let grants = inner.user_roles.entry(user_id).or_default();
        if !grants.contains(&role_id) {
            grants.push(role_id);
        }
        Ok(())
    }

    pub fn create_schedule(
        &self,
        application_id: Uuid,
        name: &str,
        key: &str,
    ) -> EngineResult<Schedule> {
        validate_name(name)?;
        validate_key(key)?;
        let mut inner = self.write_inner();
        if !inner.applications.contains_key(&application_id) {
            return Err(EngineError::Validation("Application does not exist".to_string()));
        }
        let duplicate = inner
            .schedules
            .values()
            .any(|s| s.application_id == application_id && s.key == key);
        if duplicate {
            return Err(EngineError::Validation("Key has already been taken".to_string()));
        }
        let schedule = Schedule {
            id: Uuid::new_v4(),
            application_id,
            name: name.to_string(),
            key: key.to_string(),
            created_at: Utc::now(),
        };
        inner.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    /// Every key in `schedule_list` must resolve to a schedule of the same
    /// application.
    pub fn create_environment(
        &self,
        application_id: Uuid,
        name: &str,
        schedule_list: HashMap<String, serde_json::Value>,
    ) -> EngineResult<Environment> {
        validate_name(name)?;
        let mut inner = self.write_inner();
        if !inner.applications.contains_key(&application_id) {
            return Err(EngineError::Validation("Application does not exist".to_string()));
        }
        for key in schedule_list.keys() {
            let resolves = inner
                .schedules
                .values()
                .any(|s| s.application_id == application_id && &s.key == key);
            if !resolves {
                return Err(EngineError::ScheduleNotFound);
            }
        }
        let environment = Environment {
            id: Uuid::new_v4(),
            application_id,
            name: name.to_string(),
            schedule_list,
            created_at: Utc::now(),
        };
        inner.environments.insert(environment.id, environment.clone());
        Ok(environment)
    }

    /// Application keys are referenced by value at record-write time, so a
    /// rename needs no data migration: existing records keep the key they
    /// were stamped with and stay reachable by id.
    pub fn rename_application_key(
        &self,
        application_id: Uuid,
        new_key: &str,
    ) -> EngineResult<Application> {
        validate_key(new_key)?;
        let mut inner = self.write_inner();
        let company_id = match inner.applications.get(&application_id) {
            Some(application) => application.company_id,
            None => return Err(EngineError::Validation("Application does not exist".to_string())),
        };
        let taken = inner
            .applications
            .values()
            .any(|a| a.company_id == company_id && a.id != application_id && a.key == new_key);
        if taken {
            return Err(EngineError::Validation("Key has already been taken".to_string()));
        }
        let application = inner
            .applications
            .get_mut(&application_id)
            .ok_or_else(|| EngineError::Validation("Application does not exist".to_string()))?;
        application.key = new_key.to_string();
        Ok(application.clone())
    }

    pub fn company(&self, id: Uuid) -> Option<Company> {
        self.read_inner().companies.get(&id).cloned()
    }

    pub fn company_by_key(&self, key: &str) -> Option<Company> {
        self.read_inner()
            .companies
            .values()
            .find(|c| c.key == key)
            .cloned()
    }

    pub fn application(&self, id: Uuid) -> Option<Application> {
        self.read_inner().applications.get(&id).cloned()
    }

    pub fn application_by_key(&self, company_id: Uuid, key: &str) -> Option<Application> {
        self.read_inner()
            .applications
            .values()
            .find(|a| a.company_id == company_id && a.key == key)
            .cloned()
    }

    pub fn user_by_email(&self, email: &str) -> Option<User> {
        self.read_inner()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
    }

    pub fn user_roles(&self, user_id: Uuid) -> Vec<Role> {
        let inner = self.read_inner();
        inner
            .user_roles
            .get(&user_id)
            .map(|role_ids| {
                role_ids
                    .iter()
                    .filter_map(|id| inner.roles.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn schedule(&self, id: Uuid) -> Option<Schedule> {
        self.read_inner().schedules.get(&id).cloned()
    }

    pub fn environment(&self, id: Uuid) -> Option<Environment> {
        self.read_inner().environments.get(&id).cloned()
    }

    pub fn environments_for(&self, application_id: Uuid) -> Vec<Environment> {
        self.read_inner()
            .environments
            .values()
            .filter(|e| e.application_id == application_id)
            .cloned()
            .collect()
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}
