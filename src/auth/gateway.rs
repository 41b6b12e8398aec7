use std::sync::Arc;

use tracing::debug;

use crate::auth::{token, Ability, Principal};
use crate::directory::Directory;
use crate::error::{EngineError, EngineResult};
use crate::models::Application;

/// Single decision point for every gated operation: resolves a bearer
/// credential to a principal and answers ability questions. Callers surface
/// failures uniformly so the reason never leaks.
pub struct AuthGateway {
    directory: Arc<Directory>,
}

impl AuthGateway {
    pub fn new(directory: Arc<Directory>) -> Self {
        Self { directory }
    }

    pub fn authenticate(&self, raw_token: &str) -> EngineResult<Principal> {
        let (email, secret) = token::parse(raw_token)?;
        let user = self
            .directory
            .user_by_email(&email)
            .ok_or(EngineError::UserNotFound)?;
        if user.authentication_token != secret {
            debug!(email = %email, "api token mismatch");
            return Err(EngineError::InvalidToken);
        }
        let grants = self
            .directory
            .user_roles(user.id)
            .into_iter()
            .map(Into::into)
            .collect();
        Ok(Principal {
            user_id: user.id,
            email: user.email,
            company_id: user.company_id,
            is_admin: user.is_admin,
            is_root: user.is_root,
            grants,
        })
    }

    pub fn authorize(
        &self,
        principal: &Principal,
        application: &Application,
        ability: Ability,
    ) -> bool {
        if principal.is_root {
            return true;
        }
        if principal.is_admin && application.company_id == principal.company_id {
            return true;
        }
        principal
            .grants
            .iter()
            .any(|grant| grant.application_id == application.id && grant.allows(ability))
    }

    /// All-or-nothing check used by the API layer; any missing ability
    /// yields the one uniform denial.
    pub fn require(
        &self,
        principal: &Principal,
        application: &Application,
        abilities: &[Ability],
    ) -> EngineResult<()> {
        for ability in abilities {
            if !self.authorize(principal, application, *ability) {
                debug!(email = %principal.email, ability = ?ability, "ability denied");
                return Err(EngineError::Unauthorized);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewApplication, NewRole, NewUser};

    struct Fixture {
        directory: Arc<Directory>,
        gateway: AuthGateway,
        application: Application,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(Directory::new());
        let company = directory.create_company("Acme", "acme").unwrap();
        let application = directory
            .create_application(NewApplication {
                company_id: company.id,
                name: "App One".to_string(),
                key: "app1".to_string(),
                description: None,
                default_queue: None,
                audit_trail: false,
            })
            .unwrap();
        let gateway = AuthGateway::new(directory.clone());
        Fixture {
            directory,
            gateway,
            application,
        }
    }

    fn user(fixture: &Fixture, email: &str, is_admin: bool, is_root: bool) -> Principal {
        let user = fixture
            .directory
            .create_user(NewUser {
                company_id: fixture.application.company_id,
                email: email.to_string(),
                name: "Someone".to_string(),
                is_admin,
                is_root,
            })
            .unwrap();
        let raw = token::compose(&user.email, &user.authentication_token);
        fixture.gateway.authenticate(&raw).unwrap()
    }

    #[test]
    fn root_bypasses_every_check() {
        let fixture = fixture();
        let principal = user(&fixture, "root@acme.test", false, true);
        for ability in [
            Ability::ApiAttachment,
            Ability::Upload,
            Ability::Download,
            Ability::DeleteAttachments,
        ] {
            assert!(fixture.gateway.authorize(&principal, &fixture.application, ability));
        }
    }

    #[test]
    fn admin_is_scoped_to_their_company() {
        let fixture = fixture();
        let principal = user(&fixture, "admin@acme.test", true, false);
        assert!(fixture
            .gateway
            .authorize(&principal, &fixture.application, Ability::Upload));

        let other_company = fixture.directory.create_company("Rival", "rival").unwrap();
        let foreign = fixture
            .directory
            .create_application(NewApplication {
                company_id: other_company.id,
                name: "Foreign".to_string(),
                key: "foreign".to_string(),
                description: None,
                default_queue: None,
                audit_trail: false,
            })
            .unwrap();
        assert!(!fixture.gateway.authorize(&principal, &foreign, Ability::Upload));
    }

    #[test]
    fn plain_users_need_a_matching_role_ability() {
        let fixture = fixture();
        let user_row = fixture
            .directory
            .create_user(NewUser {
                company_id: fixture.application.company_id,
                email: "user@acme.test".to_string(),
                name: "User".to_string(),
                is_admin: false,
                is_root: false,
            })
            .unwrap();
        let role = fixture
            .directory
            .create_role(NewRole {
                application_id: fixture.application.id,
                name: "Uploader".to_string(),
                api_attachment: true,
                has_upload: true,
                has_download: false,
                has_delete_attachments: false,
            })
            .unwrap();
        fixture.directory.grant_role(user_row.id, role.id).unwrap();

        let raw = token::compose(&user_row.email, &user_row.authentication_token);
        let principal = fixture.gateway.authenticate(&raw).unwrap();
        assert!(fixture
            .gateway
            .authorize(&principal, &fixture.application, Ability::Upload));
        assert!(!fixture
            .gateway
            .authorize(&principal, &fixture.application, Ability::Download));
    }

    #[test]
    fn wrong_secret_and_unknown_user_both_read_as_invalid_token() {
        let fixture = fixture();
        let user_row = fixture
            .directory
            .create_user(NewUser {
                company_id: fixture.application.company_id,
                email: "user@acme.test".to_string(),
                name: "User".to_string(),
                is_admin: false,
                is_root: false,
            })
            .unwrap();

        let wrong_secret = token::compose(&user_row.email, "wrong");
        let unknown_user = token::compose("ghost@acme.test", "whatever");
        assert_eq!(
            fixture.gateway.authenticate(&wrong_secret).unwrap_err().to_string(),
            "Invalid auth-token"
        );
        assert_eq!(
            fixture.gateway.authenticate(&unknown_user).unwrap_err().to_string(),
            "Invalid auth-token"
        );
    }
}
