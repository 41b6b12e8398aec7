pub mod gateway;
pub mod token;

use uuid::Uuid;

use crate::models::Role;

/// One named permission flag on a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ability {
    ApiAttachment,
    Upload,
    Download,
    DeleteAttachments,
}

/// A role's ability flags, resolved against one application.
#[derive(Debug, Clone)]
pub struct RoleGrant {
    pub application_id: Uuid,
    pub api_attachment: bool,
    pub has_upload: bool,
    pub has_download: bool,
    pub has_delete_attachments: bool,
}

impl RoleGrant {
    pub fn allows(&self, ability: Ability) -> bool {
        match ability {
            Ability::ApiAttachment => self.api_attachment,
            Ability::Upload => self.has_upload,
            Ability::Download => self.has_download,
            Ability::DeleteAttachments => self.has_delete_attachments,
        }
    }
}

impl From<Role> for RoleGrant {
    fn from(role: Role) -> Self {
        Self {
            application_id: role.application_id,
            api_attachment: role.api_attachment,
            has_upload: role.has_upload,
            has_download: role.has_download,
            has_delete_attachments: role.has_delete_attachments,
        }
    }
}

/// The authenticated identity plus its resolved capability set for one
/// request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub company_id: Uuid,
    pub is_admin: bool,
    pub is_root: bool,
    pub grants: Vec<RoleGrant>,
}
