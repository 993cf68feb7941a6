//! Typed application notifications
//!
//! The application emits one notification per meaningful state transition.
//! Each channel has a fixed payload shape, so a listener addresses payload
//! fields through [`PayloadField`] rather than string keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Named notification stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    WorldSelected,
    CampaignSelected,
    PlanningModeEntered,
    SubTabChanged,
    ModalOpened,
    ModalClosed,
    EntityCreated,
    EntitySelected,
    RoleAssigned,
    RoleRevoked,
    UserDeleted,
    ErrorOccurred,
    ErrorCleared,
}

impl Channel {
    pub const ALL: [Channel; 13] = [
        Channel::WorldSelected,
        Channel::CampaignSelected,
        Channel::PlanningModeEntered,
        Channel::SubTabChanged,
        Channel::ModalOpened,
        Channel::ModalClosed,
        Channel::EntityCreated,
        Channel::EntitySelected,
        Channel::RoleAssigned,
        Channel::RoleRevoked,
        Channel::UserDeleted,
        Channel::ErrorOccurred,
        Channel::ErrorCleared,
    ];

    /// Wire name of the channel
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::WorldSelected => "world-selected",
            Channel::CampaignSelected => "campaign-selected",
            Channel::PlanningModeEntered => "planning-mode-entered",
            Channel::SubTabChanged => "sub-tab-changed",
            Channel::ModalOpened => "modal-opened",
            Channel::ModalClosed => "modal-closed",
            Channel::EntityCreated => "entity-created",
            Channel::EntitySelected => "entity-selected",
            Channel::RoleAssigned => "role-assigned",
            Channel::RoleRevoked => "role-revoked",
            Channel::UserDeleted => "user-deleted",
            Channel::ErrorOccurred => "error-occurred",
            Channel::ErrorCleared => "error-cleared",
        }
    }

    /// Fields carried by this channel's payload
    pub fn fields(&self) -> &'static [PayloadField] {
        use PayloadField::*;
        match self {
            Channel::WorldSelected | Channel::PlanningModeEntered => &[WorldName],
            Channel::CampaignSelected => &[CampaignName, WorldName],
            Channel::SubTabChanged => &[Tab],
            Channel::ModalOpened | Channel::ModalClosed => &[Modal],
            Channel::EntityCreated => &[EntityType, Name],
            Channel::EntitySelected => &[Name],
            Channel::RoleAssigned | Channel::RoleRevoked => &[User, Role],
            Channel::UserDeleted => &[User],
            Channel::ErrorOccurred | Channel::ErrorCleared => &[Message],
        }
    }

    pub fn carries(&self, field: PayloadField) -> bool {
        self.fields().contains(&field)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifying field of a notification payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadField {
    Name,
    WorldName,
    CampaignName,
    Tab,
    Modal,
    EntityType,
    User,
    Role,
    Message,
}

impl fmt::Display for PayloadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadField::Name => "name",
            PayloadField::WorldName => "world_name",
            PayloadField::CampaignName => "campaign_name",
            PayloadField::Tab => "tab",
            PayloadField::Modal => "modal",
            PayloadField::EntityType => "entity_type",
            PayloadField::User => "user",
            PayloadField::Role => "role",
            PayloadField::Message => "message",
        };
        f.write_str(name)
    }
}

/// A notification as dispatched by the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "kebab-case")]
pub enum Notification {
    WorldSelected {
        world_name: String,
    },
    CampaignSelected {
        campaign_name: String,
        #[serde(default)]
        world_name: Option<String>,
    },
    PlanningModeEntered {
        world_name: String,
    },
    SubTabChanged {
        tab: String,
    },
    ModalOpened {
        modal: String,
    },
    ModalClosed {
        modal: String,
    },
    EntityCreated {
        entity_type: String,
        name: String,
    },
    EntitySelected {
        name: String,
    },
    RoleAssigned {
        user: String,
        role: String,
    },
    RoleRevoked {
        user: String,
        role: String,
    },
    UserDeleted {
        user: String,
    },
    ErrorOccurred {
        message: String,
    },
    ErrorCleared {
        #[serde(default)]
        message: Option<String>,
    },
}

impl Notification {
    /// Channel this notification is dispatched on
    pub fn channel(&self) -> Channel {
        match self {
            Notification::WorldSelected { .. } => Channel::WorldSelected,
            Notification::CampaignSelected { .. } => Channel::CampaignSelected,
            Notification::PlanningModeEntered { .. } => Channel::PlanningModeEntered,
            Notification::SubTabChanged { .. } => Channel::SubTabChanged,
            Notification::ModalOpened { .. } => Channel::ModalOpened,
            Notification::ModalClosed { .. } => Channel::ModalClosed,
            Notification::EntityCreated { .. } => Channel::EntityCreated,
            Notification::EntitySelected { .. } => Channel::EntitySelected,
            Notification::RoleAssigned { .. } => Channel::RoleAssigned,
            Notification::RoleRevoked { .. } => Channel::RoleRevoked,
            Notification::UserDeleted { .. } => Channel::UserDeleted,
            Notification::ErrorOccurred { .. } => Channel::ErrorOccurred,
            Notification::ErrorCleared { .. } => Channel::ErrorCleared,
        }
    }

    /// Read an identifying field; `None` when the payload lacks it
    pub fn field(&self, field: PayloadField) -> Option<&str> {
        use PayloadField as F;
        match (self, field) {
            (Notification::WorldSelected { world_name }, F::WorldName)
            | (Notification::PlanningModeEntered { world_name }, F::WorldName) => {
                Some(world_name)
            }
            (Notification::CampaignSelected { campaign_name, .. }, F::CampaignName) => {
                Some(campaign_name)
            }
            (Notification::CampaignSelected { world_name, .. }, F::WorldName) => {
                world_name.as_deref()
            }
            (Notification::SubTabChanged { tab }, F::Tab) => Some(tab),
            (Notification::ModalOpened { modal }, F::Modal)
            | (Notification::ModalClosed { modal }, F::Modal) => Some(modal),
            (Notification::EntityCreated { entity_type, .. }, F::EntityType) => Some(entity_type),
            (Notification::EntityCreated { name, .. }, F::Name)
            | (Notification::EntitySelected { name }, F::Name) => Some(name),
            (Notification::RoleAssigned { user, .. }, F::User)
            | (Notification::RoleRevoked { user, .. }, F::User)
            | (Notification::UserDeleted { user }, F::User) => Some(user),
            (Notification::RoleAssigned { role, .. }, F::Role)
            | (Notification::RoleRevoked { role, .. }, F::Role) => Some(role),
            (Notification::ErrorOccurred { message }, F::Message) => Some(message),
            (Notification::ErrorCleared { message }, F::Message) => message.as_deref(),
            _ => None,
        }
    }

    /// Shorthand for the entity-selected notification
    pub fn entity_selected(name: impl Into<String>) -> Self {
        Notification::EntitySelected { name: name.into() }
    }
}
