//! Signup record and sharing data models.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

use super::input::{is_contact, normalize_digits};

/// Canonical storage format for dates of birth.
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Adult roles offered on the role-selection step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdultRole {
    Parent,
    SchoolConsultant,
    Therapist,
    OrganizationMember,
}

impl std::fmt::Display for AdultRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Parent => "parent",
            Self::SchoolConsultant => "school_consultant",
            Self::Therapist => "therapist",
            Self::OrganizationMember => "organization_member",
        };
        write!(f, "{s}")
    }
}

/// Role selections plus the institution codes some roles need.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdultRoles {
    pub selected: BTreeMap<AdultRole, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_code: Option<String>,
}

impl AdultRoles {
    /// Whether `role` is ticked.
    pub fn is_selected(&self, role: AdultRole) -> bool {
        self.selected.get(&role).copied().unwrap_or(false)
    }

    /// Builder: tick or untick a role.
    pub fn with_role(mut self, role: AdultRole, selected: bool) -> Self {
        self.selected.insert(role, selected);
        self
    }
}

/// Data categories a sharing connection can be granted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharingPermissions {
    pub basic_information: bool,
    pub daily_quiz_results: bool,
    pub biometric_reports: bool,
    pub test_results: bool,
    pub synced_information: bool,
    pub others_notes: bool,
}

impl SharingPermissions {
    /// Whether at least one category is granted.
    pub fn any(&self) -> bool {
        self.basic_information
            || self.daily_quiz_results
            || self.biometric_reports
            || self.test_results
            || self.synced_information
            || self.others_notes
    }
}

/// Opaque, creation-time-ordered identifier of a sharing connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharingConnectionId(Uuid);

impl SharingConnectionId {
    fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl From<Uuid> for SharingConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SharingConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A consented data-sharing relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingConnection {
    pub id: SharingConnectionId,
    pub contact: String,
    pub permissions: SharingPermissions,
}

impl SharingConnection {
    /// Create a connection, rejecting an unusable contact or an empty
    /// permission set.
    pub fn new(
        contact: impl Into<String>,
        permissions: SharingPermissions,
    ) -> Result<Self, ValidationError> {
        let contact = normalize_digits(contact.into().trim());
        if !is_contact(&contact) {
            return Err(ValidationError::InvalidContact(contact));
        }
        if !permissions.any() {
            return Err(ValidationError::NoPermissions);
        }
        Ok(Self {
            id: SharingConnectionId::generate(),
            contact,
            permissions,
        })
    }
}

/// The accumulating signup record.
///
/// Persisted as JSON under the `signup_form_data` settings key. Every field
/// defaults so that older or partial blobs still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignupRecord {
    pub terms_accepted: bool,
    pub communications_accepted: bool,
    pub marketing_accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Email address or phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// Gregorian `yyyy-MM-dd`, whatever calendar the user typed it in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    /// `None` until the branch is resolved on leaving verification.
    pub is_youth: Option<bool>,
    pub roles: AdultRoles,
    pub sharing: Vec<SharingConnection>,
}

impl SignupRecord {
    /// Parsed date of birth, if one is stored and well-formed.
    pub fn birth_date(&self) -> Option<NaiveDate> {
        self.date_of_birth
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s, ISO_DATE_FORMAT).ok())
    }

    /// Look up a sharing connection by id.
    pub fn connection(&self, id: SharingConnectionId) -> Option<&SharingConnection> {
        self.sharing.iter().find(|c| c.id == id)
    }
}

/// A partial update to a [`SignupRecord`].
///
/// Set fields overwrite, unset fields are kept. `is_youth` is doubly
/// optional so a patch can explicitly reset the branch to undetermined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignupPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communications_accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marketing_accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    #[serde(
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_youth: Option<Option<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<AdultRoles>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharing: Option<Vec<SharingConnection>>,
}

impl SignupPatch {
    /// Whether applying this patch would leave any record untouched.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Shallow-merge into `record`.
    pub fn apply_to(self, record: &mut SignupRecord) {
        if let Some(v) = self.terms_accepted {
            record.terms_accepted = v;
        }
        if let Some(v) = self.communications_accepted {
            record.communications_accepted = v;
        }
        if let Some(v) = self.marketing_accepted {
            record.marketing_accepted = v;
        }
        if let Some(v) = self.name {
            record.name = Some(v);
        }
        if let Some(v) = self.contact {
            record.contact = Some(v);
        }
        if let Some(v) = self.date_of_birth {
            record.date_of_birth = Some(v);
        }
        if let Some(v) = self.password {
            record.password = Some(v);
        }
        if let Some(v) = self.verification_code {
            record.verification_code = Some(v);
        }
        if let Some(v) = self.is_youth {
            record.is_youth = v;
        }
        if let Some(v) = self.roles {
            record.roles = v;
        }
        if let Some(v) = self.sharing {
            record.sharing = v;
        }
    }

    /// Builder: set the branch flag.
    pub fn with_is_youth(mut self, is_youth: Option<bool>) -> Self {
        self.is_youth = Some(is_youth);
        self
    }
}

/// Settings keys used for signup persistence.
pub mod settings_keys {
    /// Key for the in-progress SignupRecord JSON blob.
    pub const SIGNUP_FORM_DATA: &str = "signup_form_data";
    /// Key for the identity handed over when signup finishes.
    pub const SESSION: &str = "session";
}

/// Distinguishes an explicit `null` from an absent key.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}
