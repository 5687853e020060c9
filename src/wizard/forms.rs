//! Per-step forms and their validation rules.
//!
//! Each step that takes input has a form type implementing [`StepForm`].
//! Validation produces stable error codes; the localization layer turns
//! them into user-facing text.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::WizardRules;

use super::calendar::{Calendar, parse_date};
use super::input::{is_contact, normalize_digits};
use super::model::{AdultRole, AdultRoles, ISO_DATE_FORMAT, SignupPatch};
use super::sequencer::StepKind;

/// Inputs a validator needs besides the form itself.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    pub today: NaiveDate,
    pub rules: WizardRules,
}

/// A single failed field rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub code: &'static str,
}

/// Outcome of validating one form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub errors: Vec<FieldError>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    fn fail(&mut self, field: &'static str, code: &'static str) {
        self.errors.push(FieldError { field, code });
    }
}

/// Validation capability implemented by every input-bearing step.
pub trait StepForm {
    /// The step this form belongs to.
    fn step(&self) -> StepKind;

    fn validate(&self, ctx: &ValidationContext) -> Validation;

    /// The record fields this form contributes. Fields that do not reach
    /// canonical form are left out.
    fn to_patch(&self) -> SignupPatch;
}

/// Consent checkboxes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermsForm {
    pub terms_accepted: bool,
    pub communications_accepted: bool,
    pub marketing_accepted: bool,
}

impl StepForm for TermsForm {
    fn step(&self) -> StepKind {
        StepKind::Terms
    }

    fn validate(&self, _ctx: &ValidationContext) -> Validation {
        let mut v = Validation::default();
        if !self.terms_accepted {
            v.fail("terms_accepted", "terms.required");
        }
        v
    }

    fn to_patch(&self) -> SignupPatch {
        SignupPatch {
            terms_accepted: Some(self.terms_accepted),
            communications_accepted: Some(self.communications_accepted),
            marketing_accepted: Some(self.marketing_accepted),
            ..Default::default()
        }
    }
}

/// Identity and credential fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfoForm {
    pub name: String,
    pub contact: String,
    pub date_of_birth: String,
    /// Calendar the date of birth was typed in.
    pub calendar: Calendar,
    pub password: String,
    pub password_confirmation: String,
}

impl UserInfoForm {
    fn birth_date(&self) -> Option<NaiveDate> {
        parse_date(&self.date_of_birth, self.calendar)
    }

    fn normalized_contact(&self) -> String {
        normalize_digits(self.contact.trim())
    }
}

impl StepForm for UserInfoForm {
    fn step(&self) -> StepKind {
        StepKind::UserInfo
    }

    fn validate(&self, ctx: &ValidationContext) -> Validation {
        let mut v = Validation::default();
        if self.name.trim().is_empty() {
            v.fail("name", "name.required");
        }
        if !is_contact(&self.normalized_contact()) {
            v.fail("contact", "contact.invalid");
        }
        match self.birth_date() {
            None => v.fail("date_of_birth", "date_of_birth.invalid"),
            Some(d) if d > ctx.today => v.fail("date_of_birth", "date_of_birth.future"),
            Some(_) => {}
        }
        if self.password.chars().count() < ctx.rules.min_password_len {
            v.fail("password", "password.too_short");
        }
        if self.password_confirmation != self.password {
            v.fail("password_confirmation", "password_confirmation.mismatch");
        }
        v
    }

    fn to_patch(&self) -> SignupPatch {
        SignupPatch {
            name: Some(self.name.trim().to_string()),
            contact: Some(self.normalized_contact()),
            date_of_birth: self
                .birth_date()
                .map(|d| d.format(ISO_DATE_FORMAT).to_string()),
            password: Some(self.password.clone()),
            ..Default::default()
        }
    }
}

/// One-time code typed or pasted by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationForm {
    pub code: String,
}

impl VerificationForm {
    fn normalized_code(&self) -> String {
        normalize_digits(self.code.trim())
    }
}

impl StepForm for VerificationForm {
    fn step(&self) -> StepKind {
        StepKind::Verification
    }

    fn validate(&self, ctx: &ValidationContext) -> Validation {
        let mut v = Validation::default();
        if self.normalized_code().chars().count() != ctx.rules.code_len {
            v.fail("code", "verification_code.length");
        }
        v
    }

    fn to_patch(&self) -> SignupPatch {
        SignupPatch {
            verification_code: Some(self.normalized_code()),
            ..Default::default()
        }
    }
}

/// Adult role checkboxes with their institution codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdultRoleForm {
    pub roles: AdultRoles,
}

impl StepForm for AdultRoleForm {
    fn step(&self) -> StepKind {
        StepKind::AdultRoleSelection
    }

    fn validate(&self, _ctx: &ValidationContext) -> Validation {
        let mut v = Validation::default();
        let school_code_missing = self
            .roles
            .school_code
            .as_deref()
            .is_none_or(|c| c.trim().is_empty());
        if self.roles.is_selected(AdultRole::SchoolConsultant) && school_code_missing {
            v.fail("school_code", "school_code.required");
        }
        v
    }

    fn to_patch(&self) -> SignupPatch {
        let mut roles = self.roles.clone();
        roles.school_code = trimmed(roles.school_code);
        roles.organization_code = trimmed(roles.organization_code);
        SignupPatch {
            roles: Some(roles),
            ..Default::default()
        }
    }
}

fn trimmed(code: Option<String>) -> Option<String> {
    code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

/// Tagged union of every step's input, as submitted over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepInput {
    Information,
    Terms(TermsForm),
    UserInfo(UserInfoForm),
    Verification(VerificationForm),
    AdultRoleSelection(AdultRoleForm),
}

impl StepInput {
    fn as_form(&self) -> Option<&dyn StepForm> {
        match self {
            Self::Information => None,
            Self::Terms(f) => Some(f),
            Self::UserInfo(f) => Some(f),
            Self::Verification(f) => Some(f),
            Self::AdultRoleSelection(f) => Some(f),
        }
    }
}

impl StepForm for StepInput {
    fn step(&self) -> StepKind {
        self.as_form()
            .map(|f| f.step())
            .unwrap_or(StepKind::Information)
    }

    fn validate(&self, ctx: &ValidationContext) -> Validation {
        self.as_form()
            .map(|f| f.validate(ctx))
            .unwrap_or_default()
    }

    fn to_patch(&self) -> SignupPatch {
        self.as_form().map(|f| f.to_patch()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ValidationContext {
        ValidationContext {
            today: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            rules: WizardRules::default(),
        }
    }

    fn valid_user_info() -> UserInfoForm {
        UserInfoForm {
            name: "Maryam".into(),
            contact: "maryam@example.com".into(),
            date_of_birth: "1990-04-02".into(),
            calendar: Calendar::Gregorian,
            password: "secret1".into(),
            password_confirmation: "secret1".into(),
        }
    }

    #[test]
    fn terms_gate_on_mandatory_only() {
        let form = TermsForm {
            terms_accepted: false,
            communications_accepted: true,
            marketing_accepted: true,
        };
        let v = form.validate(&ctx());
        assert!(!v.is_valid());
        assert_eq!(v.errors[0].code, "terms.required");

        let ok = TermsForm {
            terms_accepted: true,
            ..Default::default()
        };
        assert!(ok.validate(&ctx()).is_valid());
    }

    #[test]
    fn user_info_happy_path() {
        assert!(valid_user_info().validate(&ctx()).is_valid());
    }

    #[test]
    fn user_info_field_rules() {
        let form = UserInfoForm {
            name: "   ".into(),
            contact: "nope".into(),
            date_of_birth: "2027-01-01".into(),
            calendar: Calendar::Gregorian,
            password: "12345".into(),
            password_confirmation: "123456".into(),
        };
        let v = form.validate(&ctx());
        for field in [
            "name",
            "contact",
            "date_of_birth",
            "password",
            "password_confirmation",
        ] {
            assert!(v.has(field), "expected error on {field}");
        }
        assert!(v.errors.iter().any(|e| e.code == "date_of_birth.future"));
    }

    #[test]
    fn user_info_accepts_persian_phone_and_jalali_date() {
        let form = UserInfoForm {
            contact: "۰۹۱۲۳۴۵۶۷۸۹".into(),
            date_of_birth: "۱۳۸۷/۰۲/۲۰".into(),
            calendar: Calendar::Jalali,
            ..valid_user_info()
        };
        assert!(form.validate(&ctx()).is_valid());
        let patch = form.to_patch();
        assert_eq!(patch.contact.as_deref(), Some("09123456789"));
        assert_eq!(patch.date_of_birth.as_deref(), Some("2008-05-09"));
    }

    #[test]
    fn unparseable_birth_date_is_left_out_of_patch() {
        let form = UserInfoForm {
            date_of_birth: "1990-02-30".into(),
            ..valid_user_info()
        };
        assert!(form.validate(&ctx()).has("date_of_birth"));
        assert!(form.to_patch().date_of_birth.is_none());
    }

    #[test]
    fn birth_date_today_is_allowed() {
        let form = UserInfoForm {
            date_of_birth: "2026-10-19".into(),
            ..valid_user_info()
        };
        assert!(form.validate(&ctx()).is_valid());
    }

    #[test]
    fn confirmation_is_never_stored() {
        let json = serde_json::to_value(valid_user_info().to_patch()).unwrap();
        assert!(json.get("password_confirmation").is_none());
        assert_eq!(json["password"], "secret1");
    }

    #[test]
    fn verification_code_length() {
        let short = VerificationForm { code: "1234".into() };
        assert!(!short.validate(&ctx()).is_valid());
        let exact = VerificationForm { code: "۱۲۳۴۵".into() };
        assert!(exact.validate(&ctx()).is_valid());
        assert_eq!(exact.to_patch().verification_code.as_deref(), Some("12345"));
        let long = VerificationForm { code: "123456".into() };
        assert!(!long.validate(&ctx()).is_valid());
    }

    #[test]
    fn school_consultant_needs_school_code() {
        let mut form = AdultRoleForm {
            roles: AdultRoles::default().with_role(AdultRole::SchoolConsultant, true),
        };
        assert!(form.validate(&ctx()).has("school_code"));

        form.roles.school_code = Some("  ".into());
        assert!(form.validate(&ctx()).has("school_code"));

        form.roles.school_code = Some(" SC-1042 ".into());
        assert!(form.validate(&ctx()).is_valid());
        let roles = form.to_patch().roles.unwrap();
        assert_eq!(roles.school_code.as_deref(), Some("SC-1042"));
    }

    #[test]
    fn roles_without_school_consultant_need_no_code() {
        let form = AdultRoleForm {
            roles: AdultRoles::default()
                .with_role(AdultRole::Parent, true)
                .with_role(AdultRole::SchoolConsultant, false),
        };
        assert!(form.validate(&ctx()).is_valid());
    }

    #[test]
    fn step_input_is_tagged_by_step() {
        let input: StepInput = serde_json::from_str(
            r#"{"step": "verification", "code": "12345"}"#,
        )
        .unwrap();
        assert_eq!(input.step(), StepKind::Verification);
        assert!(input.validate(&ctx()).is_valid());

        let info: StepInput = serde_json::from_str(r#"{"step": "information"}"#).unwrap();
        assert_eq!(info.step(), StepKind::Information);
        assert!(info.to_patch().is_empty());
    }
}
