//! WizardOrchestrator — coordinates navigation, validity gating, branch
//! resolution and completion.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::WizardRules;
use crate::error::{ValidationError, WizardError};
use crate::store::RecordStore;

use super::calendar::age_on;
use super::clock::Clock;
use super::forms::{StepForm, StepInput, Validation, ValidationContext, VerificationForm};
use super::history::{StepRouter, step_query};
use super::input::code_from_paste;
use super::model::{
    SharingConnection, SharingConnectionId, SharingPermissions, SignupPatch, SignupRecord,
};
use super::sequencer::{StepKind, StepSlot, parse_step_param, step_identity, total_steps};
use super::session::{SessionEstablisher, SessionIdentity};
use super::state::{Direction, WizardState};

/// Step the wizard falls back to when the branch is still unknown.
const BRANCH_RESOLVING_STEP: u32 = 4;

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct WizardDeps {
    pub store: Arc<dyn RecordStore>,
    pub session: Arc<dyn SessionEstablisher>,
    pub router: Arc<dyn StepRouter>,
    pub clock: Arc<dyn Clock>,
    pub rules: WizardRules,
}

/// Screen position of the control that triggered completion, used to
/// anchor the celebration animation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

/// Why a navigation request did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Mandatory terms not accepted. The only reason shown to the user.
    TermsRequired,
    /// The active step has not reported valid input.
    StepInvalid,
    /// Waiting for the youth/adult branch.
    BranchUndetermined,
    /// Verification was left without a usable date of birth on record
    /// (absent, malformed, or later than today).
    BirthDateMissing,
    AtFirstStep,
}

impl BlockReason {
    /// Message code the UI must surface, if any. Other refusals are silent
    /// (the button is simply disabled).
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Self::TermsRequired => Some("terms.required"),
            _ => None,
        }
    }
}

/// Render snapshot of the wizard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardView {
    pub step: u32,
    pub total: u32,
    pub slot: StepSlot,
    pub direction: Direction,
    pub valid: bool,
    pub can_next: bool,
    pub can_previous: bool,
    pub is_last: bool,
    pub finished: bool,
    /// Query string mirroring `step`.
    pub location: String,
}

/// Final acknowledgment handed back to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub identity: SessionIdentity,
    pub anchor: Option<Anchor>,
}

/// Result of Next / Previous.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NavOutcome {
    Moved {
        view: WizardView,
    },
    Blocked {
        reason: BlockReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        notice: Option<&'static str>,
        view: WizardView,
    },
    Finished {
        completion: Completion,
    },
}

/// Result of submitting a step's form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    pub validation: Validation,
    pub view: WizardView,
}

/// The signup wizard state machine.
pub struct WizardOrchestrator {
    deps: WizardDeps,
    state: RwLock<WizardState>,
}

impl WizardOrchestrator {
    pub fn new(deps: WizardDeps) -> Self {
        Self {
            deps,
            state: RwLock::new(WizardState::default()),
        }
    }

    /// Start (or restart) the wizard: rehydrate the record and seed the
    /// step from the `step` URL parameter.
    pub async fn mount(&self, step_param: Option<&str>) -> WizardView {
        let mut state = self.state.write().await;
        let record = self.deps.store.load().await;
        let requested = parse_step_param(step_param).unwrap_or(1);
        *state = WizardState::seeded(requested, &record);

        // The record is fully loaded by now, so an unknown branch will not
        // resolve itself; send the user to where it gets decided.
        if matches!(step_identity(state.step, &record), Ok(StepSlot::Indeterminate)) {
            tracing::warn!(
                step = state.step,
                "Branch undetermined at mount, returning to verification"
            );
            state.go_to(BRANCH_RESOLVING_STEP, Direction::Backward, &record);
            state.reset_validity(&record);
        }

        self.deps.router.replace_step(state.step);
        tracing::info!(
            step = state.step,
            total = state.total,
            requested,
            "Signup wizard mounted"
        );
        render(&state, &record)
    }

    /// Current render snapshot.
    pub async fn view(&self) -> WizardView {
        let state = self.state.read().await;
        let record = self.deps.store.current().await;
        render(&state, &record)
    }

    /// The in-progress record.
    pub async fn record(&self) -> SignupRecord {
        self.deps.store.current().await
    }

    /// Validity report from the active step.
    pub async fn report_validity(&self, valid: bool) -> Result<WizardView, WizardError> {
        let mut state = self.state.write().await;
        ensure_active(&state)?;
        let record = self.deps.store.current().await;
        match self.resolve_slot(&mut state, &record) {
            StepSlot::Step(kind) if kind.always_valid() => state.valid = true,
            StepSlot::Step(_) => state.valid = valid,
            StepSlot::Indeterminate => state.valid = false,
        }
        Ok(render(&state, &record))
    }

    /// Validate and merge the active step's form.
    pub async fn submit(&self, input: StepInput) -> Result<SubmitOutcome, WizardError> {
        let mut state = self.state.write().await;
        ensure_active(&state)?;
        let record = self.deps.store.current().await;
        let slot = self.resolve_slot(&mut state, &record);
        if slot.kind() != Some(input.step()) {
            return Err(WizardError::StepMismatch {
                submitted: input.step().to_string(),
                active: slot.to_string(),
            });
        }

        let validation = input.validate(&self.validation_context());
        let record = self.deps.store.merge(input.to_patch()).await?;
        state.valid = input.step().always_valid() || validation.is_valid();
        self.sync_branch(&mut state, &record);

        tracing::debug!(
            step = state.step,
            kind = %input.step(),
            valid = state.valid,
            "Step input merged"
        );
        Ok(SubmitOutcome {
            validation,
            view: render(&state, &record),
        })
    }

    /// Fill the verification code from pasted clipboard text. `None` when
    /// the text holds no usable code.
    pub async fn paste_verification_code(
        &self,
        text: &str,
    ) -> Result<Option<SubmitOutcome>, WizardError> {
        let Some(code) = code_from_paste(text, self.deps.rules.code_len) else {
            tracing::debug!("Pasted text contained no verification code");
            return Ok(None);
        };
        self.submit(StepInput::Verification(VerificationForm { code }))
            .await
            .map(Some)
    }

    /// Add a sharing connection while a sharing step is active.
    pub async fn add_sharing_connection(
        &self,
        contact: &str,
        permissions: SharingPermissions,
    ) -> Result<SharingConnection, WizardError> {
        let mut state = self.state.write().await;
        ensure_active(&state)?;
        let record = self.deps.store.current().await;
        self.ensure_sharing_step(&mut state, &record)?;

        let connection = SharingConnection::new(contact, permissions)?;
        if record.sharing.iter().any(|c| c.contact == connection.contact) {
            return Err(ValidationError::DuplicateContact(connection.contact).into());
        }

        let mut sharing = record.sharing;
        sharing.push(connection.clone());
        self.deps
            .store
            .merge(SignupPatch {
                sharing: Some(sharing),
                ..Default::default()
            })
            .await?;
        tracing::info!(id = %connection.id, "Sharing connection added");
        Ok(connection)
    }

    /// Remove a sharing connection while a sharing step is active.
    pub async fn remove_sharing_connection(
        &self,
        id: SharingConnectionId,
    ) -> Result<(), WizardError> {
        let mut state = self.state.write().await;
        ensure_active(&state)?;
        let record = self.deps.store.current().await;
        self.ensure_sharing_step(&mut state, &record)?;

        if record.connection(id).is_none() {
            return Err(WizardError::ConnectionNotFound(id));
        }
        let sharing = record.sharing.into_iter().filter(|c| c.id != id).collect();
        self.deps
            .store
            .merge(SignupPatch {
                sharing: Some(sharing),
                ..Default::default()
            })
            .await?;
        tracing::info!(%id, "Sharing connection removed");
        Ok(())
    }

    /// Advance one step, or finish from the last one.
    pub async fn next(&self, anchor: Option<Anchor>) -> Result<NavOutcome, WizardError> {
        let mut state = self.state.write().await;
        ensure_active(&state)?;
        let mut record = self.deps.store.current().await;

        let kind = match self.resolve_slot(&mut state, &record) {
            StepSlot::Step(kind) => kind,
            StepSlot::Indeterminate => {
                return Ok(blocked(BlockReason::BranchUndetermined, &state, &record));
            }
        };

        // Provisional validity (after Previous or a deep link) never
        // substitutes for accepted terms.
        let terms_missing = kind == StepKind::Terms && !record.terms_accepted;
        if terms_missing || !state.valid {
            let reason = if terms_missing {
                BlockReason::TermsRequired
            } else {
                BlockReason::StepInvalid
            };
            tracing::debug!(step = state.step, ?reason, "Next refused");
            return Ok(blocked(reason, &state, &record));
        }

        if kind == StepKind::Verification {
            match self.resolve_branch(&record).await? {
                Some(resolved) => record = resolved,
                None => return Ok(blocked(BlockReason::BirthDateMissing, &state, &record)),
            }
            state.total = total_steps(&record);
        }

        if state.step >= state.total {
            return self.finish(&mut state, &record, anchor).await;
        }

        let next = state.step + 1;
        state.go_to(next, Direction::Forward, &record);
        self.deps.router.push_step(next);
        tracing::info!(step = next, total = state.total, "Advanced");
        Ok(NavOutcome::Moved {
            view: render(&state, &record),
        })
    }

    /// Go back one step.
    pub async fn previous(&self) -> Result<NavOutcome, WizardError> {
        let mut state = self.state.write().await;
        ensure_active(&state)?;
        let record = self.deps.store.current().await;

        if self.resolve_slot(&mut state, &record) == StepSlot::Indeterminate {
            return Ok(blocked(BlockReason::BranchUndetermined, &state, &record));
        }
        if state.step <= 1 {
            return Ok(blocked(BlockReason::AtFirstStep, &state, &record));
        }

        let prev = state.step - 1;
        state.go_to(prev, Direction::Backward, &record);
        self.deps.router.push_step(prev);
        tracing::info!(step = prev, "Went back");
        Ok(NavOutcome::Moved {
            view: render(&state, &record),
        })
    }

    fn validation_context(&self) -> ValidationContext {
        ValidationContext {
            today: self.deps.clock.today(),
            rules: self.deps.rules,
        }
    }

    /// Decide youth vs adult from the stored date of birth and persist it.
    async fn resolve_branch(
        &self,
        record: &SignupRecord,
    ) -> Result<Option<SignupRecord>, WizardError> {
        let today = self.deps.clock.today();
        let Some(birth) = record.birth_date().filter(|birth| *birth <= today) else {
            tracing::warn!("Leaving verification without a usable date of birth on record");
            return Ok(None);
        };
        let age = age_on(birth, today);
        let is_youth = age < self.deps.rules.youth_age;
        if record.is_youth.is_some_and(|prev| prev != is_youth) {
            tracing::info!(is_youth, "Branch changed after date of birth edit");
        }
        let resolved = self
            .deps
            .store
            .merge(SignupPatch::default().with_is_youth(Some(is_youth)))
            .await?;
        tracing::info!(age, is_youth, "Branch resolved");
        Ok(Some(resolved))
    }

    async fn finish(
        &self,
        state: &mut WizardState,
        record: &SignupRecord,
        anchor: Option<Anchor>,
    ) -> Result<NavOutcome, WizardError> {
        if !record.terms_accepted {
            tracing::warn!("Finish refused, mandatory terms not accepted");
            return Err(WizardError::TermsNotAccepted);
        }
        let identity = SessionIdentity {
            name: non_empty(record.name.as_deref()).ok_or(WizardError::MissingIdentity("name"))?,
            contact: non_empty(record.contact.as_deref())
                .ok_or(WizardError::MissingIdentity("contact"))?,
        };

        // Session first: if it fails the wizard is left intact to retry.
        self.deps.session.establish_session(&identity).await?;
        if let Err(e) = self.deps.store.clear().await {
            tracing::error!("Session established but in-progress record not cleared: {}", e);
        }
        state.finished = true;

        tracing::info!(contact = %identity.contact, steps = state.total, "Signup finished");
        Ok(NavOutcome::Finished {
            completion: Completion { identity, anchor },
        })
    }

    /// Recompute the step count after a merge and pull the index back into
    /// range if the branch moved under it.
    fn sync_branch(&self, state: &mut WizardState, record: &SignupRecord) {
        if state.resync(record) {
            tracing::info!(
                step = state.step,
                total = state.total,
                "Step index re-clamped after branch change"
            );
            self.deps.router.replace_step(state.step);
        }
    }

    /// Slot for the current index. A slot the branch cannot hold is logged
    /// and the wizard redirected to the branch's last step.
    fn resolve_slot(&self, state: &mut WizardState, record: &SignupRecord) -> StepSlot {
        match step_identity(state.step, record) {
            Ok(slot) => slot,
            Err(e) => {
                tracing::error!("Step table violation, redirecting: {}", e);
                state.total = total_steps(record);
                state.step = state.total;
                state.reset_validity(record);
                self.deps.router.replace_step(state.step);
                step_identity(state.step, record).unwrap_or(StepSlot::Indeterminate)
            }
        }
    }

    fn ensure_sharing_step(
        &self,
        state: &mut WizardState,
        record: &SignupRecord,
    ) -> Result<(), WizardError> {
        match self.resolve_slot(state, record) {
            StepSlot::Step(kind) if kind.is_sharing() => Ok(()),
            _ => Err(WizardError::NotOnSharingStep),
        }
    }
}

fn ensure_active(state: &WizardState) -> Result<(), WizardError> {
    if state.finished {
        return Err(WizardError::AlreadyFinished);
    }
    Ok(())
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

fn blocked(reason: BlockReason, state: &WizardState, record: &SignupRecord) -> NavOutcome {
    NavOutcome::Blocked {
        reason,
        notice: reason.notice(),
        view: render(state, record),
    }
}

fn render(state: &WizardState, record: &SignupRecord) -> WizardView {
    let slot = step_identity(state.step, record).unwrap_or_else(|e| {
        tracing::error!("Rendering blocked view for invalid step: {}", e);
        StepSlot::Indeterminate
    });
    let determinate = slot != StepSlot::Indeterminate;
    let terms_missing = slot == StepSlot::Step(StepKind::Terms) && !record.terms_accepted;
    WizardView {
        step: state.step,
        total: state.total,
        slot,
        direction: state.direction,
        valid: state.valid,
        can_next: !state.finished && determinate && state.valid && !terms_missing,
        can_previous: !state.finished && determinate && state.step > 1,
        is_last: state.is_last(),
        finished: state.finished,
        location: step_query(state.step),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Months, NaiveDate};

    use super::*;
    use crate::store::{MemoryDatabase, SettingsRecordStore};
    use crate::wizard::calendar::Calendar;
    use crate::wizard::clock::FixedClock;
    use crate::wizard::forms::{AdultRoleForm, TermsForm, UserInfoForm};
    use crate::wizard::history::StepHistory;
    use crate::wizard::model::{AdultRole, AdultRoles, settings_keys};
    use crate::wizard::session::RecordingSession;

    struct Harness {
        wizard: WizardOrchestrator,
        db: Arc<MemoryDatabase>,
        session: Arc<RecordingSession>,
        history: Arc<StepHistory>,
        today: NaiveDate,
    }

    fn harness() -> Harness {
        harness_with_db(Arc::new(MemoryDatabase::new()))
    }

    fn harness_with_db(db: Arc<MemoryDatabase>) -> Harness {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let session = Arc::new(RecordingSession::new());
        let history = Arc::new(StepHistory::new());
        let deps = WizardDeps {
            store: Arc::new(SettingsRecordStore::new(db.clone(), "default")),
            session: session.clone(),
            router: history.clone(),
            clock: Arc::new(FixedClock(today)),
            rules: WizardRules::default(),
        };
        Harness {
            wizard: WizardOrchestrator::new(deps),
            db,
            session,
            history,
            today,
        }
    }

    fn years_before(today: NaiveDate, years: u32) -> String {
        today
            .checked_sub_months(Months::new(12 * years))
            .unwrap()
            .format("%Y-%m-%d")
            .to_string()
    }

    fn user_info(dob: &str) -> StepInput {
        StepInput::UserInfo(UserInfoForm {
            name: "Dariush".into(),
            contact: "dariush@example.com".into(),
            date_of_birth: dob.into(),
            calendar: Calendar::Gregorian,
            password: "hunter22".into(),
            password_confirmation: "hunter22".into(),
        })
    }

    fn accept_terms() -> StepInput {
        StepInput::Terms(TermsForm {
            terms_accepted: true,
            ..Default::default()
        })
    }

    fn code() -> StepInput {
        StepInput::Verification(VerificationForm {
            code: "12345".into(),
        })
    }

    fn moved(outcome: NavOutcome) -> WizardView {
        match outcome {
            NavOutcome::Moved { view } => view,
            other => panic!("expected Moved, got {other:?}"),
        }
    }

    /// Mount, fill steps 1–4 and press Next on verification.
    async fn through_verification(h: &Harness, dob: &str) -> WizardView {
        h.wizard.mount(None).await;
        moved(h.wizard.next(None).await.unwrap());
        h.wizard.submit(accept_terms()).await.unwrap();
        moved(h.wizard.next(None).await.unwrap());
        h.wizard.submit(user_info(dob)).await.unwrap();
        moved(h.wizard.next(None).await.unwrap());
        h.wizard.submit(code()).await.unwrap();
        moved(h.wizard.next(None).await.unwrap())
    }

    #[tokio::test]
    async fn scenario_a_youth_branch() {
        let h = harness();
        let dob = years_before(h.today, 16);
        let view = through_verification(&h, &dob).await;

        assert_eq!(view.step, 5);
        assert_eq!(view.total, 5);
        assert_eq!(view.slot, StepSlot::Step(StepKind::YouthSharing));
        assert!(view.is_last);
        assert_eq!(h.wizard.record().await.is_youth, Some(true));
    }

    #[tokio::test]
    async fn scenario_b_adult_branch() {
        let h = harness();
        let dob = years_before(h.today, 20);
        let view = through_verification(&h, &dob).await;

        assert_eq!(view.step, 5);
        assert_eq!(view.total, 6);
        assert_eq!(view.slot, StepSlot::Step(StepKind::AdultRoleSelection));
        assert!(!view.valid);
        assert_eq!(h.wizard.record().await.is_youth, Some(false));

        h.wizard
            .submit(StepInput::AdultRoleSelection(AdultRoleForm {
                roles: AdultRoles::default().with_role(AdultRole::Parent, true),
            }))
            .await
            .unwrap();
        let view = moved(h.wizard.next(None).await.unwrap());
        assert_eq!(view.step, 6);
        assert_eq!(view.slot, StepSlot::Step(StepKind::AdultSharing));
        assert!(view.valid);
    }

    #[tokio::test]
    async fn exactly_eighteen_today_is_adult() {
        let h = harness();
        let dob = years_before(h.today, 18);
        let view = through_verification(&h, &dob).await;
        assert_eq!(view.slot, StepSlot::Step(StepKind::AdultRoleSelection));
    }

    #[tokio::test]
    async fn eighteen_tomorrow_is_youth() {
        let h = harness();
        let dob = h
            .today
            .checked_sub_months(Months::new(12 * 18))
            .unwrap()
            .succ_opt()
            .unwrap()
            .format("%Y-%m-%d")
            .to_string();
        let view = through_verification(&h, &dob).await;
        assert_eq!(view.slot, StepSlot::Step(StepKind::YouthSharing));
    }

    #[tokio::test]
    async fn scenario_c_sharing_without_permissions_rejected() {
        let h = harness();
        let dob = years_before(h.today, 15);
        through_verification(&h, &dob).await;

        let err = h
            .wizard
            .add_sharing_connection("dad@example.com", SharingPermissions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WizardError::Validation(ValidationError::NoPermissions)
        ));
        assert!(h.wizard.record().await.sharing.is_empty());
    }

    #[tokio::test]
    async fn sharing_connections_add_and_remove() {
        let h = harness();
        let dob = years_before(h.today, 15);
        through_verification(&h, &dob).await;

        let perms = SharingPermissions {
            basic_information: true,
            ..Default::default()
        };
        let conn = h
            .wizard
            .add_sharing_connection("dad@example.com", perms)
            .await
            .unwrap();
        assert_eq!(h.wizard.record().await.sharing, vec![conn.clone()]);

        let dup = h
            .wizard
            .add_sharing_connection("dad@example.com", perms)
            .await
            .unwrap_err();
        assert!(matches!(
            dup,
            WizardError::Validation(ValidationError::DuplicateContact(_))
        ));

        h.wizard.remove_sharing_connection(conn.id).await.unwrap();
        assert!(h.wizard.record().await.sharing.is_empty());

        let missing = h.wizard.remove_sharing_connection(conn.id).await.unwrap_err();
        assert!(matches!(missing, WizardError::ConnectionNotFound(_)));
    }

    #[tokio::test]
    async fn sharing_outside_sharing_step_rejected() {
        let h = harness();
        h.wizard.mount(Some("2")).await;
        let perms = SharingPermissions {
            test_results: true,
            ..Default::default()
        };
        let err = h
            .wizard
            .add_sharing_connection("x@example.com", perms)
            .await
            .unwrap_err();
        assert!(matches!(err, WizardError::NotOnSharingStep));
    }

    #[tokio::test]
    async fn scenario_d_terms_block_with_notice() {
        let h = harness();
        h.wizard.mount(None).await;
        moved(h.wizard.next(None).await.unwrap());

        h.wizard
            .submit(StepInput::Terms(TermsForm {
                terms_accepted: false,
                communications_accepted: true,
                marketing_accepted: false,
            }))
            .await
            .unwrap();

        match h.wizard.next(None).await.unwrap() {
            NavOutcome::Blocked {
                reason,
                notice,
                view,
            } => {
                assert_eq!(reason, BlockReason::TermsRequired);
                assert_eq!(notice, Some("terms.required"));
                assert_eq!(view.step, 2);
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_invalid_steps_block_silently() {
        let h = harness();
        h.wizard.mount(Some("3")).await;
        h.wizard.submit(user_info("not a date")).await.unwrap();

        match h.wizard.next(None).await.unwrap() {
            NavOutcome::Blocked { reason, notice, view } => {
                assert_eq!(reason, BlockReason::StepInvalid);
                assert_eq!(notice, None);
                assert_eq!(view.step, 3);
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scenario_e_adult_finish() {
        let h = harness();
        let dob = years_before(h.today, 30);
        through_verification(&h, &dob).await;
        h.wizard
            .submit(StepInput::AdultRoleSelection(AdultRoleForm::default()))
            .await
            .unwrap();
        moved(h.wizard.next(None).await.unwrap());

        let anchor = Anchor { x: 120.0, y: 640.5 };
        let outcome = h.wizard.next(Some(anchor)).await.unwrap();
        let NavOutcome::Finished { completion } = outcome else {
            panic!("expected Finished, got {outcome:?}");
        };
        assert_eq!(completion.anchor, Some(anchor));
        let expected = SessionIdentity {
            name: "Dariush".into(),
            contact: "dariush@example.com".into(),
        };
        assert_eq!(completion.identity, expected);
        assert_eq!(h.session.established(), vec![expected]);
        assert!(h.db.raw("default", settings_keys::SIGNUP_FORM_DATA).is_none());

        assert!(h.wizard.view().await.finished);
        assert!(matches!(
            h.wizard.next(None).await,
            Err(WizardError::AlreadyFinished)
        ));
        assert_eq!(h.session.established().len(), 1);
    }

    #[tokio::test]
    async fn next_on_last_youth_step_finishes() {
        let h = harness();
        let dob = years_before(h.today, 12);
        let view = through_verification(&h, &dob).await;
        assert!(view.is_last);

        let outcome = h.wizard.next(None).await.unwrap();
        assert!(matches!(outcome, NavOutcome::Finished { .. }));
        assert_eq!(h.wizard.view().await.step, 5, "index never goes past total");
    }

    #[tokio::test]
    async fn failed_session_keeps_record_for_retry() {
        struct FailingSession;
        #[async_trait::async_trait]
        impl SessionEstablisher for FailingSession {
            async fn establish_session(
                &self,
                identity: &SessionIdentity,
            ) -> Result<(), crate::error::SessionError> {
                Err(crate::error::SessionError::EstablishFailed {
                    contact: identity.contact.clone(),
                    reason: "auth service down".into(),
                })
            }
        }

        let db = Arc::new(MemoryDatabase::new());
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let wizard = WizardOrchestrator::new(WizardDeps {
            store: Arc::new(SettingsRecordStore::new(db.clone(), "default")),
            session: Arc::new(FailingSession),
            router: Arc::new(StepHistory::new()),
            clock: Arc::new(FixedClock(today)),
            rules: WizardRules::default(),
        });
        wizard.mount(None).await;
        moved(wizard.next(None).await.unwrap());
        wizard.submit(accept_terms()).await.unwrap();
        moved(wizard.next(None).await.unwrap());
        wizard.submit(user_info("2015-01-01")).await.unwrap();
        moved(wizard.next(None).await.unwrap());
        wizard.submit(code()).await.unwrap();
        moved(wizard.next(None).await.unwrap());

        assert!(matches!(
            wizard.next(None).await,
            Err(WizardError::Session(_))
        ));
        assert!(db.raw("default", settings_keys::SIGNUP_FORM_DATA).is_some());
        assert!(!wizard.view().await.finished);
    }

    #[tokio::test]
    async fn out_of_range_step_param_clamps() {
        let h = harness();
        assert_eq!(h.wizard.mount(Some("0")).await.step, 1);
        assert_eq!(h.wizard.mount(Some("-7")).await.step, 1);
        assert_eq!(h.wizard.mount(Some("garbage")).await.step, 1);

        h.db.insert_raw(
            "default",
            settings_keys::SIGNUP_FORM_DATA,
            r#"{"is_youth": true}"#,
        );
        let view = h.wizard.mount(Some("42")).await;
        assert_eq!(view.step, 5);
        assert_eq!(view.total, 5);
        assert_eq!(view.slot, StepSlot::Step(StepKind::YouthSharing));
        assert_eq!(h.history.current_step(), Some(5));
    }

    #[tokio::test]
    async fn mount_rehydrates_in_progress_record() {
        let db = Arc::new(MemoryDatabase::new());
        db.insert_raw(
            "default",
            settings_keys::SIGNUP_FORM_DATA,
            r#"{"terms_accepted": true, "name": "Leila", "is_youth": false}"#,
        );
        let h = harness_with_db(db);
        let view = h.wizard.mount(Some("6")).await;
        assert_eq!(view.slot, StepSlot::Step(StepKind::AdultSharing));
        let record = h.wizard.record().await;
        assert!(record.terms_accepted);
        assert_eq!(record.name.as_deref(), Some("Leila"));
    }

    #[tokio::test]
    async fn mount_with_malformed_record_starts_fresh() {
        let db = Arc::new(MemoryDatabase::new());
        db.insert_raw("default", settings_keys::SIGNUP_FORM_DATA, "not json at all");
        let h = harness_with_db(db);
        let view = h.wizard.mount(Some("3")).await;
        assert_eq!(view.step, 3);
        assert_eq!(h.wizard.record().await, SignupRecord::default());
    }

    #[tokio::test]
    async fn undetermined_branch_at_mount_returns_to_verification() {
        let h = harness();
        let view = h.wizard.mount(Some("5")).await;
        assert_eq!(view.step, 4);
        assert_eq!(view.slot, StepSlot::Step(StepKind::Verification));
        assert!(!view.valid);
    }

    #[tokio::test]
    async fn previous_moves_back_and_assumes_valid() {
        let h = harness();
        h.wizard.mount(Some("3")).await;
        let view = moved(h.wizard.previous().await.unwrap());
        assert_eq!(view.step, 2);
        assert_eq!(view.direction, Direction::Backward);
        assert!(view.valid);
        assert!(view.can_previous);

        let view = moved(h.wizard.previous().await.unwrap());
        assert_eq!(view.step, 1);
        assert!(!view.can_previous);
        assert!(matches!(
            h.wizard.previous().await.unwrap(),
            NavOutcome::Blocked {
                reason: BlockReason::AtFirstStep,
                ..
            }
        ));
        assert_eq!(h.history.entries(), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn forward_transition_resets_validity() {
        let h = harness();
        h.wizard.mount(None).await;
        let view = moved(h.wizard.next(None).await.unwrap());
        assert_eq!(view.slot, StepSlot::Step(StepKind::Terms));
        assert!(!view.valid);
        assert!(!view.can_next);

        h.wizard.submit(accept_terms()).await.unwrap();
        let view = moved(h.wizard.next(None).await.unwrap());
        assert_eq!(view.step, 3);
        assert!(!view.valid, "user info must report before Next unlocks");
    }

    #[tokio::test]
    async fn terms_gate_holds_after_going_back() {
        let h = harness();
        h.wizard.mount(Some("3")).await;
        let view = moved(h.wizard.previous().await.unwrap());
        assert_eq!(view.slot, StepSlot::Step(StepKind::Terms));
        assert!(view.valid);
        assert!(!view.can_next);

        match h.wizard.next(None).await.unwrap() {
            NavOutcome::Blocked { reason, notice, view } => {
                assert_eq!(reason, BlockReason::TermsRequired);
                assert_eq!(notice, Some("terms.required"));
                assert_eq!(view.step, 2);
            }
            other => panic!("expected Blocked, got {other:?}"),
        }

        // A reported valid without accepting still does not unlock it.
        h.wizard.report_validity(true).await.unwrap();
        assert!(matches!(
            h.wizard.next(None).await.unwrap(),
            NavOutcome::Blocked {
                reason: BlockReason::TermsRequired,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn finish_requires_accepted_terms() {
        let db = Arc::new(MemoryDatabase::new());
        db.insert_raw(
            "default",
            settings_keys::SIGNUP_FORM_DATA,
            r#"{"is_youth": true, "name": "A", "contact": "a@example.com", "date_of_birth": "2015-01-01"}"#,
        );
        let h = harness_with_db(db);
        let view = h.wizard.mount(Some("5")).await;
        assert_eq!(view.slot, StepSlot::Step(StepKind::YouthSharing));

        assert!(matches!(
            h.wizard.next(None).await,
            Err(WizardError::TermsNotAccepted)
        ));
        assert!(h.session.established().is_empty());
        assert!(h.db.raw("default", settings_keys::SIGNUP_FORM_DATA).is_some());
        assert!(!h.wizard.view().await.finished);
    }

    #[tokio::test]
    async fn future_birth_date_never_resolves_branch() {
        let h = harness();
        h.wizard.mount(Some("3")).await;
        let outcome = h.wizard.submit(user_info("2030-01-01")).await.unwrap();
        assert!(outcome.validation.has("date_of_birth"));
        assert!(!outcome.view.valid);

        // Reload straight onto verification, skipping the invalid step.
        h.wizard.mount(Some("4")).await;
        h.wizard.submit(code()).await.unwrap();
        assert!(matches!(
            h.wizard.next(None).await.unwrap(),
            NavOutcome::Blocked {
                reason: BlockReason::BirthDateMissing,
                ..
            }
        ));
        assert_eq!(h.wizard.record().await.is_youth, None);
    }

    #[tokio::test]
    async fn information_step_ignores_invalid_reports() {
        let h = harness();
        h.wizard.mount(None).await;
        let view = h.wizard.report_validity(false).await.unwrap();
        assert!(view.valid);
    }

    #[tokio::test]
    async fn submit_for_wrong_step_is_rejected() {
        let h = harness();
        h.wizard.mount(Some("2")).await;
        let err = h.wizard.submit(code()).await.unwrap_err();
        assert!(matches!(err, WizardError::StepMismatch { .. }));
    }

    #[tokio::test]
    async fn branch_flip_reclamps_index() {
        let db = Arc::new(MemoryDatabase::new());
        db.insert_raw(
            "default",
            settings_keys::SIGNUP_FORM_DATA,
            r#"{"is_youth": false, "date_of_birth": "1990-01-01"}"#,
        );
        let h = harness_with_db(db);
        assert_eq!(h.wizard.mount(Some("6")).await.step, 6);

        // Something else flips the branch behind the wizard's back.
        h.wizard
            .deps
            .store
            .merge(SignupPatch::default().with_is_youth(Some(true)))
            .await
            .unwrap();

        // The next operation notices and fails safe to the youth path's end.
        let view = h.wizard.report_validity(true).await.unwrap();
        assert_eq!(view.step, 5);
        assert_eq!(view.total, 5);
        assert_eq!(view.slot, StepSlot::Step(StepKind::YouthSharing));
        assert_eq!(h.history.current_step(), Some(5));
    }

    #[tokio::test]
    async fn editing_birth_date_re_resolves_branch_on_next_verification() {
        let h = harness();
        let adult = years_before(h.today, 25);
        let view = through_verification(&h, &adult).await;
        assert_eq!(view.total, 6);

        // Back to user info, change the date of birth to a minor's.
        moved(h.wizard.previous().await.unwrap());
        moved(h.wizard.previous().await.unwrap());
        let minor = years_before(h.today, 14);
        h.wizard.submit(user_info(&minor)).await.unwrap();
        assert_eq!(h.wizard.record().await.is_youth, Some(false));

        moved(h.wizard.next(None).await.unwrap());
        h.wizard.submit(code()).await.unwrap();
        let view = moved(h.wizard.next(None).await.unwrap());
        assert_eq!(view.slot, StepSlot::Step(StepKind::YouthSharing));
        assert_eq!(view.total, 5);
    }

    #[tokio::test]
    async fn verification_without_birth_date_blocks() {
        let h = harness();
        h.wizard.mount(Some("4")).await;
        h.wizard.submit(code()).await.unwrap();
        assert!(matches!(
            h.wizard.next(None).await.unwrap(),
            NavOutcome::Blocked {
                reason: BlockReason::BirthDateMissing,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn paste_fills_verification_code() {
        let h = harness();
        h.wizard.mount(Some("4")).await;
        assert!(h.wizard.paste_verification_code("no digits").await.unwrap().is_none());

        let outcome = h
            .wizard
            .paste_verification_code("کد تایید شما ۵۴۳۲۱ است")
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.validation.is_valid());
        assert!(outcome.view.valid);
        assert_eq!(
            h.wizard.record().await.verification_code.as_deref(),
            Some("54321")
        );
    }

    #[tokio::test]
    async fn url_mirrors_every_transition() {
        let h = harness();
        h.wizard.mount(None).await;
        moved(h.wizard.next(None).await.unwrap());
        h.wizard.submit(accept_terms()).await.unwrap();
        moved(h.wizard.next(None).await.unwrap());
        moved(h.wizard.previous().await.unwrap());
        assert_eq!(h.history.entries(), vec![1, 2, 3, 2]);
        assert_eq!(h.wizard.view().await.location, "?step=2");
    }
}
