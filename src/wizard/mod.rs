//! Signup wizard — multi-step account creation.
//!
//! A new user walks through information, terms, identity, verification and
//! then one of two branches decided by age: a single sharing step for
//! youths, or role selection followed by sharing for adults. Every step's
//! input is merged into one durable `SignupRecord`, so an interrupted signup
//! resumes where it left off. Finishing hands the identity to the session
//! collaborator and clears the record.

pub mod calendar;
pub mod clock;
pub mod forms;
pub mod history;
pub mod input;
pub mod model;
pub mod orchestrator;
pub mod routes;
pub mod sequencer;
pub mod session;
pub mod state;

pub use clock::{Clock, FixedClock, SystemClock};
pub use forms::{StepForm, StepInput, Validation};
pub use history::{StepHistory, StepRouter};
pub use model::{SharingConnection, SharingPermissions, SignupPatch, SignupRecord};
pub use orchestrator::{
    Anchor, BlockReason, NavOutcome, WizardDeps, WizardOrchestrator, WizardView,
};
pub use routes::{SignupRouteState, signup_routes};
pub use sequencer::{StepKind, StepSlot};
pub use session::{RecordingSession, SessionEstablisher, SessionIdentity, SettingsSession};
pub use state::{Direction, WizardState};
