//! Signature collection for civic initiatives.
//!
//! ## Overview
//!
//! A signer supports a published initiative by walking a short wizard whose
//! steps depend on the initiative's type: optional personal data, optional
//! SMS phone verification, and a final confirmation. Progress is kept in the
//! signer's session; the signature itself is written once, at the end, under
//! a database uniqueness constraint.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    └─ api.rs  (handlers, AppState, cookies)      │
//! └──────────┘          │         │                                        │
//!                       │         │ SignatureWizard::{index, show, submit} │
//!                       │         v                                        │
//!                       │  wizard.rs  (step state machine)                 │
//!                       │    │      │            │                         │
//!                       │    │      │            └─ commit.rs              │
//!                       │    │      │               (VoteCommitService)    │
//!                       │    │      └─ verification.rs                     │
//!                       │    │         (VerificationService, SmsSender)    │
//!                       │    └─ session.rs (Session, WizardStateStore)     │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module     | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | `models`   | Shared types: `Initiative`, `Step`, `SignatureAttempt`  |
//! | `planner`  | `StepPlanner`: initiative type → ordered `StepPlan`     |
//! | `db`       | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)     |

pub mod api;
pub mod commit;
pub mod db;
pub mod models;
pub mod planner;
pub mod server;
pub mod session;
pub mod verification;
pub mod wizard;
