//! Duty roster generation and compliance engine.
//!
//! Assigns residents and faculty to half-day clinical blocks under
//! regulatory duty-hour, rest, supervision and qualification rules, checks
//! existing rosters against those rules, and repairs rosters around sudden
//! absences with minimal change.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `Person`, `Block`, `RotationTemplate`,
//!   `Assignment`, `Absence`, `ComplianceRule`, `GenerationRun`, `Schedule`
//! - **`compliance`**: Rule evaluators over rolling windows, producing
//!   violations, warnings and double-booking conflicts
//! - **`solver`**: Problem instance plus four strategies (greedy, branch and
//!   bound / large neighbourhood search, LP relaxation, hybrid)
//! - **`coordinator`**: Generation runs: validation, idempotency, range
//!   leases, timed solving, post-conditions, atomic commit
//! - **`repair`**: Minimal-diff re-solve around an absence
//! - **`control`**: Range locks, idempotency registry, cancellation
//! - **`repository`**: Storage boundary and an in-memory implementation
//! - **`validation`**: Input integrity checks (ranges, keys, duplicate IDs)
//! - **`config`**, **`error`**, **`telemetry`**: Settings, error taxonomy,
//!   tracing spans
//!
//! # Architecture
//!
//! Rules are data interpreted by a fixed set of evaluators, so a rule set
//! can be reconfigured from JSON without code changes. Strategies are a
//! closed enum dispatched by [`solver::solve`]; all of them score solutions
//! with the same objective and poll a shared deadline and cancellation
//! token. Each run executes as its own task; runs with intersecting date
//! ranges exclude each other through [`control::RangeLockTable`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use u_roster::{Coordinator, EngineConfig, GenerationRequest, InMemoryRepository};
//!
//! let repo = Arc::new(InMemoryRepository::new().with_people(people).with_horizon(range));
//! let coordinator = Coordinator::new(repo, EngineConfig::default());
//! let response = coordinator
//!     .generate(GenerationRequest::new("clinic-a", "jan-roster", range))
//!     .await?;
//! ```
//!
//! # References
//!
//! - ACGME (2023), "Common Program Requirements", Section VI
//! - Wolsey (1998), "Integer Programming" (LP relaxation and rounding)
//! - Shaw (1998), "Using Constraint Programming and Local Search Methods to
//!   Solve Vehicle Routing Problems"

pub mod compliance;
pub mod config;
pub mod control;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod repair;
pub mod repository;
pub mod solver;
pub mod telemetry;
pub mod validation;

pub use config::{CostWeights, EngineConfig, SolverConfig};
pub use coordinator::{
    Coordinator, FailureReason, FailureReport, GenerationRequest, GenerationResponse, SweepReport,
    UnsatisfiedConstraint,
};
pub use error::{EngineError, EngineResult, RepositoryError, SolverError};
pub use repair::{RepairRequest, RepairResponse, Replacement};
pub use repository::{InMemoryRepository, Repository};
pub use solver::Algorithm;
