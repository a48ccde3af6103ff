//! Workflow orchestration engine for conductor
//!
//! The engine drives multi-phase executions through a declarative DAG
//! of heterogeneous phases. Phases embody one of five execution
//! disciplines — immediate dispatch, multi-party coordination,
//! continuous monitoring, conditional wait, and dependency
//! aggregation — and the engine sequences them deterministically while
//! enforcing dependency order, per-phase deadlines, authorization, and
//! failure propagation.
//!
//! # Key principle
//!
//! **The engine coordinates, it never performs the work.** Immediate
//! phases hand tasks to an external mailbox; coordination, monitoring,
//! and conditional phases arm state and advance only when external
//! submissions arrive. Deadlines are enforced by an externally driven
//! sweep — there is no internal clock task.
//!
//! # Architecture
//!
//! The [`WorkflowEngine`] composes specialized components:
//!
//! - [`WorkflowRegistry`] — stores validated workflow definitions
//! - [`PhaseScheduler`] — dispatches ready phases and settles outcomes
//! - [`PhaseLauncher`] — the five per-discipline launch strategies
//! - [`DeadlineMonitor`] — detects overdue phases
//! - [`AccessControl`] — admin gating and authorization tables
//! - collaborator seams ([`TaskMailbox`], [`OperatorRegistry`],
//!   [`FeeSink`]) — task dispatch, operator-set sizing, fee custody
//!
//! # Example
//!
//! ```rust
//! use conductor_engine::{EngineConfig, WorkflowEngine};
//! use conductor_types::{OperatorSetId, PhaseSpec, Principal};
//! use std::collections::BTreeSet;
//!
//! let admin = Principal::new([1; 20]);
//! let creator = Principal::new([2; 20]);
//! let mut engine = WorkflowEngine::new(EngineConfig::new(Principal::new([0xFF; 20]), admin));
//!
//! engine.authorize_workflow_creator(admin, creator).unwrap();
//! let workflow_id = engine
//!     .register_workflow(
//!         creator,
//!         "settlement",
//!         vec![PhaseSpec::immediate("dispatch", OperatorSetId(0))],
//!         BTreeSet::new(),
//!         0,
//!     )
//!     .unwrap();
//!
//! let execution_id = engine
//!     .execute_workflow(creator, workflow_id, vec![0xAA], 0)
//!     .unwrap();
//! assert!(engine.execution(&execution_id).unwrap().successful);
//! ```

#![deny(unsafe_code)]

pub mod access;
pub mod collaborators;
pub mod engine;
pub mod executors;
pub mod registry;
pub mod scheduler;
pub mod timeout;

pub use access::AccessControl;
pub use collaborators::{
    FeeLedger, FeeSink, MailboxError, OperatorRegistry, QueueMailbox, StaticOperatorRegistry,
    TaskHandle, TaskMailbox, TaskRequest,
};
pub use engine::{EngineConfig, WorkflowEngine};
pub use executors::{quorum_size, PhaseLauncher, TaskPayload, DEFAULT_OPERATOR_COUNT};
pub use registry::WorkflowRegistry;
pub use scheduler::PhaseScheduler;
pub use timeout::DeadlineMonitor;
