//! Orchestration core for Autopilot.
//!
//! Wraps independently implemented automation modes in a uniform lifecycle
//! with an error budget and a run guard, keeps them in a registry, and
//! schedules them sequentially, on demand or from a background loop.

pub mod builtin;
pub mod collaborator;
pub mod error;
pub mod keywords;
pub mod mode;
pub mod registry;
pub mod scheduler;

pub use builtin::{build_mode, register_builtin_modes, BUILTIN_MODES};
pub use collaborator::{
    Actuator, Collaborators, ContentGenerator, Entity, MemoryStore, RemoteAction, RemoteItem,
    SimulatedActuator, Store, Surface, TemplateGenerator, Tone,
};
pub use error::{CollaboratorError, ModeError, RegistryError, SchedulerError};
pub use keywords::KeywordFilter;
pub use mode::{Mode, ModeContext, ModeLogic, ModeSpec, ModeStatus};
pub use registry::Registry;
pub use scheduler::{Scheduler, SchedulerSettings};
