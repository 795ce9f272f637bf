//! Domain model (IDs, kinds, statuses, snapshots, artifacts, errors).
//!
//! ここにあるのは値だけ。I/O もタイマーも持たない。

pub mod artifact;
pub mod errors;
pub mod ids;
pub mod kind;
pub mod snapshot;
pub mod status;

pub use artifact::{Artifact, ArtifactType};
pub use errors::{BackendError, PollFailure, SubmitError, UnknownKind, UnknownStatusWarning};
pub use ids::{SessionId, TaskId};
pub use kind::TaskKind;
pub use snapshot::{StatusSnapshot, TaskHandle};
pub use status::{ControllerState, TaskStatus};
