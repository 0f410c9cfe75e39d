use bytes::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;

pub mod builder;
pub mod manager;
pub mod shutdown;

/// Errors surfaced to local callers of the broadcast API.
///
/// Everything arriving from peers is handled (logged and dropped) inside the
/// manager; only the caller's own broadcast can fail.
#[derive(Error, Debug)]
pub enum RbcError {
    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),
    #[error("Broadcast round did not complete in time")]
    Timeout,
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Broadcast manager stopped")]
    ManagerStopped,
}

/// Locally initiated requests, funneled through the manager's single queue
/// so that round state is only ever touched from one task.
#[derive(Debug)]
pub(crate) enum RbcCommand {
    StartBroadcast {
        payload: Bytes,
        done: oneshot::Sender<Result<(), RbcError>>,
    },
}
