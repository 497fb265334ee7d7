//! Error taxonomy for the renter core.
//!
//! Internal plumbing (I/O, (de)serialization, parsing) uses `anyhow::Error`
//! with added context, the same way the rest of this codebase does.
//! Anything a caller needs to match on is returned as a [`RenterError`]
//! instead.

use crate::metadata::{ContractId, Nickname};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenterError {
    #[error("host {0} is offline")]
    HostOffline(ContractId),

    #[error("contract {0} has ended")]
    ContractEnded(ContractId),

    #[error("insufficient hosts available to place {needed} pieces (found {found})")]
    InsufficientHosts { needed: usize, found: usize },

    #[error("insufficient redundancy: need {needed} reachable pieces, have {have}")]
    InsufficientRedundancy { needed: usize, have: usize },

    #[error("no local source available to repair chunk {chunk} of {nickname}")]
    NoLocalSource { nickname: Nickname, chunk: usize },

    #[error("piece integrity check failed for chunk {chunk} piece {piece}")]
    IntegrityFailure { chunk: usize, piece: usize },

    #[error("file '{0}' not found")]
    UnknownFile(Nickname),

    #[error("file '{0}' already exists")]
    DuplicateNickname(Nickname),

    #[error("renter is shutting down")]
    ShuttingDown,
}

pub type RenterResult<T> = Result<T, RenterError>;
