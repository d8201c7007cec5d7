//! Domain-level error taxonomy.

use thiserror::Error;

/// Errors raised by domain invariants: malformed ids, bad names, illegal
/// state transitions. None of these ever cross a tick boundary unhandled —
/// callers in `ambonmud-engine` map them to typed `SendError` events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("id '{0}' is missing the ':' zone separator")]
    MalformedId(String),

    #[error("name must be 2-16 alphanumeric/underscore characters, not starting with a digit")]
    InvalidName,

    #[error("password must not be blank and must fit within {max} characters")]
    InvalidPassword { max: usize },

    #[error("{0} is already engaged in a fight")]
    AlreadyEngaged(String),

    #[error("no target matching '{0}' found here")]
    NoSuchTarget(String),

    #[error("unknown ability '{0}'")]
    UnknownAbility(String),

    #[error("insufficient mana: have {have}, need {need}")]
    InsufficientMana { have: i32, need: i32 },

    #[error("ability on cooldown, {remaining_ms}ms remaining")]
    OnCooldown { remaining_ms: i64 },

    #[error("item instance '{0}' is already placed")]
    ItemAlreadyPlaced(String),

    #[error("unknown target type '{0}' for ability definition")]
    UnknownTargetType(String),

    #[error("unknown effect kind '{0}' for ability definition")]
    UnknownEffectKind(String),

    #[error("invalid ability definition '{0}': {1}")]
    InvalidAbilityDefinition(String, String),
}
