// Copyright 2025 Cowboy AI, LLC.

//! Error types for mixin registration, composition and dispatch

use thiserror::Error;

/// Errors that can occur while composing or invoking query mixins
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MixinError {
    /// A member was requested that the owner does not expose
    #[error("'{owner}' object has no attribute '{member}'")]
    MissingMember {
        /// Type name of the object the member was requested on
        owner: String,
        /// Name of the missing member
        member: String,
    },

    /// Registration attempted after the registry was frozen
    #[error("Registry is frozen: cannot register {fragment} for {anchor}")]
    RegistryFrozen {
        /// Anchor the fragment was meant for
        anchor: String,
        /// Name of the rejected fragment
        fragment: String,
    },

    /// A fragment method rejected its arguments
    #[error("Invalid arguments for {method}: {reason}")]
    InvalidArguments {
        /// Method that was called
        method: String,
        /// Why the arguments were rejected
        reason: String,
    },

    /// A fragment failed while running one of its methods or its default hook
    #[error("Fragment {fragment} failed: {message}")]
    FragmentFailure {
        /// Name of the failing fragment
        fragment: String,
        /// Failure description
        message: String,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for mixin operations
pub type MixinResult<T> = Result<T, MixinError>;

impl From<serde_json::Error> for MixinError {
    fn from(err: serde_json::Error) -> Self {
        MixinError::Configuration(err.to_string())
    }
}

impl MixinError {
    /// Create a missing member error
    pub fn missing_member(owner: impl Into<String>, member: impl Into<String>) -> Self {
        MixinError::MissingMember {
            owner: owner.into(),
            member: member.into(),
        }
    }

    /// Create an invalid arguments error
    pub fn invalid_arguments(method: impl Into<String>, reason: impl Into<String>) -> Self {
        MixinError::InvalidArguments {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Create a fragment failure error
    pub fn fragment_failure(fragment: impl Into<String>, message: impl Into<String>) -> Self {
        MixinError::FragmentFailure {
            fragment: fragment.into(),
            message: message.into(),
        }
    }

    /// Check if this is a missing member error
    pub fn is_missing_member(&self) -> bool {
        matches!(self, MixinError::MissingMember { .. })
    }

    /// Check if this error was caused by the registry lifecycle
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(self, MixinError::RegistryFrozen { .. })
    }
}
