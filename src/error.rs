//! Error taxonomy for the sync engine.
//!
//! Every failure is recoverable: resources convert errors into slot state
//! (`last_error`) instead of propagating them into the view tree. The
//! variants follow the four families the application distinguishes:
//! session errors, remote-store errors, vendor errors and mutation
//! failures (which surface as the underlying store error after rollback).

use crate::filter::FilterError;
use crate::session::AuthError;
use crate::storage::StorageError;
use crate::store::StoreError;

/// Language used for user-facing error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Fr,
}

/// Classification of an error returned by a third-party API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorErrorKind {
    /// HTTP 429.
    RateLimited,
    /// HTTP 402.
    PaymentRequired,
    /// Anything else, passed through verbatim.
    Other,
}

/// Error returned by a third-party API (speech, LLM, geocoding, email...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("vendor error {status}: {message}")]
pub struct VendorError {
    pub status: u16,
    pub message: String,
}

impl VendorError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> VendorErrorKind {
        match self.status {
            429 => VendorErrorKind::RateLimited,
            402 => VendorErrorKind::PaymentRequired,
            _ => VendorErrorKind::Other,
        }
    }
}

/// Top-level error for cache, mutation and reconciliation operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Vendor(#[from] VendorError),

    /// A resource with the same identity is already mounted in the view.
    #[error("resource {identity} is already mounted in this view")]
    AlreadyMounted { identity: String },

    /// The owning view was torn down before the operation completed.
    #[error("resource {identity} was unmounted before the operation completed")]
    Detached { identity: String },

    /// A mutation worker stopped without reporting a result.
    #[error("mutation worker for {identity} exited unexpectedly")]
    WorkerLost { identity: String },
}

impl SyncError {
    /// Whether retrying the same operation may succeed: transport
    /// failures, constraint races and vendor rate limits. Everything else
    /// fails fast.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Store(StoreError::Network(_) | StoreError::Constraint { .. }) => true,
            SyncError::Vendor(v) => v.kind() == VendorErrorKind::RateLimited,
            _ => false,
        }
    }

    /// Message suitable for a toast shown to the user.
    ///
    /// Vendor errors other than 429/402 are passed through verbatim.
    pub fn user_message(&self, locale: Locale) -> String {
        let text = match (self, locale) {
            (SyncError::Auth(AuthError::NoSession), Locale::En) => "Please sign in to continue.",
            (SyncError::Auth(AuthError::NoSession), Locale::Fr) => {
                "Veuillez vous connecter pour continuer."
            }
            (SyncError::Auth(AuthError::Expired), Locale::En)
            | (SyncError::Store(StoreError::Unauthorized), Locale::En) => {
                "Your session has expired. Please sign in again."
            }
            (SyncError::Auth(AuthError::Expired), Locale::Fr)
            | (SyncError::Store(StoreError::Unauthorized), Locale::Fr) => {
                "Votre session a expiré. Veuillez vous reconnecter."
            }
            (SyncError::Store(StoreError::Constraint { .. }), Locale::En) => {
                "This item already exists."
            }
            (SyncError::Store(StoreError::Constraint { .. }), Locale::Fr) => {
                "Cet élément existe déjà."
            }
            (SyncError::Vendor(v), locale) => match (v.kind(), locale) {
                (VendorErrorKind::RateLimited, Locale::En) => {
                    "Too many requests, please try again in a moment."
                }
                (VendorErrorKind::RateLimited, Locale::Fr) => {
                    "Trop de requêtes, veuillez réessayer dans un instant."
                }
                (VendorErrorKind::PaymentRequired, Locale::En) => {
                    "Credits exhausted, please add credits to continue."
                }
                (VendorErrorKind::PaymentRequired, Locale::Fr) => {
                    "Crédits épuisés, veuillez recharger pour continuer."
                }
                (VendorErrorKind::Other, _) => return v.message.clone(),
            },
            (_, Locale::En) => "Something went wrong, please try again.",
            (_, Locale::Fr) => "Une erreur est survenue, veuillez réessayer.",
        };
        text.to_string()
    }
}
