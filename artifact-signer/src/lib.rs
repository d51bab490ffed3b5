//! Artifact Signature Service
//!
//! Detached Ed25519 signatures for release artifacts, plus threshold
//! multi-signature collection.
//!
//! Components:
//! - [`Signer`]: sign data and files, batch signing
//! - [`Verifier`]: single, file, batch, chain and archive verification
//! - [`MultiSignatureManager`]: session lifecycle with expiry
//! - [`BatchSigner`]: heterogeneous batch execution
//! - [`SignatureService`]: facade over all of the above
//!
//! Infrastructure:
//! - [`ErrorRecoveryManager`]: per-error-code recovery and retry
//! - [`AsyncOperationManager`]: bounded queue with per-task timeout
//!
//! Key custody and trust evaluation are collaborators behind the
//! [`KeyManager`] and [`TrustManager`] traits.

pub mod async_ops;
pub mod batch;
pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod multisig;
pub mod persist;
pub mod recovery;
pub mod service;
pub mod session;
pub mod signer;
pub mod store;
pub mod trust;
pub mod types;
pub mod validation;
pub mod verifier;

pub use async_ops::{AsyncOperationManager, Priority, QueueStats};
pub use batch::{
    efficiency_score, optimize_batch, BatchOperation, BatchOperationDetail, BatchOptions,
    BatchResult, BatchSigner, BatchStats, OperationKind, OperationStatus,
};
pub use config::SignatureConfig;
pub use context::{Clock, ManualClock, ServiceContext, SystemClock};
pub use crypto::{fingerprint, ArtifactSignature, ArtifactSigningKey, ArtifactVerifyingKey};
pub use error::{ErrorCode, ErrorKind, ErrorReport, SignatureError, SignatureResult};
pub use keys::{InMemoryKeyManager, KeyManager, KeyUsage};
pub use multisig::{
    AddSignatureOutcome, CleanupReport, ExportFormat, MultiSignatureManager, MultiSignatureStats,
    SessionExport,
};
pub use recovery::{ErrorRecoveryManager, RecoveryStats, RecoveryStrategy, RetryStrategy};
pub use service::{ServiceStats, SignatureService, SweeperHandle};
pub use session::{
    CloseReason, MultiSignatureArchive, MultiSignatureSession, SessionStatus,
    SessionStatusReport, SignatureEntry,
};
pub use signer::{BatchSignSummary, SignFileDetail, Signer};
pub use store::SessionStore;
pub use trust::{StaticTrustManager, TrustDecision, TrustManager};
pub use types::{
    signature_path_for, SignatureFile, SignatureFormat, SignatureMetadata, SignatureRecord,
    SignedFile, VerificationResult, VerifyOptions,
};
pub use validation::{DefaultPathValidator, PathValidation, PathValidator};
pub use verifier::{
    BatchVerifySummary, ChainLink, ChainVerification, FileVerification, MultiVerification,
    Verifier, VerifyStatus,
};
