use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

/// Class-load interception callback registered with the hosting runtime.
///
/// Invoked by the runtime's class-loading machinery, potentially
/// concurrently across independent classes; implementations must be
/// re-entrant and hold no per-call mutable state.
pub trait ClassFileTransformer: Send + Sync {
    /// Returns replacement bytes for the class, or `None` to signal
    /// "unchanged". `class_name` is the internal form (`java/lang/Thread`).
    fn transform(&self, class_name: &str, class_bytes: &[u8]) -> Option<Vec<u8>>;
}

#[derive(Debug, Error)]
pub enum RetransformError {
    #[error("class not found: {0}")]
    ClassNotFound(String),
    #[error("class cannot be redefined: {0}")]
    NotModifiable(String),
    #[error("redefinition rejected for {class}: {reason}")]
    Rejected { class: String, reason: String },
}

/// The hosting runtime's instrumentation facility, consumed through this
/// boundary and never implemented by the engine.
pub trait Instrumentation: Send + Sync {
    /// Appends a support library to the process-wide code search path.
    fn append_to_search_path(&self, path: &Path) -> io::Result<()>;

    /// Registers a transformer for subsequent class loads and
    /// retransformations.
    fn add_transformer(&self, transformer: Arc<dyn ClassFileTransformer>);

    /// Enumerates currently loaded classes, internal names.
    fn loaded_class_names(&self) -> Vec<String>;

    /// Synchronously re-presents one loaded class to the registered
    /// transformers; blocks until the runtime completes the redefinition.
    fn retransform_class(&self, class_name: &str) -> Result<(), RetransformError>;
}
