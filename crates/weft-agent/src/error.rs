use thiserror::Error;

/// Why a method (or a whole class) could not be instrumented.
///
/// Key-provider variants are configuration errors: the registry asked for a
/// key the instrumented method cannot supply. They surface per method; the
/// dispatcher degrades the affected class to "unchanged" rather than
/// blocking class loading.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error(transparent)]
    ClassFormat(#[from] weft_classfile::Error),
    #[error("key provider requires an instance method")]
    KeyRequiresInstance,
    #[error("slot {slot} of `{descriptor}` does not hold a reference parameter")]
    KeyParamUnavailable { slot: u16, descriptor: String },
}
