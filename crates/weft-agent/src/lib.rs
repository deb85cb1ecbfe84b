//! Class-load-time instrumentation that lets a debugger stitch logical call
//! chains across async boundaries (thread hand-offs, executor submissions,
//! future callbacks).
//!
//! The engine rewrites method bodies as classes are presented for loading:
//! *capture points* (methods that schedule async work) get a prologue that
//! records the calling context under a correlation key, and *insert points*
//! (methods that resume that work) are wrapped so paired enter/exit hooks
//! run on every exit path. The hooks target an external correlation store;
//! nothing here records or persists the chains themselves.
//!
//! The hosting runtime's class-loading, introspection and redefinition
//! facilities are consumed through the [`Instrumentation`] trait, never
//! implemented here. [`MockRuntime`] is the deterministic in-memory double
//! used by the test suite.

#![forbid(unsafe_code)]

mod error;
mod keys;
mod mock;
mod registry;
mod rewrite;
mod runtime;
mod transform;

pub use crate::error::RewriteError;
pub use crate::keys::KeyProvider;
pub use crate::mock::MockRuntime;
pub use crate::registry::{
    CapturePoint, CapturePointRow, InsertPoint, KeySpec, Registry, RegistryHandle,
};
pub use crate::rewrite::{instrument_class, HOOK_DESCRIPTOR, SHADOW_SUFFIX, STORAGE_CLASS};
pub use crate::runtime::{ClassFileTransformer, Instrumentation, RetransformError};
pub use crate::transform::{AgentOptions, CaptureAgent, CaptureTransformer};
