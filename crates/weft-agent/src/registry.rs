use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::keys::KeyProvider;

/// "Invoking this method schedules async work." Matching is by method name
/// only; every overload sharing the name is instrumented identically (a
/// documented limitation, not an error).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePoint {
    pub class_name: String,
    pub method_name: String,
    pub key: KeyProvider,
}

/// "Invoking this method resumes previously scheduled work."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPoint {
    pub class_name: String,
    pub method_name: String,
    pub key: KeyProvider,
}

/// The configured capture/insert point sets, keyed by internal class name.
///
/// A `Registry` is immutable once published through a [`RegistryHandle`];
/// the `add_*` methods exist for building the initial table and replacement
/// tables, not for concurrent mutation.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    captures: HashMap<String, Vec<CapturePoint>>,
    inserts: HashMap<String, Vec<InsertPoint>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed built-in table: the JDK's common async hand-off sites.
    pub fn builtin() -> Self {
        let mut r = Self::new();

        r.add_capture_point("javax/swing/SwingUtilities", "invokeLater", KeyProvider::ParamSlot(0));
        r.add_insert_point(
            "java/awt/event/InvocationEvent",
            "dispatch",
            field_key("java/awt/event/InvocationEvent", "runnable", "Ljava/lang/Runnable;"),
        );

        r.add_capture_point("java/lang/Thread", "start", KeyProvider::ThisRef);
        r.add_insert_point("java/lang/Thread", "run", KeyProvider::ThisRef);

        r.add_capture_point("java/util/concurrent/ExecutorService", "submit", KeyProvider::ParamSlot(1));
        r.add_insert_point(
            "java/util/concurrent/Executors$RunnableAdapter",
            "call",
            field_key("java/util/concurrent/Executors$RunnableAdapter", "task", "Ljava/lang/Runnable;"),
        );

        r.add_capture_point("java/util/concurrent/ThreadPoolExecutor", "execute", KeyProvider::ParamSlot(1));
        r.add_insert_point("java/util/concurrent/FutureTask", "run", KeyProvider::ThisRef);

        r.add_capture_point("java/util/concurrent/CompletableFuture", "supplyAsync", KeyProvider::ParamSlot(0));
        r.add_insert_point(
            "java/util/concurrent/CompletableFuture$AsyncSupply",
            "run",
            field_key("java/util/concurrent/CompletableFuture$AsyncSupply", "fn", "Ljava/util/function/Supplier;"),
        );

        r.add_capture_point("java/util/concurrent/CompletableFuture", "runAsync", KeyProvider::ParamSlot(0));
        r.add_insert_point(
            "java/util/concurrent/CompletableFuture$AsyncRun",
            "run",
            field_key("java/util/concurrent/CompletableFuture$AsyncRun", "fn", "Ljava/lang/Runnable;"),
        );

        r.add_capture_point("java/util/concurrent/CompletableFuture", "thenAcceptAsync", KeyProvider::ParamSlot(1));
        r.add_insert_point("java/util/concurrent/CompletableFuture", "uniAccept", KeyProvider::ParamSlot(2));

        r.add_capture_point("java/util/concurrent/CompletableFuture", "thenRunAsync", KeyProvider::ParamSlot(1));
        r.add_insert_point("java/util/concurrent/CompletableFuture", "uniRun", KeyProvider::ParamSlot(2));

        r
    }

    pub fn add_capture_point(
        &mut self,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        key: KeyProvider,
    ) {
        let class_name = class_name.into();
        self.captures.entry(class_name.clone()).or_default().push(CapturePoint {
            class_name,
            method_name: method_name.into(),
            key,
        });
    }

    pub fn add_insert_point(
        &mut self,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        key: KeyProvider,
    ) {
        let class_name = class_name.into();
        self.inserts.entry(class_name.clone()).or_default().push(InsertPoint {
            class_name,
            method_name: method_name.into(),
            key,
        });
    }

    pub fn capture_points(&self, class_name: &str) -> &[CapturePoint] {
        self.captures.get(class_name).map_or(&[], Vec::as_slice)
    }

    pub fn insert_points(&self, class_name: &str) -> &[InsertPoint] {
        self.inserts.get(class_name).map_or(&[], Vec::as_slice)
    }

    pub fn contains_class(&self, class_name: &str) -> bool {
        self.captures.contains_key(class_name) || self.inserts.contains_key(class_name)
    }

    pub fn capture_class_names(&self) -> impl Iterator<Item = &str> {
        self.captures.keys().map(String::as_str)
    }

    /// A copy of this registry with the capture map replaced wholesale and
    /// the insert map carried over.
    pub fn with_capture_rows(&self, rows: &[CapturePointRow]) -> Registry {
        let mut next = Registry { captures: HashMap::new(), inserts: self.inserts.clone() };
        for row in rows {
            next.add_capture_point(
                row.class_name.clone(),
                row.method_name.clone(),
                row.key.clone().into_provider(),
            );
        }
        next
    }
}

/// Atomically published registry reference. Readers see either the whole
/// old mapping or the whole new one, never a mixture.
#[derive(Debug)]
pub struct RegistryHandle {
    inner: RwLock<Arc<Registry>>,
}

impl RegistryHandle {
    pub fn new(registry: Registry) -> Self {
        Self { inner: RwLock::new(Arc::new(registry)) }
    }

    pub fn get(&self) -> Arc<Registry> {
        self.inner.read().clone()
    }

    /// Publishes `registry` in one swap, returning the previous mapping.
    pub fn replace(&self, registry: Registry) -> Arc<Registry> {
        std::mem::replace(&mut *self.inner.write(), Arc::new(registry))
    }
}

/// One row of the runtime-reconfiguration payload used by an attached
/// debugger to replace the active capture-point set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePointRow {
    pub class_name: String,
    pub method_name: String,
    pub key: KeySpec,
}

/// Wire form of a [`KeyProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeySpec {
    This,
    Param { slot: u16 },
    #[serde(rename_all = "camelCase")]
    Field { class_name: String, field_name: String, descriptor: String },
}

impl KeySpec {
    pub fn into_provider(self) -> KeyProvider {
        match self {
            KeySpec::This => KeyProvider::ThisRef,
            KeySpec::Param { slot } => KeyProvider::ParamSlot(slot),
            KeySpec::Field { class_name, field_name, descriptor } => {
                KeyProvider::FieldRead { class_name, field_name, descriptor }
            }
        }
    }
}

fn field_key(class_name: &str, field_name: &str, descriptor: &str) -> KeyProvider {
    KeyProvider::FieldRead {
        class_name: class_name.to_string(),
        field_name: field_name.to_string(),
        descriptor: descriptor.to_string(),
    }
}
