//! Stub [`FeaturePackage`] implementations for exercising the dispatcher,
//! loader and agent.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Map, Value, json};

use suite_core::{CapabilityContext, FeaturePackage, PackageMetadata};

/// Returns its arguments unchanged as data.
#[derive(Debug)]
pub struct EchoPackage {
    meta: PackageMetadata,
}

impl EchoPackage {
    /// Echo package with id `id` and a single `echo` feature.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            meta: PackageMetadata::new(id).with_feature("echo", "Echo"),
        }
    }

    /// Echo package with custom metadata.
    #[must_use]
    pub fn with_meta(meta: PackageMetadata) -> Self {
        Self { meta }
    }
}

impl FeaturePackage for EchoPackage {
    fn meta(&self) -> &PackageMetadata {
        &self.meta
    }

    fn run(
        &self,
        _feature_id: &str,
        args: &Map<String, Value>,
        _ctx: &CapabilityContext,
    ) -> anyhow::Result<Value> {
        Ok(Value::Object(args.clone()))
    }
}

/// Always fails with an error.
#[derive(Debug)]
pub struct FailingPackage {
    meta: PackageMetadata,
}

impl FailingPackage {
    /// Failing package with id `id` and a single `fail` feature.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            meta: PackageMetadata::new(id).with_feature("fail", "Fail"),
        }
    }
}

impl FeaturePackage for FailingPackage {
    fn meta(&self) -> &PackageMetadata {
        &self.meta
    }

    fn run(
        &self,
        feature_id: &str,
        _args: &Map<String, Value>,
        _ctx: &CapabilityContext,
    ) -> anyhow::Result<Value> {
        anyhow::bail!("{feature_id} is broken")
    }
}

/// Panics inside `run`.
#[derive(Debug)]
pub struct PanickingPackage {
    meta: PackageMetadata,
}

impl PanickingPackage {
    /// Panicking package with id `id` and a single `boom` feature.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            meta: PackageMetadata::new(id).with_feature("boom", "Boom"),
        }
    }
}

impl FeaturePackage for PanickingPackage {
    fn meta(&self) -> &PackageMetadata {
        &self.meta
    }

    #[allow(clippy::panic)]
    fn run(
        &self,
        _feature_id: &str,
        _args: &Map<String, Value>,
        _ctx: &CapabilityContext,
    ) -> anyhow::Result<Value> {
        panic!("package bug")
    }
}

/// Sleeps in small steps, honoring `should_stop`, and counts its runs.
#[derive(Debug)]
pub struct SlowPackage {
    meta: PackageMetadata,
    delay: Duration,
    runs: Arc<AtomicUsize>,
}

impl SlowPackage {
    /// Slow package with id `id` and a single `wait` feature.
    #[must_use]
    pub fn new(id: &str, delay: Duration) -> Self {
        Self {
            meta: PackageMetadata::new(id).with_feature("wait", "Wait"),
            delay,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared handle to the run counter; incremented when a run starts.
    #[must_use]
    pub fn runs(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }
}

impl FeaturePackage for SlowPackage {
    fn meta(&self) -> &PackageMetadata {
        &self.meta
    }

    fn run(
        &self,
        _feature_id: &str,
        _args: &Map<String, Value>,
        ctx: &CapabilityContext,
    ) -> anyhow::Result<Value> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let step = Duration::from_millis(10);
        let mut waited = Duration::ZERO;
        while waited < self.delay {
            if ctx.should_stop() {
                return Ok(json!({ "success": false, "data": null, "message": "stopped" }));
            }
            std::thread::sleep(step);
            waited = waited.saturating_add(step);
        }
        Ok(json!({ "waited_ms": u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX) }))
    }
}
