//! The dispatch seam between the scheduler and the conversion functions.

use std::sync::Arc;

use async_trait::async_trait;
use cf_core::config::ToolsConfig;
use cf_core::{ConversionOptions, ConversionOutput, InputFile};
use parking_lot::Mutex;

use crate::convert;
use crate::progress::ProgressSender;
use crate::tools::ToolRegistry;

/// Something that can turn an [`InputFile`] into a [`ConversionOutput`].
///
/// Implementations must be safe to call concurrently and must report every
/// failure as an `Err`; the scheduler additionally guards against panics.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Convert `file`. The adapter kind is carried by `options`.
    async fn convert(
        &self,
        file: &InputFile,
        options: &ConversionOptions,
        progress: ProgressSender,
    ) -> cf_core::Result<ConversionOutput>;

    /// Drop any session state (cached tool lookups, warm instances).
    fn release(&self) {}
}

/// The production backend: dispatches on the options variant to the
/// matching conversion function.
///
/// External tools are discovered lazily on first use and cached until
/// [`ConversionBackend::release`] is called.
pub struct Adapters {
    tools_config: ToolsConfig,
    registry: Mutex<Option<Arc<ToolRegistry>>>,
}

impl Adapters {
    pub fn new(tools_config: ToolsConfig) -> Self {
        Self {
            tools_config,
            registry: Mutex::new(None),
        }
    }

    /// Use an already-built registry (mostly for tests).
    pub fn with_registry(tools_config: ToolsConfig, registry: ToolRegistry) -> Self {
        Self {
            tools_config,
            registry: Mutex::new(Some(Arc::new(registry))),
        }
    }

    /// The cached registry, discovering tools if there is none.
    pub fn registry(&self) -> Arc<ToolRegistry> {
        let mut slot = self.registry.lock();
        match slot.as_ref() {
            Some(registry) => Arc::clone(registry),
            None => {
                tracing::debug!("discovering external tools");
                let registry = Arc::new(ToolRegistry::discover(&self.tools_config));
                *slot = Some(Arc::clone(&registry));
                registry
            }
        }
    }

    /// Whether a tool registry is currently cached.
    pub fn has_session(&self) -> bool {
        self.registry.lock().is_some()
    }
}

#[async_trait]
impl ConversionBackend for Adapters {
    async fn convert(
        &self,
        file: &InputFile,
        options: &ConversionOptions,
        progress: ProgressSender,
    ) -> cf_core::Result<ConversionOutput> {
        match options {
            // Pure Rust; no tools needed.
            ConversionOptions::Image(o) => convert::convert_image(file, o, &progress).await,
            ConversionOptions::RawImage(o) => {
                convert::convert_raw(&self.registry(), file, o, &progress).await
            }
            ConversionOptions::Document(o) => {
                convert::convert_document(&self.registry(), file, o, &progress).await
            }
            ConversionOptions::Audio(o) => {
                convert::convert_audio(&self.registry(), file, o, &progress).await
            }
            ConversionOptions::Video(o) => {
                convert::convert_video(&self.registry(), file, o, &progress).await
            }
        }
    }

    fn release(&self) {
        if self.registry.lock().take().is_some() {
            tracing::debug!("released adapter session");
        }
    }
}
