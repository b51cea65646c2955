//! Packing pipeline: resolve, scale, plan, encode

use crate::document::SceneDocument;
use crate::error::{PackError, Result};
use crate::glb;
use crate::layout;
use crate::resource::{ResourceProvider, collect_requests};
use crate::scale::{ImageScaler, RasterScaler, ScaleRequest, scale_images};
use std::fmt;
use std::sync::Arc;

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Scaling,
    Planning,
    Encoding,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolving => "resolving",
            Stage::Scaling => "scaling",
            Stage::Planning => "planning",
            Stage::Encoding => "encoding",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Current stage of one run, logged on every transition
struct StageTracker {
    stage: Stage,
    label: String,
}

impl StageTracker {
    fn start(label: String) -> Self {
        tracing::debug!("[{}] {}", label, Stage::Resolving);
        Self {
            stage: Stage::Resolving,
            label,
        }
    }

    fn advance(&mut self, next: Stage) {
        tracing::debug!("[{}] {} -> {}", self.label, self.stage, next);
        self.stage = next;
    }

    fn fail(&self, error: PackError) -> PackError {
        if error.is_not_applicable() {
            tracing::debug!("[{}] skipped while {}: {}", self.label, self.stage, error);
        } else {
            tracing::debug!("[{}] failed while {}: {}", self.label, self.stage, error);
        }
        error
    }
}

/// Everything one pipeline run needs.
///
/// Holds its own copy of the document, so the caller's document is never
/// touched.
#[derive(Clone)]
pub struct PackRequest {
    document: SceneDocument,
    provider: ResourceProvider,
    scale: Option<ScaleRequest>,
    scaler: Arc<dyn ImageScaler>,
}

impl PackRequest {
    pub fn new(document: &SceneDocument, provider: ResourceProvider) -> Self {
        Self {
            document: document.clone(),
            provider,
            scale: None,
            scaler: Arc::new(RasterScaler::new()),
        }
    }

    pub fn with_scale(mut self, scale: Option<ScaleRequest>) -> Self {
        self.scale = scale;
        self
    }

    /// Replace the default `image`-backed scaler
    pub fn with_scaler(mut self, scaler: Arc<dyn ImageScaler>) -> Self {
        self.scaler = scaler;
        self
    }

    pub fn scale(&self) -> Option<ScaleRequest> {
        self.scale
    }

    fn label(&self) -> String {
        match self.scale {
            Some(scale) => format!("{}px", scale.edge()),
            None => "original".to_string(),
        }
    }

    /// Run every stage and return the GLB bytes
    pub async fn run(self) -> Result<Vec<u8>> {
        let mut tracker = StageTracker::start(self.label());
        let PackRequest {
            document,
            provider,
            scale,
            scaler,
        } = self;

        let requests = collect_requests(&document).map_err(|e| tracker.fail(e))?;
        let mut resources = provider
            .resolve_all(requests)
            .await
            .map_err(|e| tracker.fail(e))?;

        if let Some(scale) = scale {
            tracker.advance(Stage::Scaling);
            resources = tokio::task::spawn_blocking(move || {
                scale_images(&mut resources, scaler.as_ref(), scale).map(|()| resources)
            })
            .await
            .map_err(PackError::from)
            .and_then(|scaled| scaled)
            .map_err(|e| tracker.fail(e))?;
        }

        tracker.advance(Stage::Planning);
        let (document, plan) = layout::plan(document, &resources).map_err(|e| tracker.fail(e))?;

        tracker.advance(Stage::Encoding);
        let bytes = glb::encode(&document, &plan, &resources).map_err(|e| tracker.fail(e))?;

        tracker.advance(Stage::Done);
        Ok(bytes)
    }
}

/// Pack a document into a GLB container.
///
/// The document is copied; resources come from `provider`. With a scale
/// request, every PNG/JPEG image is shrunk to `edge` x `edge` first.
pub async fn pack_glb(
    document: &SceneDocument,
    provider: &ResourceProvider,
    scale: Option<ScaleRequest>,
) -> Result<Vec<u8>> {
    PackRequest::new(document, provider.clone())
        .with_scale(scale)
        .run()
        .await
}

/// A scaled output requested alongside the original
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSpec {
    pub suffix: String,
    pub scale: ScaleRequest,
}

impl VariantSpec {
    pub fn new(suffix: impl Into<String>, edge: u32) -> Result<Self> {
        Ok(Self {
            suffix: suffix.into(),
            scale: ScaleRequest::new(edge)?,
        })
    }
}

/// Result of one scaled variant
#[derive(Debug)]
pub enum VariantOutcome {
    Packed(Vec<u8>),
    /// Scaling would not shrink anything
    NotApplicable(String),
    /// Scaling failed for this variant only
    Failed(PackError),
}

impl VariantOutcome {
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            VariantOutcome::Packed(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// The original container plus one outcome per requested variant
#[derive(Debug)]
pub struct PackedVariants {
    pub original: Vec<u8>,
    pub variants: Vec<(VariantSpec, VariantOutcome)>,
}

/// Pack the original and every scaled variant concurrently.
///
/// Variant-local failures (nothing to scale, codec errors) are reported per
/// variant. Any other failure aborts the whole call.
pub async fn pack_variants(
    document: &SceneDocument,
    provider: &ResourceProvider,
    variants: &[VariantSpec],
) -> Result<PackedVariants> {
    pack_variants_with(document, provider, variants, Arc::new(RasterScaler::new())).await
}

/// [`pack_variants`] with a caller-supplied scaler
pub async fn pack_variants_with(
    document: &SceneDocument,
    provider: &ResourceProvider,
    variants: &[VariantSpec],
    scaler: Arc<dyn ImageScaler>,
) -> Result<PackedVariants> {
    let base = PackRequest::new(document, provider.clone()).with_scaler(scaler);

    let original = tokio::spawn(base.clone().run());
    let scaled: Vec<_> = variants
        .iter()
        .map(|spec| {
            let request = base.clone().with_scale(Some(spec.scale));
            (spec.clone(), tokio::spawn(request.run()))
        })
        .collect();

    let original = original.await?;

    let mut outcomes = Vec::with_capacity(scaled.len());
    let mut fatal = None;
    for (spec, handle) in scaled {
        let outcome = match handle.await? {
            Ok(bytes) => VariantOutcome::Packed(bytes),
            Err(PackError::ScaleNotApplicable(reason)) => VariantOutcome::NotApplicable(reason),
            Err(e) if e.is_variant_local() => VariantOutcome::Failed(e),
            Err(e) => {
                if fatal.is_none() {
                    tracing::debug!("Variant '{}' aborted the request", spec.suffix);
                    fatal = Some(e);
                }
                continue;
            }
        };
        outcomes.push((spec, outcome));
    }

    let original = original?;
    if let Some(e) = fatal {
        return Err(e);
    }

    Ok(PackedVariants {
        original,
        variants: outcomes,
    })
}
