// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Building a composition from a scene description.
//!
//! A [`SceneDescription`] lists layers bottom first. Each
//! [`LayerDescriptor`] names a layer type, a source (URL or file name) and a
//! normalized placement. Descriptors deserialize with `serde` from any
//! format the host prefers; JSON looks like:
//!
//! ```json
//! {
//!   "layers": [
//!     { "type": "image", "src": "background.png" },
//!     { "type": "web", "src": "https://example.com", "want_input": true,
//!       "left": 0.25, "top": 0.25, "width": 0.5, "height": 0.5 }
//!   ]
//! }
//! ```
//!
//! Layer construction is delegated to a [`LayerFactory`]. Descriptors that
//! fail validation or that the factory rejects are skipped; the rest are
//! still built.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::composition::Composition;
use crate::geometry::Rect;
use crate::gpu::{Backend, GpuError};
use crate::layer::LayerRef;

/// One layer of a scene.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayerDescriptor {
    /// Layer type, for example `"web"` or `"image"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// URL or file name the layer shows.
    pub src: String,
    /// Whether the layer takes input.
    pub want_input: bool,
    /// Whether a web layer should also dump its page source.
    pub view_source: bool,
    /// Normalized left edge.
    pub left: f32,
    /// Normalized top edge.
    pub top: f32,
    /// Normalized width.
    pub width: f32,
    /// Normalized height.
    pub height: f32,
}

impl Default for LayerDescriptor {
    fn default() -> Self {
        Self {
            kind: String::new(),
            src: String::new(),
            want_input: false,
            view_source: false,
            left: 0.0,
            top: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }
}

impl LayerDescriptor {
    /// Normalized placement.
    #[must_use]
    pub fn placement(&self) -> Rect {
        Rect::new(self.left, self.top, self.width, self.height)
    }

    /// Checks that the required fields are present.
    pub fn validate(&self) -> Result<(), SceneError> {
        if self.kind.trim().is_empty() {
            return Err(SceneError::MissingKind);
        }
        if self.src.trim().is_empty() {
            return Err(SceneError::MissingSource {
                kind: self.kind.clone(),
            });
        }
        Ok(())
    }
}

/// An ordered list of layers, bottom first.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SceneDescription {
    /// Layer descriptors.
    #[serde(default)]
    pub layers: Vec<LayerDescriptor>,
}

/// Why a descriptor produced no layer.
#[derive(Debug, Error)]
pub enum SceneError {
    /// `type` is missing or empty.
    #[error("layer has no type")]
    MissingKind,
    /// `src` is missing or empty.
    #[error("{kind} layer has no source")]
    MissingSource {
        /// The descriptor's type.
        kind: String,
    },
    /// The factory does not know the type.
    #[error("unknown layer type `{0}`")]
    UnknownKind(String),
    /// The factory could not load the source.
    #[error("cannot load `{src}`: {reason}")]
    Source {
        /// The descriptor's source.
        src: String,
        /// What went wrong.
        reason: String,
    },
    /// A GPU resource could not be created.
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Creates layers for validated descriptors.
///
/// Implemented for closures taking the composition and the descriptor.
pub trait LayerFactory<B: Backend> {
    /// Builds the layer `descriptor` describes. The caller adds it to
    /// `composition` and places it.
    fn create_layer(
        &self,
        composition: &Arc<Composition<B>>,
        descriptor: &LayerDescriptor,
    ) -> Result<LayerRef<B>, SceneError>;
}

impl<B, F> LayerFactory<B> for F
where
    B: Backend,
    F: Fn(&Arc<Composition<B>>, &LayerDescriptor) -> Result<LayerRef<B>, SceneError>,
{
    fn create_layer(
        &self,
        composition: &Arc<Composition<B>>,
        descriptor: &LayerDescriptor,
    ) -> Result<LayerRef<B>, SceneError> {
        self(composition, descriptor)
    }
}

/// Adds the layers of `scene` to `composition` in order and moves each to
/// its placement.
///
/// Returns how many layers were added.
pub fn build_composition<B: Backend>(
    scene: &SceneDescription,
    composition: &Arc<Composition<B>>,
    factory: &dyn LayerFactory<B>,
) -> usize {
    let mut built = 0;
    for (index, descriptor) in scene.layers.iter().enumerate() {
        let layer = descriptor
            .validate()
            .and_then(|()| factory.create_layer(composition, descriptor));
        match layer {
            Ok(layer) => {
                if composition.add_layer(Arc::clone(&layer)) {
                    layer.move_to(descriptor.placement());
                    built += 1;
                }
            }
            Err(err) => {
                tracing::warn!(index, %err, "skipping layer");
            }
        }
    }
    tracing::info!(built, total = scene.layers.len(), "scene built");
    built
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::CompositionConfig;
    use crate::gpu::PixelFormat;
    use crate::headless::HeadlessBackend;
    use crate::layer::ImageLayer;
    use crate::time::{Clock, HostTime, ManualClock};

    fn composition() -> Arc<Composition<HeadlessBackend>> {
        Composition::new(
            Arc::new(HeadlessBackend::new()),
            CompositionConfig::new(100, 100),
            Arc::new(ManualClock::new(HostTime(0))) as Arc<dyn Clock>,
        )
    }

    fn image_factory(
        comp: &Arc<Composition<HeadlessBackend>>,
        descriptor: &LayerDescriptor,
    ) -> Result<LayerRef<HeadlessBackend>, SceneError> {
        match descriptor.kind.as_str() {
            "image" => {
                let layer = ImageLayer::from_pixels(
                    Arc::clone(comp.backend()),
                    1,
                    1,
                    &[0, 0, 0, 255],
                    PixelFormat::Rgba8,
                )?;
                Ok(Arc::new(layer))
            }
            "broken" => Err(SceneError::Source {
                src: descriptor.src.clone(),
                reason: "not found".into(),
            }),
            other => Err(SceneError::UnknownKind(other.into())),
        }
    }

    #[test]
    fn placement_defaults_to_full() {
        let scene: SceneDescription =
            serde_json::from_str(r#"{ "layers": [ { "type": "image", "src": "a.png" } ] }"#)
                .unwrap();
        let d = &scene.layers[0];
        assert_eq!(d.placement(), Rect::FULL);
        assert!(!d.want_input);
        assert!(!d.view_source);
    }

    #[test]
    fn parses_explicit_fields() {
        let d: LayerDescriptor = serde_json::from_str(
            r#"{ "type": "web", "src": "https://example.com", "want_input": true,
                 "view_source": true, "left": 0.25, "top": 0.5, "width": 0.5, "height": 0.25 }"#,
        )
        .unwrap();
        assert_eq!(d.kind, "web");
        assert!(d.want_input);
        assert!(d.view_source);
        assert_eq!(d.placement(), Rect::new(0.25, 0.5, 0.5, 0.25));
    }

    #[test]
    fn missing_layers_is_an_empty_scene() {
        let scene: SceneDescription = serde_json::from_str("{}").unwrap();
        assert!(scene.layers.is_empty());
    }

    #[test]
    fn invalid_descriptors_are_skipped() {
        let scene: SceneDescription = serde_json::from_str(
            r#"{ "layers": [
                { "type": "image", "src": "bg.png" },
                { "src": "no-type.png" },
                { "type": "image" },
                { "type": "video", "src": "clip.mp4" },
                { "type": "broken", "src": "gone.png" },
                { "type": "image", "src": "top.png", "left": 0.5, "width": 0.5 }
            ] }"#,
        )
        .unwrap();
        let comp = composition();

        let built = build_composition(&scene, &comp, &image_factory);

        assert_eq!(built, 2, "only the two valid image layers");
        let layers = comp.layers();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].bounds(), Rect::FULL);
        assert_eq!(layers[1].bounds(), Rect::new(0.5, 0.0, 0.5, 1.0));
        assert!(layers[1].composition().is_some(), "attached");
    }

    #[test]
    fn validation_errors_name_the_problem() {
        let d = LayerDescriptor {
            kind: "web".into(),
            ..LayerDescriptor::default()
        };
        assert_eq!(d.validate().unwrap_err().to_string(), "web layer has no source");
        assert!(matches!(
            LayerDescriptor::default().validate(),
            Err(SceneError::MissingKind)
        ));
    }
}
