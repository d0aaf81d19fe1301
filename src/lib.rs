#![forbid(unsafe_code)]
//! Copy-paste synthesis of object-detection training data.
//!
//! Instance crops are scaled, placed without overlap and pasted onto
//! backgrounds; every composite comes with a cumulative mask, a JSON box
//! record and a normalized label file.

pub mod annotation;
pub mod assets;
pub mod composite;
pub mod config;
pub mod foundation;
pub mod geometry;
pub mod pipeline;
pub mod placement;
pub mod project;
pub mod scale;

pub use annotation::export::{ClassIndex, NormalizedBox, normalize_document};
pub use annotation::record::{BackgroundRecord, PriorAnnotation, PriorAnnotations, RecordDocument};
pub use assets::mask::{MaskResolver, NoMasks, SiblingMaskFolder};
pub use composite::{MaskCanvas, Stencil, paste};
pub use config::{MaskChannels, PasteConfig, ResampleFilter, ScaleConfig};
pub use foundation::core::{Bounds, PixelPos, PixelSize, Quad};
pub use foundation::error::{PasteError, PasteResult};
pub use geometry::overlaps;
pub use pipeline::{
    BackgroundJob, BackgroundResult, InstanceRequest, PlacementOutcome, RunInputs, RunSummary,
    SkipReason, run,
};
pub use placement::{PlacementMiss, find_position};
pub use project::{OutputDirs, ProjectLayout, run_timestamp};
pub use scale::{ScaleMode, ScaleResolution, ScaleResolver};
