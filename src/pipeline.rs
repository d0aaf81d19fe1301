use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use image::{GrayImage, RgbaImage};
use rand::{Rng, seq::index};

use crate::{
    annotation::{
        export::{ClassIndex, NormalizedBox, normalize_document, write_document, write_labels},
        record::{BackgroundRecord, PriorAnnotations},
    },
    assets::{
        decode::{BackgroundImage, load_background, load_instance, load_mask, save_composite},
        mask::MaskResolver,
    },
    composite::{MaskCanvas, paste},
    config::PasteConfig,
    foundation::{
        core::{PixelSize, Quad},
        error::{PasteError, PasteResult},
    },
    placement::{PlacementMiss, find_position_in},
    project::{InstanceSource, OutputDirs, ProjectLayout},
    scale::{ScaleResolution, ScaleResolver},
};

/// One instance to try on the current background.
#[derive(Clone, Copy, Debug)]
pub struct InstanceRequest<'a> {
    pub image: &'a RgbaImage,
    pub mask: Option<&'a GrayImage>,
    pub category: &'a str,
}

/// Why an instance was left out of a composite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The resolved scale rounds the instance down to zero pixels.
    DegenerateScale,
    /// The scaled instance is larger than the background.
    DoesNotFit,
    /// No collision-free position within the attempt bound.
    PlacementExhausted { attempts: u32 },
}

impl From<PlacementMiss> for SkipReason {
    fn from(miss: PlacementMiss) -> Self {
        match miss {
            PlacementMiss::DoesNotFit => Self::DoesNotFit,
            PlacementMiss::Exhausted { attempts } => Self::PlacementExhausted { attempts },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlacementOutcome {
    Placed {
        quad: Quad,
        resolution: ScaleResolution,
    },
    Skipped(SkipReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedInstance {
    pub category: String,
    pub reason: SkipReason,
}

/// Processing state of a single background.
///
/// Owns the composite, the cumulative mask and the annotation record for that
/// background only; [`BackgroundJob::finish`] consumes it.
pub struct BackgroundJob<'c> {
    scaler: ScaleResolver<'c>,
    max_attempts: u32,
    record: BackgroundRecord,
    composite: RgbaImage,
    has_alpha: bool,
    mask: Option<MaskCanvas>,
    placed: usize,
    skipped: Vec<SkippedInstance>,
}

impl<'c> BackgroundJob<'c> {
    pub fn new(
        config: &'c PasteConfig,
        background: BackgroundImage,
        record: BackgroundRecord,
    ) -> PasteResult<Self> {
        let size = background.size();
        if record.size() != size {
            return Err(PasteError::config(format!(
                "record for '{}' is {}x{} but the background is {}x{}",
                record.image_name(),
                record.size().width,
                record.size().height,
                size.width,
                size.height
            )));
        }
        let mask = (!config.mask_disabled).then(|| MaskCanvas::new(size, config.mask_channels));
        Ok(Self {
            scaler: ScaleResolver::new(&config.scaling)?,
            max_attempts: config.max_placement_attempts,
            record,
            composite: background.rgba,
            has_alpha: background.has_alpha,
            mask,
            placed: 0,
            skipped: Vec::new(),
        })
    }

    pub fn record(&self) -> &BackgroundRecord {
        &self.record
    }

    pub fn composite(&self) -> &RgbaImage {
        &self.composite
    }

    pub fn mask_canvas(&self) -> Option<&MaskCanvas> {
        self.mask.as_ref()
    }

    /// Scale, place and paste one instance.
    ///
    /// Skips leave the record untouched and are remembered for the report;
    /// only contract violations are returned as errors.
    pub fn place<R: Rng>(
        &mut self,
        req: InstanceRequest<'_>,
        rng: &mut R,
    ) -> PasteResult<PlacementOutcome> {
        let outcome = self.try_place(req, rng)?;
        match &outcome {
            PlacementOutcome::Placed { quad, .. } => {
                self.record.record(req.category, *quad);
                self.placed += 1;
            }
            PlacementOutcome::Skipped(reason) => {
                tracing::warn!(
                    background = self.record.image_name(),
                    category = req.category,
                    ?reason,
                    "instance skipped"
                );
                self.skipped.push(SkippedInstance {
                    category: req.category.to_string(),
                    reason: *reason,
                });
            }
        }
        Ok(outcome)
    }

    fn try_place<R: Rng>(
        &mut self,
        req: InstanceRequest<'_>,
        rng: &mut R,
    ) -> PasteResult<PlacementOutcome> {
        let bg_size = self.record.size();
        let intrinsic = PixelSize::of(req.image);

        let Some(resolution) = self.scaler.resolve(intrinsic, bg_size, &self.record, rng) else {
            return Ok(PlacementOutcome::Skipped(SkipReason::DegenerateScale));
        };
        let target = self.scaler.target_size(&resolution, intrinsic, bg_size);
        if target.is_empty() {
            return Ok(PlacementOutcome::Skipped(SkipReason::DegenerateScale));
        }

        let pos = match find_position_in(target, &self.record, self.max_attempts, rng) {
            Ok(pos) => pos,
            Err(miss) => return Ok(PlacementOutcome::Skipped(miss.into())),
        };

        let scaled = self.scaler.resize(req.image, req.mask, target, &resolution)?;
        let quad = paste(&scaled.image, &mut self.composite, pos, scaled.stencil())?;
        if let Some(canvas) = &mut self.mask {
            canvas.stamp(scaled.size(), pos, scaled.stencil())?;
        }
        tracing::debug!(
            background = self.record.image_name(),
            category = req.category,
            x = pos.x,
            y = pos.y,
            width = target.width,
            height = target.height,
            "instance placed"
        );

        Ok(PlacementOutcome::Placed { quad, resolution })
    }

    pub fn finish(self) -> BackgroundResult {
        if self.placed == 0 {
            tracing::warn!(
                background = self.record.image_name(),
                skipped = self.skipped.len(),
                "no instance could be placed; composite discarded"
            );
            return BackgroundResult::Discarded {
                image_name: self.record.image_name().to_string(),
                skipped: self.skipped,
            };
        }
        BackgroundResult::Finished(FinishedBackground {
            record: self.record,
            composite: self.composite,
            has_alpha: self.has_alpha,
            mask: self.mask,
            placed: self.placed,
            skipped: self.skipped,
        })
    }
}

#[derive(Debug)]
pub enum BackgroundResult {
    Finished(FinishedBackground),
    /// Nothing was placed; no files are written.
    Discarded {
        image_name: String,
        skipped: Vec<SkippedInstance>,
    },
}

#[derive(Debug)]
pub struct FinishedBackground {
    pub record: BackgroundRecord,
    pub composite: RgbaImage,
    pub has_alpha: bool,
    pub mask: Option<MaskCanvas>,
    pub placed: usize,
    pub skipped: Vec<SkippedInstance>,
}

#[derive(Clone, Debug)]
pub struct WrittenFiles {
    pub composite: PathBuf,
    pub mask: Option<PathBuf>,
    pub record: PathBuf,
    pub labels: PathBuf,
}

impl FinishedBackground {
    pub fn labels(&self, classes: &ClassIndex) -> PasteResult<Vec<NormalizedBox>> {
        normalize_document(&self.record.to_document(), classes)
    }

    /// Persist composite, mask, JSON record and label file.
    ///
    /// Labels are computed first so an unregistered category fails before any
    /// file of this background is written.
    pub fn write(&self, out: &OutputDirs, classes: &ClassIndex) -> PasteResult<WrittenFiles> {
        let labels = self.labels(classes)?;
        let stem = file_stem(self.record.image_name());

        let composite = out.composites.join(self.record.image_name());
        save_composite(&self.composite, self.has_alpha, &composite)?;

        let mask = match (&self.mask, &out.masks) {
            (Some(canvas), Some(dir)) => {
                let path = dir.join(self.record.image_name());
                canvas.save(&path)?;
                Some(path)
            }
            _ => None,
        };

        let record = out.labels.join(format!("{stem}.json"));
        write_document(&record, &self.record.to_document())?;
        let label_path = out.labels.join(format!("{stem}.txt"));
        write_labels(&label_path, &labels)?;

        Ok(WrittenFiles {
            composite,
            mask,
            record,
            labels: label_path,
        })
    }
}

fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Counters and discard list for a whole run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub backgrounds_written: usize,
    pub backgrounds_discarded: Vec<String>,
    pub instances_placed: usize,
    pub instances_skipped: usize,
}

/// Everything a run needs besides configuration and randomness.
pub struct RunInputs<'a> {
    pub project: &'a ProjectLayout,
    pub priors: &'a PriorAnnotations,
    pub masks: &'a dyn MaskResolver,
    pub out: &'a OutputDirs,
}

/// Categories used for the run and the class list their labels resolve against.
pub fn resolve_classes(
    config: &PasteConfig,
    project: &ProjectLayout,
) -> PasteResult<(Vec<String>, ClassIndex)> {
    let categories = match &config.instance_categories {
        Some(list) => list.clone(),
        None => project.categories()?,
    };
    let classes = match &config.class_index_list {
        Some(list) => ClassIndex::new(list.clone())?,
        None => {
            let mut sorted = categories.clone();
            sorted.sort();
            sorted.dedup();
            ClassIndex::new(sorted)?
        }
    };
    for category in &categories {
        classes.index_of(category)?;
    }
    Ok((categories, classes))
}

/// Keep a random subset of at most `limit` items, in their original order.
pub fn subsample<T, R: Rng>(items: Vec<T>, limit: Option<usize>, rng: &mut R) -> Vec<T> {
    let Some(limit) = limit else {
        return items;
    };
    if limit >= items.len() {
        return items;
    }
    let mut keep = index::sample(rng, items.len(), limit).into_vec();
    keep.sort_unstable();
    let mut keep = keep.into_iter().peekable();
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| {
            if keep.peek() == Some(&i) {
                keep.next();
                Some(item)
            } else {
                None
            }
        })
        .collect()
}

/// Random instance picks for one background, in paste order.
pub fn pick_instances<'p, R: Rng>(
    pool: &'p [InstanceSource],
    config: &PasteConfig,
    rng: &mut R,
) -> Vec<&'p InstanceSource> {
    if pool.is_empty() {
        return Vec::new();
    }
    let count = rng
        .random_range(config.min_instances_per_background..=config.max_instances_per_background)
        .min(pool.len());
    index::sample(rng, pool.len(), count)
        .into_iter()
        .map(|i| &pool[i])
        .collect()
}

/// Run the pipeline over every selected background of a project.
#[tracing::instrument(skip_all, fields(project = %inputs.project.root().display()))]
pub fn run<R: Rng>(
    config: &PasteConfig,
    inputs: &RunInputs<'_>,
    rng: &mut R,
) -> PasteResult<RunSummary> {
    config.validate()?;
    let (categories, classes) = resolve_classes(config, inputs.project)?;

    let backgrounds = inputs.project.backgrounds()?;
    check_output_names(&backgrounds)?;
    let backgrounds = subsample(backgrounds, config.background_limit, rng);
    let pool = subsample(
        inputs.project.instances(&categories)?,
        config.instance_limit,
        rng,
    );
    tracing::info!(
        backgrounds = backgrounds.len(),
        instances = pool.len(),
        categories = categories.len(),
        "starting run"
    );

    let mut summary = RunSummary::default();
    for bg_path in &backgrounds {
        match process_background(config, inputs, &classes, &pool, bg_path, rng)? {
            BackgroundReport::Written { placed, skipped } => {
                summary.backgrounds_written += 1;
                summary.instances_placed += placed;
                summary.instances_skipped += skipped;
            }
            BackgroundReport::Discarded { image_name, skipped } => {
                summary.backgrounds_discarded.push(image_name);
                summary.instances_skipped += skipped;
            }
        }
    }

    tracing::info!(
        written = summary.backgrounds_written,
        discarded = summary.backgrounds_discarded.len(),
        placed = summary.instances_placed,
        skipped = summary.instances_skipped,
        "run finished"
    );
    Ok(summary)
}

/// Composite name for a background source file: its stem with a `.png` extension.
pub fn output_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    format!("{stem}.png")
}

/// Reject backgrounds whose outputs would land on the same files.
pub fn check_output_names(backgrounds: &[PathBuf]) -> PasteResult<()> {
    let mut seen: BTreeMap<String, &Path> = BTreeMap::new();
    for path in backgrounds {
        let name = output_name(path);
        if let Some(first) = seen.insert(name.clone(), path) {
            return Err(PasteError::config(format!(
                "backgrounds '{}' and '{}' would both be written as '{name}'",
                first.display(),
                path.display()
            )));
        }
    }
    Ok(())
}

enum BackgroundReport {
    Written { placed: usize, skipped: usize },
    Discarded { image_name: String, skipped: usize },
}

#[tracing::instrument(skip_all, fields(background = %bg_path.display()))]
fn process_background<R: Rng>(
    config: &PasteConfig,
    inputs: &RunInputs<'_>,
    classes: &ClassIndex,
    pool: &[InstanceSource],
    bg_path: &Path,
    rng: &mut R,
) -> PasteResult<BackgroundReport> {
    let source_name = bg_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let image_name = output_name(bg_path);

    let background = load_background(bg_path)?;
    let record = inputs
        .priors
        .start_record(&source_name, &image_name, background.size());
    let mut job = BackgroundJob::new(config, background, record)?;

    for source in pick_instances(pool, config, rng) {
        let image = load_instance(&source.path)?;
        let mask = match inputs.masks.resolve(&source.path) {
            Some(mask_path) => Some(load_mask(&mask_path)?),
            None => {
                tracing::debug!(instance = %source.path.display(), "no mask; pasting opaquely");
                None
            }
        };
        job.place(
            InstanceRequest {
                image: &image,
                mask: mask.as_ref(),
                category: &source.category,
            },
            rng,
        )?;
    }

    match job.finish() {
        BackgroundResult::Finished(done) => {
            let files = done.write(inputs.out, classes)?;
            tracing::info!(
                composite = %files.composite.display(),
                placed = done.placed,
                skipped = done.skipped.len(),
                "background written"
            );
            Ok(BackgroundReport::Written {
                placed: done.placed,
                skipped: done.skipped.len(),
            })
        }
        BackgroundResult::Discarded {
            image_name,
            skipped,
        } => Ok(BackgroundReport::Discarded {
            image_name,
            skipped: skipped.len(),
        }),
    }
}
