use rand::Rng;

use crate::{
    annotation::record::BackgroundRecord,
    foundation::core::{PixelPos, PixelSize, Quad},
    geometry::overlaps_any,
};

/// Why a placement search produced no position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementMiss {
    /// The instance is larger than the background along some axis; nothing was sampled.
    DoesNotFit,
    /// Every sampled position collided with an existing box.
    Exhausted { attempts: u32 },
}

/// Bounded rejection sampling for a collision-free top-left corner.
///
/// Draws uniform positions that keep the whole instance inside the background
/// and returns the first whose box overlaps no existing quad. The search is
/// incomplete on purpose: it can miss a free spot that exists.
pub fn find_position<'a, R: Rng>(
    instance: PixelSize,
    background: PixelSize,
    existing: impl IntoIterator<Item = &'a Quad> + Clone,
    max_attempts: u32,
    rng: &mut R,
) -> Result<PixelPos, PlacementMiss> {
    if instance.exceeds(background) {
        return Err(PlacementMiss::DoesNotFit);
    }

    let max_x = background.width - instance.width;
    let max_y = background.height - instance.height;
    for attempt in 0..max_attempts {
        let pos = PixelPos::new(rng.random_range(0..=max_x), rng.random_range(0..=max_y));
        let candidate = Quad::from_rect(pos, instance);
        if !overlaps_any(&candidate, existing.clone()) {
            tracing::trace!(attempt, x = pos.x, y = pos.y, "placement accepted");
            return Ok(pos);
        }
    }
    Err(PlacementMiss::Exhausted {
        attempts: max_attempts,
    })
}

/// [`find_position`] against every quad of every category in `record`.
pub fn find_position_in<R: Rng>(
    instance: PixelSize,
    record: &BackgroundRecord,
    max_attempts: u32,
    rng: &mut R,
) -> Result<PixelPos, PlacementMiss> {
    find_position(
        instance,
        record.size(),
        record.all_quads(),
        max_attempts,
        rng,
    )
}
