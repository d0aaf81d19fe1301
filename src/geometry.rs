use crate::foundation::core::Quad;

/// Axis-aligned overlap test on the quads' bounding extents.
///
/// Two boxes overlap unless one is strictly separated from the other along x or
/// y, so boxes sharing an edge coordinate count as overlapping.
pub fn overlaps(a: &Quad, b: &Quad) -> bool {
    let a = a.bounds();
    let b = b.bounds();
    !(a.xmax < b.xmin || a.xmin > b.xmax || a.ymax < b.ymin || a.ymin > b.ymax)
}

/// True when `candidate` overlaps any quad in `existing`.
pub fn overlaps_any<'a>(candidate: &Quad, existing: impl IntoIterator<Item = &'a Quad>) -> bool {
    existing.into_iter().any(|q| overlaps(candidate, q))
}
