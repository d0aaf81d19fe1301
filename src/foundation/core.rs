#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of<I: image::GenericImageView>(img: &I) -> Self {
        let (width, height) = img.dimensions();
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when `self` is larger than `outer` along either axis.
    pub fn exceeds(self, outer: PixelSize) -> bool {
        self.width > outer.width || self.height > outer.height
    }
}

impl From<PixelSize> for (u32, u32) {
    fn from(s: PixelSize) -> Self {
        (s.width, s.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelPos {
    pub x: u32,
    pub y: u32,
}

impl PixelPos {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned extents of a quad.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Bounds {
    pub fn width(self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(self) -> f64 {
        self.ymax - self.ymin
    }
}

/// Four explicit corners `[x1, y1, .., x4, y4]`, clockwise from top-left.
///
/// Serialized as a flat array of eight numbers; whole-valued corners are
/// written as integers.
#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize)]
#[serde(transparent)]
pub struct Quad(pub [f64; 8]);

/// Largest magnitude below which every whole `f64` is an exact `i64`.
const EXACT_INT_LIMIT: f64 = 9_007_199_254_740_992.0;

impl serde::Serialize for Quad {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeTuple as _;

        let mut tup = serializer.serialize_tuple(self.0.len())?;
        for v in self.0 {
            if v.fract() == 0.0 && v.abs() < EXACT_INT_LIMIT {
                tup.serialize_element(&(v as i64))?;
            } else {
                tup.serialize_element(&v)?;
            }
        }
        tup.end()
    }
}

impl Quad {
    pub fn from_rect(pos: PixelPos, size: PixelSize) -> Self {
        let x = f64::from(pos.x);
        let y = f64::from(pos.y);
        let r = x + f64::from(size.width);
        let b = y + f64::from(size.height);
        Self([x, y, r, y, r, b, x, b])
    }

    pub fn corners(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.0.chunks_exact(2).map(|c| (c[0], c[1]))
    }

    pub fn bounds(&self) -> Bounds {
        let mut out = Bounds {
            xmin: f64::INFINITY,
            ymin: f64::INFINITY,
            xmax: f64::NEG_INFINITY,
            ymax: f64::NEG_INFINITY,
        };
        for (x, y) in self.corners() {
            out.xmin = out.xmin.min(x);
            out.ymin = out.ymin.min(y);
            out.xmax = out.xmax.max(x);
            out.ymax = out.ymax.max(y);
        }
        out
    }
}
