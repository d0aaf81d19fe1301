use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write as _},
    path::Path,
};

use anyhow::Context as _;

use crate::{
    annotation::record::RecordDocument,
    foundation::error::{PasteError, PasteResult},
};

/// Ordered, fixed list of class names; a class's index is its position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassIndex {
    names: Vec<String>,
}

impl ClassIndex {
    pub fn new(names: Vec<String>) -> PasteResult<Self> {
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(PasteError::config(format!(
                    "class '{name}' is listed more than once in the class index list"
                )));
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, category: &str) -> PasteResult<usize> {
        self.names.iter().position(|n| n == category).ok_or_else(|| {
            PasteError::config(format!(
                "category '{category}' is not registered in the class index list {:?}",
                self.names
            ))
        })
    }
}

/// One label line: class index plus center/size normalized to `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedBox {
    pub class_index: usize,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    /// Scale back to pixel `(xmin, ymin, xmax, ymax)`.
    pub fn to_pixels(&self, bg_width: u32, bg_height: u32) -> (f64, f64, f64, f64) {
        let w = f64::from(bg_width);
        let h = f64::from(bg_height);
        let cx = self.center_x * w;
        let cy = self.center_y * h;
        let bw = self.width * w;
        let bh = self.height * h;
        (cx - bw / 2.0, cy - bh / 2.0, cx + bw / 2.0, cy + bh / 2.0)
    }
}

impl fmt::Display for NormalizedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.class_index, self.center_x, self.center_y, self.width, self.height
        )
    }
}

/// Normalize every quad of every category listed in `exist_category`.
pub fn normalize_document(
    doc: &RecordDocument,
    classes: &ClassIndex,
) -> PasteResult<Vec<NormalizedBox>> {
    let bg_w = f64::from(doc.bg_img_info.bg_width);
    let bg_h = f64::from(doc.bg_img_info.bg_height);
    if bg_w <= 0.0 || bg_h <= 0.0 {
        return Err(PasteError::config(format!(
            "record '{}' has an empty background size",
            doc.bg_img_info.img_name
        )));
    }

    let mut out = Vec::new();
    for category in &doc.exist_category {
        let Some(quads) = doc.instances.get(category) else {
            continue;
        };
        for quad in quads {
            let class_index = classes.index_of(category)?;
            let b = quad.bounds();
            out.push(NormalizedBox {
                class_index,
                center_x: (b.xmin + b.xmax) / 2.0 / bg_w,
                center_y: (b.ymin + b.ymax) / 2.0 / bg_h,
                width: b.width() / bg_w,
                height: b.height() / bg_h,
            });
        }
    }
    Ok(out)
}

pub fn write_labels(path: &Path, boxes: &[NormalizedBox]) -> PasteResult<()> {
    let f = File::create(path).with_context(|| format!("create label file '{}'", path.display()))?;
    let mut w = BufWriter::new(f);
    for b in boxes {
        writeln!(w, "{b}").with_context(|| format!("write label file '{}'", path.display()))?;
    }
    w.flush()
        .with_context(|| format!("flush label file '{}'", path.display()))?;
    Ok(())
}

pub fn write_document(path: &Path, doc: &RecordDocument) -> PasteResult<()> {
    let f = File::create(path).with_context(|| format!("create record '{}'", path.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, doc)?;
    w.flush()
        .with_context(|| format!("flush record '{}'", path.display()))?;
    Ok(())
}
