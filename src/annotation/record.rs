use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::Context as _;

use crate::foundation::{
    core::{PixelSize, Quad},
    error::PasteResult,
};

/// Annotations placed on one background.
///
/// Owned by the processing step of that background and never shared between
/// backgrounds. A category is listed in `exist_category` exactly when it has at
/// least one quad.
#[derive(Clone, Debug, PartialEq)]
pub struct BackgroundRecord {
    image_name: String,
    size: PixelSize,
    instances: BTreeMap<String, Vec<Quad>>,
    exist_category: Vec<String>,
}

impl BackgroundRecord {
    pub fn new(image_name: impl Into<String>, size: PixelSize) -> Self {
        Self {
            image_name: image_name.into(),
            size,
            instances: BTreeMap::new(),
            exist_category: Vec::new(),
        }
    }

    /// Seed a record with objects already annotated on the background.
    ///
    /// Categories without quads are dropped; categories with quads missing from
    /// the prior `exist_category` list are appended in map order.
    pub fn from_prior(
        image_name: impl Into<String>,
        size: PixelSize,
        prior: &PriorAnnotation,
    ) -> Self {
        let mut out = Self::new(image_name, size);
        let listed = prior
            .exist_category
            .iter()
            .chain(prior.instances.keys())
            .cloned()
            .collect::<Vec<_>>();
        for category in listed {
            if out.instances.contains_key(&category) {
                continue;
            }
            let Some(quads) = prior.instances.get(&category) else {
                continue;
            };
            for quad in quads {
                out.record(&category, *quad);
            }
        }
        out
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    pub fn instances(&self) -> &BTreeMap<String, Vec<Quad>> {
        &self.instances
    }

    pub fn exist_category(&self) -> &[String] {
        &self.exist_category
    }

    pub fn is_empty(&self) -> bool {
        self.exist_category.is_empty()
    }

    pub fn placed_count(&self) -> usize {
        self.instances.values().map(Vec::len).sum()
    }

    /// Append a successfully placed quad.
    pub fn record(&mut self, category: &str, quad: Quad) {
        self.instances
            .entry(category.to_string())
            .or_default()
            .push(quad);
        if !self.exist_category.iter().any(|c| c == category) {
            self.exist_category.push(category.to_string());
        }
    }

    /// Every quad across every category.
    pub fn all_quads(&self) -> impl Iterator<Item = &Quad> + Clone + '_ {
        self.instances.values().flatten()
    }

    /// Quads belonging to `categories`; unknown categories contribute nothing.
    pub fn quads_in<'a>(&'a self, categories: &'a [String]) -> impl Iterator<Item = &'a Quad> + 'a {
        categories
            .iter()
            .filter_map(|c| self.instances.get(c))
            .flatten()
    }

    pub fn to_document(&self) -> RecordDocument {
        RecordDocument {
            bg_img_info: BgImgInfo {
                img_name: self.image_name.clone(),
                bg_width: self.size.width,
                bg_height: self.size.height,
            },
            instances: self.instances.clone(),
            exist_category: self.exist_category.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BgImgInfo {
    pub img_name: String,
    pub bg_width: u32,
    pub bg_height: u32,
}

/// On-disk JSON shape of a finished [`BackgroundRecord`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RecordDocument {
    pub bg_img_info: BgImgInfo,
    pub instances: BTreeMap<String, Vec<Quad>>,
    pub exist_category: Vec<String>,
}

impl RecordDocument {
    pub fn read(path: &Path) -> PasteResult<Self> {
        let f = File::open(path).with_context(|| format!("open record '{}'", path.display()))?;
        Ok(serde_json::from_reader(BufReader::new(f))?)
    }
}

/// One entry of a pre-existing annotation list.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriorAnnotation {
    pub img_name: String,
    #[serde(default)]
    pub instances: BTreeMap<String, Vec<Quad>>,
    #[serde(default)]
    pub exist_category: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct PriorAnnotations {
    by_name: BTreeMap<String, PriorAnnotation>,
}

impl PriorAnnotations {
    pub fn from_entries(entries: Vec<PriorAnnotation>) -> Self {
        let by_name = entries
            .into_iter()
            .map(|e| (e.img_name.clone(), e))
            .collect();
        Self { by_name }
    }

    pub fn read(path: &Path) -> PasteResult<Self> {
        let f = File::open(path)
            .with_context(|| format!("open prior annotations '{}'", path.display()))?;
        let entries: Vec<PriorAnnotation> = serde_json::from_reader(BufReader::new(f))?;
        Ok(Self::from_entries(entries))
    }

    pub fn get(&self, img_name: &str) -> Option<&PriorAnnotation> {
        self.by_name.get(img_name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Start the record for a background, seeded from the prior entry for
    /// `source_name` if any. The record itself is named `image_name`.
    pub fn start_record(
        &self,
        source_name: &str,
        image_name: &str,
        size: PixelSize,
    ) -> BackgroundRecord {
        match self.get(source_name) {
            Some(prior) => BackgroundRecord::from_prior(image_name, size, prior),
            None => BackgroundRecord::new(image_name, size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::PixelPos;

    fn rect(x: u32, y: u32, w: u32, h: u32) -> Quad {
        Quad::from_rect(PixelPos::new(x, y), PixelSize::new(w, h))
    }

    #[test]
    fn record_appends_and_tracks_categories_once() {
        let mut rec = BackgroundRecord::new("bg.png", PixelSize::new(100, 100));
        assert!(rec.is_empty());

        rec.record("car", rect(0, 0, 10, 10));
        rec.record("person", rect(20, 20, 5, 5));
        rec.record("car", rect(40, 40, 10, 10));

        assert_eq!(rec.exist_category(), ["car", "person"]);
        assert_eq!(rec.instances()["car"].len(), 2);
        assert_eq!(rec.placed_count(), 3);
        assert_eq!(rec.all_quads().count(), 3);
    }

    #[test]
    fn quads_in_skips_unknown_categories() {
        let mut rec = BackgroundRecord::new("bg.png", PixelSize::new(100, 100));
        rec.record("car", rect(0, 0, 10, 10));
        let cats = vec!["car".to_string(), "boat".to_string()];
        assert_eq!(rec.quads_in(&cats).count(), 1);
    }

    #[test]
    fn document_has_expected_json_shape() {
        let mut rec = BackgroundRecord::new("bg.png", PixelSize::new(640, 480));
        rec.record("car", rect(1, 2, 3, 4));
        let v = serde_json::to_value(rec.to_document()).unwrap();
        assert_eq!(v["bg_img_info"]["img_name"], "bg.png");
        assert_eq!(v["bg_img_info"]["bg_width"], 640);
        assert_eq!(v["bg_img_info"]["bg_height"], 480);
        assert_eq!(v["exist_category"][0], "car");
        assert_eq!(v["instances"]["car"][0].as_array().unwrap().len(), 8);
    }

    #[test]
    fn prior_entries_seed_record_and_restore_invariant() {
        let json = r#"[
            {"img_name": "a.jpg",
             "instances": {"plane": [[0,0,10,0,10,10,0,10]], "ship": []},
             "exist_category": ["ship", "plane"]},
            {"img_name": "b.jpg",
             "instances": {"car": [[5,5,9,5,9,9,5,9]]}}
        ]"#;
        let entries: Vec<PriorAnnotation> = serde_json::from_str(json).unwrap();
        let priors = PriorAnnotations::from_entries(entries);
        assert_eq!(priors.len(), 2);

        let a = priors.start_record("a.jpg", "a.png", PixelSize::new(100, 100));
        assert_eq!(a.image_name(), "a.png");
        assert_eq!(a.exist_category(), ["plane"]);
        assert!(!a.instances().contains_key("ship"));

        let b = priors.start_record("b.jpg", "b.png", PixelSize::new(100, 100));
        assert_eq!(b.exist_category(), ["car"]);

        let c = priors.start_record("c.jpg", "c.png", PixelSize::new(100, 100));
        assert!(c.is_empty());
    }
}
