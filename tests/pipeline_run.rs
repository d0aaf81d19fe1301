use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use rand::{SeedableRng, rngs::StdRng};
use synthpaste::{
    NoMasks, OutputDirs, PasteConfig, PriorAnnotation, PriorAnnotations, ProjectLayout, Quad,
    RecordDocument, RunInputs, SiblingMaskFolder, overlaps, run,
};

fn fresh_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_project(root: &Path, backgrounds: &[&str]) {
    let bgs = root.join("backgrounds");
    std::fs::create_dir_all(&bgs).unwrap();
    for name in backgrounds {
        RgbImage::from_pixel(320, 240, Rgb([20, 20, 20]))
            .save(bgs.join(name))
            .unwrap();
    }
    for (cat, color) in [("car", [200, 0, 0, 255]), ("person", [0, 0, 200, 255])] {
        let images = root.join("instances").join(cat).join("images");
        std::fs::create_dir_all(&images).unwrap();
        for i in 0..3 {
            RgbaImage::from_pixel(60 + i * 10, 40, Rgba(color))
                .save(images.join(format!("{cat}{i}.png")))
                .unwrap();
        }
    }
}

fn list(dir: &Path) -> Vec<String> {
    let mut out: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    out.sort();
    out
}

#[test]
fn seeded_run_is_reproducible_and_overlap_free() {
    let root = fresh_dir("pipeline_run_seeded");
    write_project(&root, &["a.png", "b.png"]);
    let project = ProjectLayout::new(&root);
    let config = PasteConfig {
        min_instances_per_background: 2,
        max_instances_per_background: 4,
        max_placement_attempts: 200,
        seed: Some(11),
        ..PasteConfig::default()
    };
    let priors = PriorAnnotations::default();

    let mut labels = Vec::new();
    for run_name in ["first", "second"] {
        let out = OutputDirs::create(&root.join(run_name), true).unwrap();
        let inputs = RunInputs {
            project: &project,
            priors: &priors,
            masks: &SiblingMaskFolder::default(),
            out: &out,
        };
        let mut rng = StdRng::seed_from_u64(11);
        let summary = run(&config, &inputs, &mut rng).unwrap();
        assert_eq!(summary.backgrounds_written, 2);
        assert!(summary.backgrounds_discarded.is_empty());
        assert!(summary.instances_placed >= 2);

        assert_eq!(list(&out.composites), ["a.png", "b.png"]);
        assert_eq!(
            list(&out.labels),
            ["a.json", "a.txt", "b.json", "b.txt"]
        );
        let masks = out.masks.as_ref().unwrap();
        let mask = image::open(masks.join("a.png")).unwrap().to_luma8();
        assert!(mask.pixels().any(|p| p.0[0] == 255));

        let doc = RecordDocument::read(&out.labels.join("a.json")).unwrap();
        let quads: Vec<&Quad> = doc.instances.values().flatten().collect();
        for (i, a) in quads.iter().enumerate() {
            for b in &quads[i + 1..] {
                assert!(!overlaps(a, b));
            }
        }

        labels.push(std::fs::read_to_string(out.labels.join("a.txt")).unwrap());
    }
    assert_eq!(labels[0], labels[1]);
}

#[test]
fn fully_covered_background_writes_nothing() {
    let root = fresh_dir("pipeline_run_covered");
    write_project(&root, &["full.png"]);
    let project = ProjectLayout::new(&root);
    let out = OutputDirs::create(&root.join("out"), true).unwrap();

    let mut instances = std::collections::BTreeMap::new();
    instances.insert(
        "wall".to_string(),
        vec![Quad([0.0, 0.0, 320.0, 0.0, 320.0, 240.0, 0.0, 240.0])],
    );
    let priors = PriorAnnotations::from_entries(vec![PriorAnnotation {
        img_name: "full.png".to_string(),
        instances,
        exist_category: vec!["wall".to_string()],
    }]);

    let config = PasteConfig {
        max_placement_attempts: 20,
        ..PasteConfig::default()
    };
    let inputs = RunInputs {
        project: &project,
        priors: &priors,
        masks: &NoMasks,
        out: &out,
    };
    let summary = run(&config, &inputs, &mut StdRng::seed_from_u64(5)).unwrap();

    assert_eq!(summary.backgrounds_written, 0);
    assert_eq!(summary.backgrounds_discarded, vec!["full.png".to_string()]);
    assert_eq!(summary.instances_placed, 0);
    assert!(summary.instances_skipped >= 3);
    assert!(list(&out.composites).is_empty());
    assert!(list(&out.labels).is_empty());
    assert!(list(out.masks.as_ref().unwrap()).is_empty());
}

#[test]
fn prior_objects_are_exported_with_new_ones() {
    let root = fresh_dir("pipeline_run_prior");
    write_project(&root, &["scene.png"]);
    let project = ProjectLayout::new(&root);
    let out = OutputDirs::create(&root.join("out"), false).unwrap();

    let mut instances = std::collections::BTreeMap::new();
    instances.insert(
        "tree".to_string(),
        vec![Quad([0.0, 0.0, 30.0, 0.0, 30.0, 20.0, 0.0, 20.0])],
    );
    let priors = PriorAnnotations::from_entries(vec![PriorAnnotation {
        img_name: "scene.png".to_string(),
        instances,
        exist_category: vec!["tree".to_string()],
    }]);

    let config = PasteConfig {
        min_instances_per_background: 1,
        max_instances_per_background: 1,
        instance_categories: Some(vec!["car".to_string()]),
        class_index_list: Some(vec!["car".to_string(), "tree".to_string()]),
        mask_disabled: true,
        ..PasteConfig::default()
    };
    let inputs = RunInputs {
        project: &project,
        priors: &priors,
        masks: &NoMasks,
        out: &out,
    };
    let summary = run(&config, &inputs, &mut StdRng::seed_from_u64(21)).unwrap();
    assert_eq!(summary.backgrounds_written, 1);
    assert_eq!(summary.instances_placed, 1);
    assert!(out.masks.is_none());

    let doc = RecordDocument::read(&out.labels.join("scene.json")).unwrap();
    assert_eq!(doc.exist_category, ["tree", "car"]);
    let car = doc.instances["car"][0].bounds();
    // auto-scaled against the 30x20 tree
    assert!((29.0..=41.0).contains(&car.width()), "{car:?}");
    assert!((14.0..=21.0).contains(&car.height()), "{car:?}");

    let text = std::fs::read_to_string(out.labels.join("scene.txt")).unwrap();
    let classes: Vec<&str> = text
        .lines()
        .map(|l| l.split_whitespace().next().unwrap())
        .collect();
    assert_eq!(classes, ["1", "0"]);
}

#[test]
fn unregistered_category_fails_before_any_output() {
    let root = fresh_dir("pipeline_run_unregistered");
    write_project(&root, &["x.png"]);
    let project = ProjectLayout::new(&root);
    let out = OutputDirs::create(&root.join("out"), true).unwrap();
    let priors = PriorAnnotations::default();
    let config = PasteConfig {
        class_index_list: Some(vec!["car".to_string()]),
        ..PasteConfig::default()
    };
    let inputs = RunInputs {
        project: &project,
        priors: &priors,
        masks: &NoMasks,
        out: &out,
    };
    let err = run(&config, &inputs, &mut StdRng::seed_from_u64(1)).unwrap_err();
    assert!(err.is_fatal_contract());
    assert!(list(&out.composites).is_empty());
}

#[test]
fn backgrounds_sharing_a_stem_are_rejected_before_output() {
    let root = fresh_dir("pipeline_run_stem_clash");
    write_project(&root, &["a.png"]);
    RgbImage::from_pixel(200, 100, Rgb([90, 90, 90]))
        .save(root.join("backgrounds").join("a.jpg"))
        .unwrap();
    let project = ProjectLayout::new(&root);
    let out = OutputDirs::create(&root.join("out"), true).unwrap();
    let priors = PriorAnnotations::default();
    let inputs = RunInputs {
        project: &project,
        priors: &priors,
        masks: &NoMasks,
        out: &out,
    };

    let err = run(&PasteConfig::default(), &inputs, &mut StdRng::seed_from_u64(1)).unwrap_err();
    assert!(err.is_fatal_contract());
    let msg = err.to_string();
    assert!(msg.contains("a.jpg") && msg.contains("a.png"), "{msg}");
    assert!(list(&out.composites).is_empty());
    assert!(list(&out.labels).is_empty());
}
