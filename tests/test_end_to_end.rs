use std::fs;

use crfpp::train::ModelWriter;
use crfpp::{Algorithm, Model, Trainer};

const TEMPLATE: &str = "# unigram\nU00:%x[0,0]\n\n# bigram\nB\n";
const DATA: &str = "a X\nb Y\n";

#[test]
fn test_learn_save_load() {
    let dir = tempfile::tempdir().unwrap();
    let template_path = dir.path().join("template");
    let train_path = dir.path().join("train.data");
    let model_path = dir.path().join("model");
    fs::write(&template_path, TEMPLATE).unwrap();
    fs::write(&train_path, DATA).unwrap();

    let trainer = Trainer::new(Algorithm::CrfL2)
        .with_threads(1)
        .with_text_model(true);
    trainer.learn(&template_path, &train_path, &model_path).unwrap();
    assert!(model_path.exists());
    assert!(dir.path().join("model.txt").exists());

    let buf = fs::read(&model_path).unwrap();
    let model = Model::new(&buf).unwrap();
    assert_eq!(model.version(), 100);
    assert_eq!(model.max_id(), 2 * 2 + 4);
    assert_eq!(model.xsize(), 1);
    assert_eq!(model.labels(), ["X", "Y"]);
    assert_eq!(model.templates().unigram(), ["U00:%x[0,0]"]);
    assert_eq!(model.templates().bigram(), ["B"]);
    assert_eq!(model.feature_id("U00:a"), Some(0));
    assert_eq!(model.feature_id("U00:b"), Some(2));
    assert_eq!(model.feature_id("B"), Some(4));
    assert_eq!(model.feature_id("U00:c"), None);

    // each observation prefers its gold label, and X -> Y is the favoured transition
    let w = model.weights();
    assert!(w[0] > w[1]);
    assert!(w[3] > w[2]);
    assert!(w[4 + 1] > w[4]);
}

#[test]
fn test_text_model_converts_back() {
    let dir = tempfile::tempdir().unwrap();
    let template_path = dir.path().join("template");
    let train_path = dir.path().join("train.data");
    let model_path = dir.path().join("model");
    fs::write(&template_path, "U00:%x[0,0]\nU01:%x[-1,0]/%x[0,0]\nU02:%x[0,1]\nB\n").unwrap();
    fs::write(
        &train_path,
        "He PRP B-NP\nreckons VBZ B-VP\nthe DT B-NP\ndeficit NN I-NP\n. . O\n\n\
         The DT B-NP\ndog NN I-NP\nruns VBZ B-VP\n. . O\n",
    )
    .unwrap();

    Trainer::new(Algorithm::CrfL2)
        .with_text_model(true)
        .learn(&template_path, &train_path, &model_path)
        .unwrap();

    let converted_path = dir.path().join("converted");
    let mut text_path = model_path.clone().into_os_string();
    text_path.push(".txt");
    ModelWriter::convert(&text_path, &converted_path).unwrap();

    let original = fs::read(&model_path).unwrap();
    let converted = fs::read(&converted_path).unwrap();
    let original = Model::new(&original).unwrap();
    let converted = Model::new(&converted).unwrap();

    assert_eq!(converted.max_id(), original.max_id());
    assert_eq!(converted.xsize(), original.xsize());
    assert_eq!(converted.xsize(), 2);
    assert_eq!(converted.labels(), original.labels());
    assert_eq!(converted.templates(), original.templates());
    for key in &["U00:He", "U01:_B-1/He", "U02:VBZ", "B"] {
        assert!(original.feature_id(key).is_some(), "{}", key);
        assert_eq!(converted.feature_id(key), original.feature_id(key));
    }
    for (a, b) in converted.weights().iter().zip(original.weights()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_failed_training_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let template_path = dir.path().join("template");
    let train_path = dir.path().join("train.data");
    let model_path = dir.path().join("model");
    fs::write(&template_path, "U00:%x[0,5]\n").unwrap();
    fs::write(&train_path, DATA).unwrap();

    let err = Trainer::new(Algorithm::CrfL2)
        .learn(&template_path, &train_path, &model_path)
        .unwrap_err();
    assert!(matches!(err, crfpp::Error::Template(_)));
    assert!(!model_path.exists());
}

#[test]
fn test_optimizer_failure_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let template_path = dir.path().join("template");
    let train_path = dir.path().join("train.data");
    let model_path = dir.path().join("model");
    fs::write(&template_path, TEMPLATE).unwrap();
    fs::write(&train_path, DATA).unwrap();

    // the L2 penalty overflows as soon as the first step moves the weights
    let err = Trainer::new(Algorithm::CrfL2)
        .with_cost(1e-320)
        .unwrap()
        .with_threads(1)
        .with_text_model(true)
        .learn(&template_path, &train_path, &model_path)
        .unwrap_err();
    assert!(matches!(err, crfpp::Error::Optimizer(_)), "{}", err);
    assert!(err.to_string().contains("not finite"), "{}", err);
    assert!(!model_path.exists());
    assert!(!dir.path().join("model.txt").exists());
}

#[test]
fn test_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let err = Trainer::default()
        .learn(
            dir.path().join("template"),
            dir.path().join("train.data"),
            dir.path().join("model"),
        )
        .unwrap_err();
    assert!(matches!(err, crfpp::Error::Io(_)));
}
