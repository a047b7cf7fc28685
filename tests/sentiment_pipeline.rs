// Model service behaviour against a keyword stub model; no weights are downloaded.

mod common;

use std::sync::atomic::Ordering;

use sentiment_lora::{Sentiment, ServiceError};

#[test]
fn predictions_are_labelled_with_bounded_confidence() {
    let pipeline = common::keyword_pipeline();
    for text in [
        "great movie",
        "awful plot",
        "the movie was great great but the plot was awful",
        "completely unknown words here",
        "GREAT",
    ] {
        let result = pipeline.predict(text).unwrap();
        assert!(matches!(result.sentiment, Sentiment::Positive | Sentiment::Negative));
        assert!((0.0..=1.0).contains(&result.confidence), "{text}: {}", result.confidence);
        assert!(result.processing_time >= 0.0);
        assert_eq!(result.text, text);
    }
}

#[test]
fn class_one_maps_to_positive() {
    let pipeline = common::keyword_pipeline();

    let positive = pipeline.predict("great great movie").unwrap();
    assert_eq!(positive.sentiment, Sentiment::Positive);
    assert!(positive.confidence > 0.5);

    let negative = pipeline.predict("awful movie").unwrap();
    assert_eq!(negative.sentiment, Sentiment::Negative);
    assert!(negative.confidence > 0.5);
}

#[test]
fn empty_text_is_handled() {
    let pipeline = common::keyword_pipeline();
    let result = pipeline.predict("").unwrap();
    assert_eq!(result.text, "");
    assert!((result.confidence - 0.5).abs() < 1e-6);
    // [CLS] [SEP]
    assert_eq!(pipeline.model().longest_sequence.load(Ordering::SeqCst), 2);
}

#[test]
fn long_inputs_are_truncated_to_128_tokens() {
    let pipeline = common::keyword_pipeline();
    let text = vec!["great"; 500].join(" ");
    let result = pipeline.predict(&text).unwrap();
    assert_eq!(result.sentiment, Sentiment::Positive);
    assert_eq!(pipeline.model().longest_sequence.load(Ordering::SeqCst), 128);
}

#[test]
fn identical_text_gives_identical_prediction() {
    let pipeline = common::keyword_pipeline();
    let first = pipeline.predict("the plot was awful").unwrap();
    let second = pipeline.predict("the plot was awful").unwrap();
    assert_eq!(first.sentiment, second.sentiment);
    assert_eq!(first.confidence, second.confidence);
}

#[test]
fn batch_preserves_length_and_order() {
    let pipeline = common::keyword_pipeline();
    let texts = vec![
        "great movie".to_string(),
        "".to_string(),
        "awful plot".to_string(),
    ];
    let batch = pipeline.predict_batch(&texts).unwrap();

    assert_eq!(batch.results.len(), texts.len());
    for (result, text) in batch.results.iter().zip(&texts) {
        assert_eq!(&result.text, text);
    }
    assert_eq!(batch.results[0].sentiment, Sentiment::Positive);
    assert_eq!(batch.results[2].sentiment, Sentiment::Negative);
    assert!(batch.total_processing_time >= 0.0);
    // One forward pass per text.
    assert_eq!(pipeline.model().calls.load(Ordering::SeqCst), 3);
}

#[test]
fn empty_batch_returns_no_results() {
    let pipeline = common::keyword_pipeline();
    let batch = pipeline.predict_batch(&[]).unwrap();
    assert!(batch.results.is_empty());
    assert!(batch.total_processing_time >= 0.0 && batch.total_processing_time < 1.0);
    assert_eq!(pipeline.model().calls.load(Ordering::SeqCst), 0);
}

#[test]
fn inference_failure_is_reported_not_defaulted() {
    let pipeline = common::broken_pipeline();
    match pipeline.predict("great movie") {
        Err(ServiceError::Prediction(message)) => {
            assert!(message.contains("malformed internal state"), "{message}")
        }
        other => panic!("expected a prediction error, got {other:?}"),
    }
}

#[test]
fn failing_item_aborts_the_batch() {
    let pipeline = common::keyword_pipeline();
    let texts = vec![
        "great movie".to_string(),
        "explode".to_string(),
        "awful plot".to_string(),
    ];

    let err = pipeline.predict_batch(&texts).unwrap_err();
    match &err {
        ServiceError::Batch(inner) => {
            assert!(matches!(**inner, ServiceError::Prediction(_)));
        }
        other => panic!("expected a batch error, got {other:?}"),
    }
    assert!(err.to_string().contains("forward pass exploded"));
    // Items after the failure are never run.
    assert_eq!(pipeline.model().calls.load(Ordering::SeqCst), 2);
}

#[test]
fn stub_pipeline_reports_cpu() {
    let pipeline = common::keyword_pipeline();
    assert_eq!(pipeline.device_label(), "cpu");
}
