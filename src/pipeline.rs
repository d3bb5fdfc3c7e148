//! Prediction request pipeline
//!
//! `Received -> Validated -> Inferring -> Recording -> Completed`, or
//! `RejectedInput` / `Failed`. Every call resolves its request ticket
//! exactly once, so each request counts once in the request total and each
//! non-success counts once in the error total.

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, field, info, info_span, warn};

use crate::alerts::{AlertThresholds, ConfidenceBand};
use crate::classifier::{Classifier, FeatureVector};
use crate::models::{PredictionOutcome, PredictionRequest};
use crate::stats::TelemetryContext;
use crate::telemetry::instruments;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PredictionError {
    #[error("{0}")]
    Validation(String),

    #[error("Prediction failed: {0}")]
    Inference(String),
}

impl PredictionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Inference(_) => "inference_error",
        }
    }
}

pub struct PredictionPipeline {
    ctx: Arc<TelemetryContext>,
    classifier: Arc<dyn Classifier>,
    thresholds: AlertThresholds,
}

impl PredictionPipeline {
    pub fn new(
        ctx: Arc<TelemetryContext>,
        classifier: Arc<dyn Classifier>,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            ctx,
            classifier,
            thresholds,
        }
    }

    pub fn context(&self) -> &Arc<TelemetryContext> {
        &self.ctx
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionOutcome, PredictionError> {
        let span = info_span!(
            "prediction",
            passenger.pclass = request.pclass,
            passenger.sex = %request.sex,
            passenger.age = request.age,
            passenger.fare = request.fare,
            passenger.embarked = %request.embarked,
            prediction.result = field::Empty,
            prediction.confidence = field::Empty,
            prediction.processing_time = field::Empty,
            error = field::Empty,
            error.kind = field::Empty,
        );
        let _enter = span.enter();

        let ticket = self.ctx.ticket();
        let started = Instant::now();

        let result = self.run(request, started);
        match &result {
            Ok(outcome) => {
                let band = self.thresholds.classify_confidence(outcome.confidence);
                self.ctx.record_success(ticket, outcome.confidence, band);
                span.record("prediction.result", outcome.label.code());
                span.record("prediction.confidence", outcome.confidence);
                span.record(
                    "prediction.processing_time",
                    outcome.processing_time.as_secs_f64(),
                );
                self.report_success(request, outcome, band);
            }
            Err(e) => {
                ticket.fail();
                span.record("error", field::display(e));
                span.record("error.kind", e.kind());
                error!(
                    event = "prediction_failed",
                    error = %e,
                    error_type = e.kind(),
                    "Prediction error"
                );
            }
        }
        result
    }

    fn run(&self, request: &PredictionRequest, started: Instant) -> Result<PredictionOutcome, PredictionError> {
        let passenger = request.validate().map_err(PredictionError::Validation)?;
        let features = FeatureVector::encode(&passenger);

        let probabilities = self
            .classifier
            .predict_proba(&features)
            .map_err(|e| PredictionError::Inference(e.to_string()))?;

        let outcome = PredictionOutcome::from_probabilities(probabilities, started.elapsed());
        let [not_survived, survived] = outcome.probabilities;
        if !(0.0..=1.0).contains(&outcome.confidence) || (not_survived + survived - 1.0).abs() > 1e-6 {
            return Err(PredictionError::Inference(format!(
                "classifier returned an invalid distribution [{}, {}]",
                not_survived, survived
            )));
        }
        Ok(outcome)
    }

    fn report_success(&self, request: &PredictionRequest, outcome: &PredictionOutcome, band: ConfidenceBand) {
        match band {
            ConfidenceBand::Low => {
                instruments::record_low_confidence();
                warn!(
                    event = "low_confidence_prediction",
                    confidence = outcome.confidence,
                    threshold = self.thresholds.low_confidence_threshold,
                    "Low confidence prediction"
                );
            }
            ConfidenceBand::High => instruments::record_high_confidence(),
            ConfidenceBand::Normal => {}
        }

        instruments::record_prediction(self.classifier.name(), outcome.label.code());
        instruments::record_prediction_latency(outcome.processing_time);
        instruments::record_prediction_confidence(outcome.confidence);

        info!(
            event = "prediction_made",
            prediction = outcome.label.as_str(),
            confidence = outcome.confidence,
            processing_time = outcome.processing_time.as_secs_f64(),
            pclass = request.pclass,
            sex = %request.sex,
            age = request.age,
            fare = request.fare,
            embarked = %request.embarked,
            "Prediction made"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassifierError, LogisticClassifier};
    use crate::logging::test_support::CaptureWriter;
    use crate::logging::JsonLogLayer;
    use crate::telemetry::{SpanExportLayer, SpanStatus};
    use tracing_subscriber::layer::SubscriberExt;

    struct FixedClassifier([f64; 2]);

    impl Classifier for FixedClassifier {
        fn predict_proba(&self, _features: &FeatureVector) -> Result<[f64; 2], ClassifierError> {
            Ok(self.0)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct BrokenClassifier;

    impl Classifier for BrokenClassifier {
        fn predict_proba(&self, _features: &FeatureVector) -> Result<[f64; 2], ClassifierError> {
            Err(ClassifierError::InvalidOutput(f64::NAN))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn request() -> PredictionRequest {
        PredictionRequest {
            pclass: 1,
            sex: "female".to_string(),
            age: 29.0,
            sib_sp: 0,
            parch: 0,
            fare: 211.34,
            embarked: "S".to_string(),
        }
    }

    fn pipeline(classifier: Arc<dyn Classifier>) -> (PredictionPipeline, Arc<TelemetryContext>) {
        let ctx = Arc::new(TelemetryContext::new(20));
        let pipeline = PredictionPipeline::new(ctx.clone(), classifier, AlertThresholds::default());
        (pipeline, ctx)
    }

    #[test]
    fn test_success_counts_request_and_records_confidence() {
        let (pipeline, ctx) = pipeline(Arc::new(LogisticClassifier::default()));

        let outcome = pipeline.predict(&request()).unwrap();

        assert_eq!(ctx.counters().requests_total(), 1);
        assert_eq!(ctx.counters().errors_total(), 0);
        assert_eq!(ctx.window().count(), 1);
        assert_eq!(ctx.window().snapshot(), vec![outcome.confidence]);
        assert_eq!(
            outcome.confidence,
            outcome.probabilities[0].max(outcome.probabilities[1])
        );
    }

    #[test]
    fn test_validation_fault_counts_request_and_error() {
        let (pipeline, ctx) = pipeline(Arc::new(LogisticClassifier::default()));
        let mut bad = request();
        bad.pclass = 7;

        let err = pipeline.predict(&bad).unwrap_err();

        assert!(matches!(err, PredictionError::Validation(_)));
        assert_eq!(ctx.counters().requests_total(), 1);
        assert_eq!(ctx.counters().errors_total(), 1);
        assert_eq!(ctx.window().count(), 0);
    }

    #[test]
    fn test_inference_fault_counts_once_without_window_write() {
        let (pipeline, ctx) = pipeline(Arc::new(BrokenClassifier));

        let err = pipeline.predict(&request()).unwrap_err();

        assert_eq!(err.kind(), "inference_error");
        assert_eq!(ctx.counters().requests_total(), 1);
        assert_eq!(ctx.counters().errors_total(), 1);
        assert_eq!(ctx.window().count(), 0);
    }

    #[test]
    fn test_invalid_distribution_is_inference_fault() {
        let (pipeline, ctx) = pipeline(Arc::new(FixedClassifier([0.7, 0.7])));

        let err = pipeline.predict(&request()).unwrap_err();

        assert!(matches!(err, PredictionError::Inference(_)));
        assert_eq!(ctx.counters().errors_total(), 1);
    }

    #[test]
    fn test_confidence_banding() {
        let (pipeline, ctx) = pipeline(Arc::new(FixedClassifier([0.41, 0.59])));
        pipeline.predict(&request()).unwrap();
        assert_eq!(ctx.tally().low(), 1);

        let (pipeline, ctx) = self::pipeline(Arc::new(FixedClassifier([0.09, 0.91])));
        pipeline.predict(&request()).unwrap();
        assert_eq!(ctx.tally().high(), 1);

        let (pipeline, ctx) = self::pipeline(Arc::new(FixedClassifier([0.25, 0.75])));
        pipeline.predict(&request()).unwrap();
        assert_eq!(ctx.tally().low(), 0);
        assert_eq!(ctx.tally().high(), 0);
    }

    #[test]
    fn test_prediction_log_carries_fields() {
        let writer = CaptureWriter::default();
        let subscriber = tracing_subscriber::registry()
            .with(JsonLogLayer::new("titanic-api", writer.clone()));
        let (pipeline, _ctx) = pipeline(Arc::new(FixedClassifier([0.45, 0.55])));

        tracing::subscriber::with_default(subscriber, || {
            pipeline.predict(&request()).unwrap();
        });

        let lines = writer.lines();
        let made = lines
            .iter()
            .find(|l| l["event"] == "prediction_made")
            .unwrap();
        assert_eq!(made["level"], "INFO");
        assert_eq!(made["prediction"], "Survived");
        assert_eq!(made["confidence"], 0.55);
        assert_eq!(made["pclass"], 1);
        assert_eq!(made["sex"], "female");
        assert_eq!(made["span"], "prediction");

        let low = lines
            .iter()
            .find(|l| l["event"] == "low_confidence_prediction")
            .unwrap();
        assert_eq!(low["level"], "WARN");
    }

    #[test]
    fn test_normal_and_high_confidence_emit_no_warning() {
        for probabilities in [[0.09, 0.91], [0.25, 0.75]] {
            let writer = CaptureWriter::default();
            let subscriber = tracing_subscriber::registry()
                .with(JsonLogLayer::new("titanic-api", writer.clone()));
            let (pipeline, ctx) = pipeline(Arc::new(FixedClassifier(probabilities)));

            tracing::subscriber::with_default(subscriber, || {
                pipeline.predict(&request()).unwrap();
            });

            let lines = writer.lines();
            assert!(lines.iter().any(|l| l["event"] == "prediction_made"));
            assert!(!lines.iter().any(|l| l["event"] == "low_confidence_prediction"));
            assert!(!lines.iter().any(|l| l["level"] == "WARN"));
            assert_eq!(ctx.tally().low(), 0);
        }
    }

    #[test]
    fn test_prediction_span_exported_with_outcome() {
        let (layer, mut queue) = SpanExportLayer::new(8);
        let subscriber = tracing_subscriber::registry().with(layer);
        let (pipeline, _ctx) = pipeline(Arc::new(FixedClassifier([0.3, 0.7])));
        let mut bad = request();
        bad.embarked = "X".to_string();

        tracing::subscriber::with_default(subscriber, || {
            pipeline.predict(&request()).unwrap();
            let _ = pipeline.predict(&bad);
        });

        let ok = queue.try_recv().unwrap();
        assert_eq!(ok.name, "prediction");
        assert_eq!(ok.status, SpanStatus::Ok);
        assert_eq!(ok.attributes["prediction.confidence"], 0.7);
        assert_eq!(ok.attributes["prediction.result"], 1);
        assert_eq!(ok.attributes["passenger.sex"], "female");
        assert!(ok.attributes["prediction.processing_time"].as_f64().unwrap() >= 0.0);

        let failed = queue.try_recv().unwrap();
        assert_eq!(failed.status, SpanStatus::Error);
        assert_eq!(failed.attributes["error.kind"], "validation_error");
        assert!(failed.attributes["error"].as_str().unwrap().contains("Embarked"));
        assert!(failed.attributes.get("prediction.confidence").is_none());
    }

    #[test]
    fn test_failure_logged_as_error() {
        let writer = CaptureWriter::default();
        let subscriber = tracing_subscriber::registry()
            .with(JsonLogLayer::new("titanic-api", writer.clone()));
        let (pipeline, _ctx) = pipeline(Arc::new(LogisticClassifier::default()));
        let mut bad = request();
        bad.embarked = "X".to_string();

        tracing::subscriber::with_default(subscriber, || {
            let _ = pipeline.predict(&bad);
        });

        let lines = writer.lines();
        let failed = lines
            .iter()
            .find(|l| l["event"] == "prediction_failed")
            .unwrap();
        assert_eq!(failed["level"], "ERROR");
        assert_eq!(failed["error_type"], "validation_error");
        assert!(failed["error"].as_str().unwrap().contains("Embarked"));
    }

    #[test]
    fn test_concurrent_predictions_not_lost() {
        let (pipeline, ctx) = pipeline(Arc::new(LogisticClassifier::default()));
        let pipeline = Arc::new(pipeline);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pipeline = pipeline.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        let mut req = request();
                        if (i + j) % 5 == 0 {
                            req.sex = "unknown".to_string();
                        }
                        let _ = pipeline.predict(&req);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ctx.counters().requests_total(), 400);
        assert_eq!(ctx.counters().errors_total(), 80);
        assert_eq!(ctx.window().count(), 20);
    }
}
