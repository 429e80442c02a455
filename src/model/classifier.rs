//! Classifier adapter: runs the frozen classifier and maps its code to a diagnosis.

use serde::{Deserialize, Serialize};

use super::reducer::ReducedVector;
use super::{ClassOutput, FrozenClassifier};
use crate::error::{ArtifactKind, EcgError};

/// The four diagnoses the frozen classifier was trained on, keyed by class code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EcgClass {
    AbnormalHeartbeat,
    MyocardialInfarction,
    Normal,
    HistoryOfMi,
}

impl EcgClass {
    pub const ALL: [EcgClass; 4] = [
        EcgClass::AbnormalHeartbeat,
        EcgClass::MyocardialInfarction,
        EcgClass::Normal,
        EcgClass::HistoryOfMi,
    ];

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(EcgClass::AbnormalHeartbeat),
            1 => Some(EcgClass::MyocardialInfarction),
            2 => Some(EcgClass::Normal),
            3 => Some(EcgClass::HistoryOfMi),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            EcgClass::AbnormalHeartbeat => 0,
            EcgClass::MyocardialInfarction => 1,
            EcgClass::Normal => 2,
            EcgClass::HistoryOfMi => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EcgClass::AbnormalHeartbeat => "Abnormal Heartbeat",
            EcgClass::MyocardialInfarction => "Myocardial Infarction",
            EcgClass::Normal => "Normal",
            EcgClass::HistoryOfMi => "History of MI",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            EcgClass::AbnormalHeartbeat => {
                "Your ECG shows signs of abnormal heartbeat (arrhythmia). Please consult a cardiologist."
            }
            EcgClass::MyocardialInfarction => {
                "Your ECG indicates Myocardial Infarction (heart attack). Seek immediate medical attention!"
            }
            EcgClass::Normal => "Your ECG appears normal. Your heart rhythm is healthy.",
            EcgClass::HistoryOfMi => {
                "Your ECG shows signs of previous Myocardial Infarction. Follow up with your cardiologist."
            }
        }
    }
}

/// Multinomial linear model: `softmax(coef . x + intercept)`.
///
/// A binary model may carry a single coefficient row, in which case the row scores the
/// second class against the first through a logistic link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub classes: Vec<i64>,
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
}

impl LinearModel {
    fn binary(&self) -> bool {
        self.classes.len() == 2 && self.coef.len() == 1
    }

    pub fn probabilities(&self, input: &[f64]) -> Vec<f64> {
        let scores: Vec<f64> = self
            .coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect();
        if self.binary() {
            let p = 1.0 / (1.0 + (-scores[0]).exp());
            return vec![1.0 - p, p];
        }
        softmax(&scores)
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; the first one wins ties.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (idx, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = idx;
        }
    }
    best
}

impl FrozenClassifier for LinearModel {
    fn input_width(&self) -> usize {
        self.coef.first().map_or(0, Vec::len)
    }

    fn predict(&self, input: &[f64]) -> ClassOutput {
        let probabilities = self.probabilities(input);
        ClassOutput {
            code: self.classes[argmax(&probabilities)],
            probabilities: Some(probabilities),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.classes.len() < 2 {
            return Err("linear model needs at least two classes".to_string());
        }
        if !self.binary() && self.coef.len() != self.classes.len() {
            return Err(format!(
                "linear model has {} classes but {} coefficient rows",
                self.classes.len(),
                self.coef.len()
            ));
        }
        if self.intercept.len() != self.coef.len() {
            return Err(format!(
                "linear model has {} coefficient rows but {} intercepts",
                self.coef.len(),
                self.intercept.len()
            ));
        }
        let width = self.coef.first().map_or(0, Vec::len);
        if width == 0 || self.coef.iter().any(|row| row.len() != width) {
            return Err("linear model coefficient rows must share a non-zero width".to_string());
        }
        Ok(())
    }
}

/// Soft-voting ensemble: weighted mean of the members' class probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftVoting {
    pub members: Vec<LinearModel>,
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
}

impl FrozenClassifier for SoftVoting {
    fn input_width(&self) -> usize {
        self.members.first().map_or(0, |m| m.input_width())
    }

    fn predict(&self, input: &[f64]) -> ClassOutput {
        let classes = self.members.first().map(|m| m.classes.as_slice()).unwrap_or_default();
        let mut averaged = vec![0.0; classes.len()];
        let mut total = 0.0;
        for (idx, member) in self.members.iter().enumerate() {
            let weight = self.weights.as_ref().map_or(1.0, |w| w[idx]);
            for (acc, p) in averaged.iter_mut().zip(member.probabilities(input)) {
                *acc += weight * p;
            }
            total += weight;
        }
        for p in averaged.iter_mut() {
            *p /= total;
        }
        ClassOutput {
            code: classes[argmax(&averaged)],
            probabilities: Some(averaged),
        }
    }

    fn validate(&self) -> Result<(), String> {
        let Some(first) = self.members.first() else {
            return Err("voting ensemble has no members".to_string());
        };
        for member in &self.members {
            member.validate()?;
            if member.classes != first.classes {
                return Err("voting members disagree on the class list".to_string());
            }
            if member.input_width() != first.input_width() {
                return Err("voting members disagree on the input width".to_string());
            }
        }
        if let Some(weights) = &self.weights {
            if weights.len() != self.members.len() {
                return Err(format!(
                    "voting ensemble has {} members but {} weights",
                    self.members.len(),
                    weights.len()
                ));
            }
            if weights.iter().any(|w| !(*w >= 0.0)) || weights.iter().sum::<f64>() <= 0.0 {
                return Err("voting weights must be non-negative and not all zero".to_string());
            }
        }
        Ok(())
    }
}

/// Nearest-centroid model. Emits no probabilities, so results carry no confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestCentroid {
    pub classes: Vec<i64>,
    pub centroids: Vec<Vec<f64>>,
}

impl FrozenClassifier for NearestCentroid {
    fn input_width(&self) -> usize {
        self.centroids.first().map_or(0, Vec::len)
    }

    fn predict(&self, input: &[f64]) -> ClassOutput {
        let negated_distances: Vec<f64> = self
            .centroids
            .iter()
            .map(|c| -c.iter().zip(input).map(|(a, b)| (a - b).powi(2)).sum::<f64>())
            .collect();
        ClassOutput {
            code: self.classes[argmax(&negated_distances)],
            probabilities: None,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() || self.classes.len() != self.centroids.len() {
            return Err("nearest-centroid model needs one centroid per class".to_string());
        }
        let width = self.centroids[0].len();
        if width == 0 || self.centroids.iter().any(|c| c.len() != width) {
            return Err("centroids must share a non-zero width".to_string());
        }
        Ok(())
    }
}

/// Every classifier family the JSON artifact format can describe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifierModel {
    Linear(LinearModel),
    SoftVoting(SoftVoting),
    NearestCentroid(NearestCentroid),
}

impl ClassifierModel {
    fn inner(&self) -> &dyn FrozenClassifier {
        match self {
            ClassifierModel::Linear(m) => m,
            ClassifierModel::SoftVoting(m) => m,
            ClassifierModel::NearestCentroid(m) => m,
        }
    }
}

impl FrozenClassifier for ClassifierModel {
    fn input_width(&self) -> usize {
        self.inner().input_width()
    }

    fn predict(&self, input: &[f64]) -> ClassOutput {
        self.inner().predict(input)
    }

    fn validate(&self) -> Result<(), String> {
        self.inner().validate()
    }
}

/// A diagnosis and, when the classifier estimates probabilities, its confidence in
/// percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub class: EcgClass,
    pub confidence: Option<f64>,
}

pub struct ClassifierAdapter {
    model: Box<dyn FrozenClassifier>,
}

impl ClassifierAdapter {
    /// Wraps a classifier after checking its parameters.
    pub fn new(model: Box<dyn FrozenClassifier>) -> Result<Self, EcgError> {
        model.validate().map_err(|reason| EcgError::InvalidModel {
            kind: ArtifactKind::Classifier,
            reason,
        })?;
        Ok(Self { model })
    }

    pub fn input_width(&self) -> usize {
        self.model.input_width()
    }

    pub fn classify(&self, reduced: &ReducedVector) -> Result<Classification, EcgError> {
        if reduced.len() != self.model.input_width() {
            return Err(EcgError::DimensionMismatch {
                kind: ArtifactKind::Classifier,
                expected: self.model.input_width(),
                actual: reduced.len(),
            });
        }
        let output = self.model.predict(reduced.as_slice());
        let class = EcgClass::from_code(output.code)
            .ok_or(EcgError::UnknownClassCode { code: output.code })?;
        let confidence = output.probabilities.as_deref().and_then(|p| {
            p.iter()
                .copied()
                .filter(|v| v.is_finite())
                .reduce(f64::max)
                .map(|max| (max * 100.0).clamp(0.0, 100.0))
        });
        Ok(Classification { class, confidence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> LinearModel {
        LinearModel {
            classes: vec![0, 1, 2, 3],
            coef: vec![
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![-1.0, 0.0],
                vec![0.0, -1.0],
            ],
            intercept: vec![0.0; 4],
        }
    }

    #[test]
    fn class_table_round_trips_codes() {
        for class in EcgClass::ALL {
            assert_eq!(EcgClass::from_code(class.code()), Some(class));
        }
        assert_eq!(EcgClass::from_code(2).map(EcgClass::label), Some("Normal"));
        assert_eq!(EcgClass::from_code(4), None);
    }

    #[test]
    fn linear_confidence_is_max_probability_percent() {
        let adapter = ClassifierAdapter::new(Box::new(linear())).expect("adapter");
        let result = adapter
            .classify(&ReducedVector::from_values(vec![0.0, 3.0]))
            .expect("classify");
        assert_eq!(result.class, EcgClass::MyocardialInfarction);
        let confidence = result.confidence.expect("confidence");
        assert!(confidence > 25.0 && confidence <= 100.0);
    }

    #[test]
    fn nearest_centroid_has_no_confidence() {
        let model = NearestCentroid {
            classes: vec![2, 3],
            centroids: vec![vec![0.0], vec![10.0]],
        };
        let adapter = ClassifierAdapter::new(Box::new(model)).expect("adapter");
        let result = adapter
            .classify(&ReducedVector::from_values(vec![9.0]))
            .expect("classify");
        assert_eq!(result.class, EcgClass::HistoryOfMi);
        assert_eq!(result.confidence, None);
    }

    #[test]
    fn unknown_code_is_reported() {
        let model = LinearModel {
            classes: vec![0, 7],
            coef: vec![vec![1.0]],
            intercept: vec![0.0],
        };
        let adapter = ClassifierAdapter::new(Box::new(model)).expect("adapter");
        assert!(matches!(
            adapter.classify(&ReducedVector::from_values(vec![5.0])),
            Err(EcgError::UnknownClassCode { code: 7 })
        ));
    }

    #[test]
    fn soft_voting_averages_members() {
        let voting = SoftVoting {
            members: vec![linear(), linear()],
            weights: Some(vec![1.0, 3.0]),
        };
        assert!(voting.validate().is_ok());
        let single = linear().predict(&[1.0, 0.5]);
        let ensemble = voting.predict(&[1.0, 0.5]);
        assert_eq!(single.code, ensemble.code);
        let (a, b) = (single.probabilities.expect("p"), ensemble.probabilities.expect("p"));
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn inconsistent_models_are_rejected_before_use() {
        let short_classes = LinearModel {
            classes: vec![0, 1, 2],
            ..linear()
        };
        assert!(matches!(
            ClassifierAdapter::new(Box::new(short_classes)),
            Err(EcgError::InvalidModel {
                kind: ArtifactKind::Classifier,
                ..
            })
        ));

        let voting = SoftVoting {
            members: vec![linear(), linear()],
            weights: Some(vec![1.0]),
        };
        assert!(ClassifierAdapter::new(Box::new(voting)).is_err());

        let centroids = ClassifierModel::NearestCentroid(NearestCentroid {
            classes: vec![0, 1],
            centroids: vec![vec![0.0]],
        });
        assert!(ClassifierAdapter::new(Box::new(centroids)).is_err());
    }

    #[test]
    fn tagged_json_selects_model_family() {
        let model: ClassifierModel = serde_json::from_str(
            r#"{"type":"nearest_centroid","classes":[0,1],"centroids":[[0.0],[1.0]]}"#,
        )
        .expect("parse");
        assert!(matches!(model, ClassifierModel::NearestCentroid(_)));
        assert_eq!(model.input_width(), 1);
    }
}
