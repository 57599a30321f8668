pub mod artifacts;
pub mod classifier;

pub use artifacts::{ArtifactError, ArtifactStore};
pub use classifier::{
    Classifier, ClassifierError, HttpClassifier, Prediction, PredictionInput, TrainingSample,
};
