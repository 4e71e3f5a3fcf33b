//! Stage contracts
//!
//! Each stage consumes one resolved configuration record plus its
//! collaborators and produces a file artifact for the next stage:
//!
//! | Stage | Artifact |
//! |---|---|
//! | Data ingestion | `local_data_file`, extracted dataset under `unzip_dir` |
//! | Prepare base model | `base_model_path`, `updated_base_model_path` |
//! | Model trainer | `trained_model_file_path` |
//! | Model evaluation | `scores_<run_id>.json`, tracking run |

pub mod data_ingestion;
pub mod model_evaluation;
pub mod model_trainer;
pub mod prepare_base_model;

pub use data_ingestion::DataIngestion;
pub use model_evaluation::{EvaluationOutcome, ModelEvaluation, ScoreRecord, REGISTERED_MODEL_NAME};
pub use model_trainer::{ModelTrainer, TrainValFlows};
pub use prepare_base_model::PrepareBaseModel;
