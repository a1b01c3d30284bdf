use crate::config::Config;
use crate::features::{FeatureExtractor, MelSpectrogramExtractor};
use crate::genres::{GenreTable, GENRES};
use crate::inference::{GenreModel, OnnxGenreModel};
use crate::models::GenrePrediction;
use crate::voting::{majority_voting, GenreVote};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// レスポンスに含める上位ジャンル数
pub const TOP_GENRES: usize = 3;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Model file not found: {}", path.display())]
    ModelMissing { path: PathBuf },
    #[error("feature extraction failed: {0}")]
    Extraction(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid model output: {0}")]
    InvalidOutput(String),
}

/// 1回の推論に必要なパス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionArgs {
    pub model_path: PathBuf,
    pub song_path: PathBuf,
}

/// 特徴量抽出 → 推論 → 多数決 をまとめたパイプライン
#[derive(Clone)]
pub struct GenrePredictor {
    model_path: PathBuf,
    extractor: Arc<dyn FeatureExtractor>,
    model: Arc<dyn GenreModel>,
    genres: &'static GenreTable,
}

impl GenrePredictor {
    pub fn new(
        model_path: impl Into<PathBuf>,
        extractor: Arc<dyn FeatureExtractor>,
        model: Arc<dyn GenreModel>,
    ) -> Self {
        Self {
            model_path: model_path.into(),
            extractor,
            model,
            genres: GENRES,
        }
    }

    /// 設定から既定の抽出器と ONNX モデルで構築
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.resolved_model_path(),
            Arc::new(MelSpectrogramExtractor::new(config)),
            Arc::new(OnnxGenreModel::new(config)),
        )
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn model_available(&self) -> bool {
        self.model_path.exists()
    }

    pub fn genres(&self) -> &'static GenreTable {
        self.genres
    }

    pub fn args_for(&self, song_path: impl Into<PathBuf>) -> PredictionArgs {
        PredictionArgs {
            model_path: self.model_path.clone(),
            song_path: song_path.into(),
        }
    }

    /// 全ジャンルの順位（得票率の降順）を返す
    pub fn classify(&self, args: &PredictionArgs) -> Result<Vec<GenreVote>, PredictionError> {
        if !args.model_path.exists() {
            return Err(PredictionError::ModelMissing {
                path: args.model_path.clone(),
            });
        }

        let start_time = Instant::now();

        let features = self
            .extractor
            .extract(&args.song_path)
            .map_err(|e| PredictionError::Extraction(e.to_string()))?;

        let probabilities = self
            .model
            .predict(&args.model_path, features)
            .map_err(|e| PredictionError::Inference(e.to_string()))?;

        if probabilities.nrows() == 0 {
            return Err(PredictionError::InvalidOutput(
                "model returned no segments".to_string(),
            ));
        }
        if probabilities.ncols() != self.genres.len() {
            return Err(PredictionError::InvalidOutput(format!(
                "model returned {} classes, expected {}",
                probabilities.ncols(),
                self.genres.len()
            )));
        }

        let votes = majority_voting(probabilities.view(), self.genres);
        if votes.is_empty() {
            return Err(PredictionError::InvalidOutput(
                "no segment produced a usable prediction".to_string(),
            ));
        }

        log::info!(
            "ジャンル推定完了: {}ms, {}セグメント ({})",
            start_time.elapsed().as_millis(),
            probabilities.nrows(),
            args.song_path.display()
        );

        Ok(votes)
    }

    /// 1曲のジャンルを推定する
    pub fn predict_genre(&self, song_path: &Path) -> Result<GenrePrediction, PredictionError> {
        let votes = self.classify(&self.args_for(song_path))?;
        GenrePrediction::from_votes(&votes, TOP_GENRES).ok_or_else(|| {
            PredictionError::InvalidOutput("no segment produced a usable prediction".to_string())
        })
    }
}
