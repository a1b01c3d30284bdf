use crate::voting::GenreVote;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Prediction Models
// =============================================================================

/// パイプラインの推定結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenrePrediction {
    pub predicted_genre: String,
    pub confidence: f64,
    /// (ジャンル, 得票率) を得票率の降順で最大 N 件
    pub top_genres: Vec<(String, f64)>,
}

impl GenrePrediction {
    /// 順位付き投票結果から作成（空なら None）
    pub fn from_votes(votes: &[GenreVote], top: usize) -> Option<Self> {
        let first = votes.first()?;
        Some(Self {
            predicted_genre: first.genre.clone(),
            confidence: first.confidence,
            top_genres: votes.iter().take(top).map(GenreVote::as_pair).collect(),
        })
    }
}

/// `/api/predict` の `data` 部分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_genre: String,
    pub confidence: f64,
    pub top_genres: Vec<(String, f64)>,
    pub filename: String,
}

impl PredictionResult {
    pub fn new(prediction: GenrePrediction, filename: impl Into<String>) -> Self {
        Self {
            predicted_genre: prediction.predicted_genre,
            confidence: prediction.confidence,
            top_genres: prediction.top_genres,
            filename: filename.into(),
        }
    }
}

// =============================================================================
// API Response Models
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub success: bool,
    pub data: PredictionResult,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
    pub model_available: bool,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenreInfo {
    pub name: String,
    pub index: usize,
}

// =============================================================================
// Server Statistics
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerStats {
    pub total_requests: u64,
    pub successful_predictions: u64,
    pub failed_predictions: u64,
    pub total_processing_time_ms: u64,
    pub average_processing_time_ms: f64,
    pub active_requests: usize,
    pub uptime_seconds: u64,
    /// 推定結果（1位）のジャンル別件数
    pub genre_counts: BTreeMap<String, u64>,
}

impl ServerStats {
    pub fn record_request(&mut self) {
        self.total_requests += 1;
        self.active_requests += 1;
    }

    /// 処理中リクエストの終了（成否に関わらず1回）
    pub fn finish_request(&mut self) {
        self.active_requests = self.active_requests.saturating_sub(1);
    }

    pub fn record_success(&mut self, processing_time_ms: u64, genre: &str) {
        self.successful_predictions += 1;
        self.total_processing_time_ms += processing_time_ms;
        *self.genre_counts.entry(genre.to_string()).or_insert(0) += 1;

        self.average_processing_time_ms =
            self.total_processing_time_ms as f64 / self.successful_predictions as f64;
    }

    pub fn record_failure(&mut self) {
        self.failed_predictions += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_predictions as f64 / self.total_requests as f64 * 100.0
        }
    }

    /// 最も多く推定されたジャンル（同数なら名前順で先のもの）
    pub fn most_common_genre(&self) -> Option<&str> {
        self.genre_counts
            .iter()
            .fold(None, |best: Option<(&String, u64)>, (genre, &count)| match best {
                Some((_, best_count)) if count <= best_count => best,
                _ => Some((genre, count)),
            })
            .map(|(genre, _)| genre.as_str())
    }
}

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiErrorCode {
    MissingFile,
    NoFileSelected,
    UnsupportedType,
    InvalidMultipart,
    PayloadTooLarge,
    ModelMissing,
    PredictionFailed,
    InternalError,
}

impl ApiErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorCode::MissingFile => "MISSING_FILE",
            ApiErrorCode::NoFileSelected => "NO_FILE_SELECTED",
            ApiErrorCode::UnsupportedType => "UNSUPPORTED_TYPE",
            ApiErrorCode::InvalidMultipart => "INVALID_MULTIPART",
            ApiErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ApiErrorCode::ModelMissing => "MODEL_MISSING",
            ApiErrorCode::PredictionFailed => "PREDICTION_FAILED",
            ApiErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}
