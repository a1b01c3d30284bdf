use crate::audio::{create_temp_file_from_bytes, file_extension, format_file_size, sanitize_filename};
use crate::config::Config;
use crate::models::*;
use crate::pipeline::{GenrePredictor, PredictionError};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::Json,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub const HEALTH_MESSAGE: &str = "Music Genre Classification API is running";

// =============================================================================
// Application State
// - ハンドラ間で共有する情報を集約（設定、推定パイプライン、統計、起動時刻）
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub predictor: Arc<GenrePredictor>,
    pub stats: Arc<Mutex<ServerStats>>,
    pub start_time: Arc<Instant>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let predictor = GenrePredictor::from_config(&config);
        Self::with_predictor(config, predictor)
    }

    /// 任意のパイプラインを差し込む（テストで抽出器/モデルを置き換える用途）
    pub fn with_predictor(config: Config, predictor: GenrePredictor) -> Self {
        Self {
            config: Arc::new(config),
            predictor: Arc::new(predictor),
            stats: Arc::new(Mutex::new(ServerStats::default())),
            start_time: Arc::new(Instant::now()),
        }
    }

    pub fn stats(&self) -> MutexGuard<'_, ServerStats> {
        lock_stats(&self.stats)
    }

    /// リクエスト数を数え、処理中カウンタを上げる
    /// - 返り値のドロップで処理中カウンタを下げる（クライアント切断で future が破棄された場合も）
    pub fn begin_request(&self) -> ActiveRequest {
        self.stats().record_request();
        ActiveRequest {
            stats: Arc::clone(&self.stats),
        }
    }
}

fn lock_stats(stats: &Mutex<ServerStats>) -> MutexGuard<'_, ServerStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 処理中リクエストのガード
pub struct ActiveRequest {
    stats: Arc<Mutex<ServerStats>>,
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        lock_stats(&self.stats).finish_request();
    }
}

// =============================================================================
// Error Handling
// - 型安全な API エラーを定義し、`IntoResponse` で JSON へ変換
// =============================================================================

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.code {
            ApiErrorCode::MissingFile
            | ApiErrorCode::NoFileSelected
            | ApiErrorCode::UnsupportedType
            | ApiErrorCode::InvalidMultipart => StatusCode::BAD_REQUEST,
            ApiErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiErrorCode::ModelMissing
            | ApiErrorCode::PredictionFailed
            | ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn missing_file() -> Self {
        ApiError::new(
            ApiErrorCode::MissingFile,
            "No audio file provided. Please use \"audio\" or \"file\" as the field name.",
        )
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::new(ApiErrorCode::InternalError, err.to_string())
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        match err {
            PredictionError::ModelMissing { .. } => {
                ApiError::new(ApiErrorCode::ModelMissing, err.to_string())
            }
            other => ApiError::new(
                ApiErrorCode::PredictionFailed,
                format!("Prediction failed: {}", other),
            ),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::new(ApiErrorCode::PayloadTooLarge, err.body_text())
        } else {
            ApiError::new(
                ApiErrorCode::InvalidMultipart,
                format!("Failed to parse multipart data: {}", err.body_text()),
            )
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code();

        let response = ErrorResponse {
            success: false,
            error: self.message,
            code: self.code.as_str().to_string(),
        };

        (status_code, Json(response)).into_response()
    }
}

// =============================================================================
// Request Handlers
// =============================================================================

/// ヘルスチェックエンドポイント（状態に関わらず常に healthy）
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: HEALTH_MESSAGE.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_available: state.predictor.model_available(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// アップロードされた音声ファイルのジャンルを推定する
pub async fn predict_audio(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<PredictResponse>> {
    let _active = state.begin_request();

    let start_time = Instant::now();
    let result = match multipart {
        Ok(multipart) => process_prediction(&state, multipart).await,
        Err(rejection) => {
            log::debug!("multipart rejected: {}", rejection);
            Err(ApiError::missing_file())
        }
    };

    // 統計情報を更新
    match &result {
        Ok(response) => {
            let elapsed = start_time.elapsed().as_millis() as u64;
            state
                .stats()
                .record_success(elapsed, &response.data.predicted_genre);
        }
        Err(err) => {
            log::warn!("prediction request failed ({}): {}", err.code.as_str(), err.message);
            state.stats().record_failure();
        }
    }

    result
}

/// アップロードされたファイル
struct Upload {
    filename: String,
    bytes: Bytes,
}

/// `audio` または `file` フィールドのファイルを取り出す（両方あれば `audio` 優先）
/// - ファイル名の無いフィールド（テキスト項目）は無視
async fn read_upload(multipart: &mut Multipart) -> ApiResult<Upload> {
    let mut audio: Option<Upload> = None;
    let mut file: Option<Upload> = None;

    while let Some(field) = multipart.next_field().await? {
        let slot = match field.name() {
            Some("audio") => &mut audio,
            Some("file") => &mut file,
            _ => continue,
        };
        if slot.is_some() {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        let bytes = field.bytes().await?;
        *slot = Some(Upload { filename, bytes });
    }

    audio.or(file).ok_or_else(ApiError::missing_file)
}

async fn process_prediction(state: &AppState, mut multipart: Multipart) -> ApiResult<Json<PredictResponse>> {
    let upload = read_upload(&mut multipart).await?;

    if upload.filename.is_empty() {
        return Err(ApiError::new(ApiErrorCode::NoFileSelected, "No file selected"));
    }

    let config = Arc::clone(&state.config);
    let extension = file_extension(&upload.filename)
        .filter(|ext| config.is_allowed_extension(ext))
        .ok_or_else(|| {
            ApiError::new(
                ApiErrorCode::UnsupportedType,
                format!(
                    "File type not supported. Allowed types: {}",
                    config.audio.supported_formats.join(", ")
                ),
            )
        })?;

    log::info!(
        "received {} ({})",
        upload.filename,
        format_file_size(upload.bytes.len() as u64)
    );

    // デコード/FFT/推論は重いので `spawn_blocking`
    let predictor = Arc::clone(&state.predictor);
    let bytes = upload.bytes;
    let prediction = tokio::task::spawn_blocking(move || {
        let temp_file = create_temp_file_from_bytes(&bytes, &extension, &config.paths.temp_dir)
            .map_err(|e| {
                ApiError::new(
                    ApiErrorCode::InternalError,
                    format!("Failed to store upload: {}", e),
                )
            })?;

        let result = predictor.predict_genre(temp_file.path());

        // 推論の成否に関わらずここで削除
        if let Err(e) = temp_file.close() {
            log::warn!("一時ファイルの削除に失敗しました: {}", e);
        }

        result.map_err(ApiError::from)
    })
    .await
    .map_err(|e| {
        ApiError::new(
            ApiErrorCode::InternalError,
            format!("Processing thread error: {}", e),
        )
    })??;

    Ok(Json(PredictResponse {
        success: true,
        data: PredictionResult::new(prediction, sanitize_filename(&upload.filename)),
    }))
}

/// ジャンル一覧（定義順）
pub async fn get_genres(State(state): State<AppState>) -> Json<Vec<GenreInfo>> {
    let genres = state
        .predictor
        .genres()
        .iter()
        .map(|(name, index)| GenreInfo {
            name: name.to_string(),
            index: *index,
        })
        .collect();

    Json(genres)
}

/// サーバー統計情報を取得
pub async fn get_stats(State(state): State<AppState>) -> Json<ServerStats> {
    let mut stats = state.stats().clone();
    stats.uptime_seconds = state.start_time.elapsed().as_secs();
    log::debug!(
        "success rate {:.1}%, most common genre {:?}",
        stats.success_rate(),
        stats.most_common_genre()
    );
    Json(stats)
}
