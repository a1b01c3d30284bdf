// GenreBackendAPI ライブラリ
// バイナリとテストの両方から各モジュールとルーターを使えるようにする

pub mod audio;
pub mod cli;
pub mod config;
pub mod features;
pub mod genres;
pub mod handlers;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod voting;

use crate::handlers::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// ルーターの構築
/// - アップロード上限は `RequestBodyLimitLayer` で一括して掛ける（超過は 413）
pub fn create_app(app_state: AppState) -> Router {
    let max_upload_bytes = app_state.config.max_upload_bytes();

    // CORSレイヤーの設定（全オリジン許可）
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/predict", post(handlers::predict_audio))
        .route("/api/genres", get(handlers::get_genres))
        .route("/api/stats", get(handlers::get_stats))
        // axum 既定の 2MB 制限は外し、下の上限に一本化
        .layer(DefaultBodyLimit::disable())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_upload_bytes))
                .layer(cors),
        )
        .with_state(app_state)
}
