//! Request extractors

use axum::extract::FromRequest;

use articlehub_common::errors::AppError;

/// JSON body extractor whose rejections use the `AppError` envelope
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
