use axum::extract::FromRequest;

use crate::error::AppError;

/// JSON body whose rejections render in the API error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
