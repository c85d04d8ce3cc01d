use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;

/// Success envelope: `{ "data": ... }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiData<T> {
    pub data: T,
}

pub type ApiResult<T> = Result<Json<ApiData<T>>, AppError>;
pub type ApiCreated<T> = Result<Custom<Json<ApiData<T>>>, AppError>;

/// JSON body whose decode failures reach the handler as 400s instead of the 422 catcher.
pub type JsonBody<'r, T> = Result<Json<T>, rocket::serde::json::Error<'r>>;

pub fn data<T>(value: T) -> Json<ApiData<T>> {
    Json(ApiData { data: value })
}

pub fn created<T>(value: T) -> Custom<Json<ApiData<T>>> {
    Custom(Status::Created, data(value))
}

pub trait JsonValidateExt<T> {
    fn validate_custom(self) -> Result<T, AppError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate()?;
        Ok(inner)
    }
}

impl<T: Validate> JsonValidateExt<T> for JsonBody<'_, T> {
    fn validate_custom(self) -> Result<T, AppError> {
        self?.validate_custom()
    }
}
