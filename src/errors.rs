use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use maud::Markup;
use reqwest::StatusCode as UpstreamStatus;
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Nieprawidłowy adres API '{0}': {1}")]
    InvalidBaseUrl(String, String),

    #[error("Nieprawidłowy adres nasłuchiwania: {0}")]
    InvalidListenAddr(String),

    #[error("Zmienna {0} musi być liczbą, otrzymano '{1}'")]
    InvalidNumber(&'static str, String),
}

/// Wynik nieudanej próby wystawienia ogłoszenia.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Błędy walidacji formularza")]
    Validation(#[from] ValidationErrors),

    #[error("Serwer odrzucił ogłoszenie: {status_text} ({})", .status.as_u16())]
    Status {
        status: UpstreamStatus,
        status_text: String,
    },

    #[error("Błąd połączenia z serwerem: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Nieprawidłowa odpowiedź serwera: {0}")]
    InvalidResponse(#[source] reqwest::Error),

    #[error("Nieprawidłowa część formularza: {0}")]
    InvalidPart(String),

    #[error("Wysyłka przerwana")]
    Cancelled,
}

impl SubmitError {
    /// Komunikaty dla użytkownika, posortowane po nazwie pola.
    pub fn field_messages(&self) -> Vec<String> {
        let SubmitError::Validation(errors) = self else {
            return vec![self.to_string()];
        };
        let mut field_errors: Vec<_> = errors.field_errors().into_iter().collect();
        field_errors.sort_by_key(|(field, _)| field.to_string());
        let mut messages = Vec::new();
        for (field, errors) in field_errors {
            for error in errors {
                let msg = error.message.as_ref().map_or_else(
                    || format!("Pole '{}' jest nieprawidłowe", field),
                    |m| format!("Pole '{}': {}", field, m),
                );
                messages.push(msg);
            }
        }
        messages
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Nie znaleziono zasobu")]
    NotFound,

    #[error("Nieprawidłowe dane wejściowe: {0}")]
    UnprocessableEntity(String),

    #[error("Wewnętrzny błąd serwera")]
    InternalServerError(String),

    #[error("Błąd komunikacji z backendem")]
    BadGateway(String),

    #[error("Formularz zawiera błędy")]
    UnprocessableEntityWithHtml(Markup),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Nie znaleziono zasobu".to_string()),
            AppError::UnprocessableEntity(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            AppError::InternalServerError(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            AppError::BadGateway(message) => (StatusCode::BAD_GATEWAY, message),
            AppError::UnprocessableEntityWithHtml(markup) => {
                return (StatusCode::UNPROCESSABLE_ENTITY, markup).into_response();
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        tracing::error!("Błąd przetwarzania Multipart: {:?}", err);
        AppError::UnprocessableEntity(format!("Błąd przetwarzania danych formularza: {}", err))
    }
}
