use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use lol_html::{HtmlRewriter, Settings, element};
use maud::Markup;
use tokio::fs;

use crate::errors::AppError;

const PAGE_SHELL: &str = "static/index.html";

/// Wstawia treść do `#content` szablonu strony.
/// Usuwa atrybuty HTMX inicjujące ładowanie, żeby HTMX nie nadpisał
/// treści wyrenderowanej po stronie serwera.
fn render_into_shell(shell: &[u8], content: &str) -> Result<Vec<u8>, AppError> {
    let mut response_body = Vec::new();
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("#content", |el| {
                el.set_inner_content(content, lol_html::html_content::ContentType::Html);
                el.remove_attribute("hx-trigger");
                el.remove_attribute("hx-get");
                Ok(())
            })],
            ..Settings::default()
        },
        |c: &[u8]| response_body.extend_from_slice(c),
    );

    rewriter.write(shell).map_err(|e| {
        tracing::error!("Błąd przetwarzania szablonu strony: {}", e);
        AppError::InternalServerError("Błąd renderowania strony".to_string())
    })?;
    rewriter.end().map_err(|e| {
        tracing::error!("Błąd zamykania szablonu strony: {}", e);
        AppError::InternalServerError("Błąd renderowania strony".to_string())
    })?;
    Ok(response_body)
}

async fn serve_full_page(content_markup: Markup) -> Result<Response, AppError> {
    let shell_content = fs::read(PAGE_SHELL).await.map_err(|e| {
        tracing::error!("Nie można wczytać pliku szablonu {}: {}", PAGE_SHELL, e);
        AppError::InternalServerError("Błąd wczytywania szablonu strony".to_string())
    })?;

    let body = render_into_shell(&shell_content, &content_markup.into_string())?;

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(Body::from(body))
        .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Żądania HTMX dostają sam fragment, pełne odświeżenie całą stronę.
pub async fn build_response(
    headers: &HeaderMap,
    page_content: Markup,
) -> Result<Response, AppError> {
    if headers.contains_key("HX-Request") {
        Ok(page_content.into_response())
    } else {
        serve_full_page(page_content).await
    }
}
