// src/htmx_handlers.rs

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::{
    Form,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::Response,
};
use maud::{Markup, html};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::{
    errors::{AppError, SubmitError},
    listing::{CompletionCallback, ListingForm, submit_form},
    models::{Field, Item, SelectedFile},
    preview,
    response::build_response,
    state::{AppState, DraftSession},
};

pub const LISTING_COMPLETED_EVENT: &str = "listingCompleted";

async fn find_session(app_state: &AppState, draft_id: Uuid) -> Result<Arc<DraftSession>, AppError> {
    app_state.drafts.get(&draft_id).await.ok_or_else(|| {
        tracing::warn!("Nie znaleziono szkicu {}", draft_id);
        AppError::NotFound
    })
}

fn render_preview(draft_id: Uuid, form: &ListingForm) -> Markup {
    html! {
        div #listing-preview ."listing-preview" "data-draft-id"=(draft_id.to_string()) {
            span ."selected-file" { (form.display_selected_file()) }
            @if !form.preview().is_empty() {
                img src=(form.preview()) alt="Preview" class="imagePreview";
            }
        }
    }
}

fn render_listing_form(draft_id: Uuid, form: &ListingForm) -> Markup {
    let field_url = format!("/htmx/listing/{}/field", draft_id);
    let image_url = format!("/htmx/listing/{}/image", draft_id);
    let submit_url = format!("/htmx/listing/{}/submit", draft_id);

    html! {
        div ."Listing" {
            form #listing-form hx-post=(submit_url) hx-target="#listing-messages" hx-swap="innerHTML" {
                div {
                    input type="text" name="name" id="name" placeholder="name"
                          value=(form.draft().name)
                          hx-post=(field_url) hx-trigger="input" hx-params="name" hx-swap="none"
                          required;
                    input type="text" name="category" id="category" placeholder="category"
                          value=(form.draft().category)
                          hx-post=(field_url) hx-trigger="input" hx-params="category" hx-swap="none";
                    input type="file" name="image" id="image"
                          hx-post=(image_url) hx-trigger="change" hx-params="image"
                          hx-encoding="multipart/form-data"
                          hx-target="#listing-preview" hx-swap="outerHTML"
                          required;
                    button type="submit" { "Wystaw przedmiot" }
                    (render_preview(draft_id, form))
                }
            }
            div #listing-messages ."listing-messages" {}
        }
    }
}

fn render_items(app_state: &AppState, items: &[Item]) -> Markup {
    html! {
        @if items.is_empty() {
            p ."ItemList-empty" { "Brak wystawionych przedmiotów." }
        } @else {
            div ."ItemList" {
                @for item in items {
                    div ."ItemList-card" "data-item-id"=[item.id] {
                        @if !item.image.is_empty() {
                            img src=(app_state.api_config.image_url(&item.image)) alt=(item.name);
                        }
                        p ."ItemList-name" { (item.name) }
                        @if !item.category.is_empty() {
                            p ."ItemList-category" { "Kategoria: " (item.category) }
                        }
                    }
                }
            }
        }
    }
}

fn render_submit_error(err: &SubmitError) -> Markup {
    html! {
        ul ."error" {
            @for message in err.field_messages() {
                li { (message) }
            }
        }
    }
}

/// Montuje nowy formularz: każdy widok strony dostaje własny szkic.
pub async fn mount_listing_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let draft_id = Uuid::new_v4();
    let counter = app_state.completed_listings.clone();
    let on_listing_completed: CompletionCallback = Arc::new(move || {
        let total = counter.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            "Ogłoszenie ze szkicu {} wystawione (łącznie: {})",
            draft_id,
            total
        );
    });

    let form = ListingForm::new(Some(on_listing_completed));
    let page_content = html! {
        (render_listing_form(draft_id, &form))
        section #item-list hx-get="/htmx/items"
                hx-trigger=(format!("load, {} from:body", LISTING_COMPLETED_EVENT))
                hx-swap="innerHTML" {}
    };

    app_state
        .drafts
        .insert(draft_id, Arc::new(DraftSession::new(form)))
        .await;
    tracing::info!("Zamontowano formularz, szkic {}", draft_id);

    build_response(&headers, page_content).await
}

pub async fn change_field_htmx_handler(
    State(app_state): State<AppState>,
    Path(draft_id): Path<Uuid>,
    Form(values): Form<HashMap<String, String>>,
) -> Result<StatusCode, AppError> {
    let session = find_session(&app_state, draft_id).await?;

    let mut changes = Vec::with_capacity(values.len());
    for (key, value) in values {
        let field = Field::from_str(&key).map_err(|_| {
            let allowed: Vec<String> = Field::iter().map(|f| f.to_string()).collect();
            AppError::UnprocessableEntity(format!(
                "Nieznane pole '{}'. Dozwolone: {}",
                key,
                allowed.join(", ")
            ))
        })?;
        changes.push((field, value));
    }

    let mut form = session.form.lock().await;
    for (field, value) in changes {
        form.set_field(field, value);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_image_htmx_handler(
    State(app_state): State<AppState>,
    Path(draft_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Markup, AppError> {
    let session = find_session(&app_state, draft_id).await?;

    let mut selected: Option<SelectedFile> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            tracing::warn!("Pomijam nieoczekiwane pole multipart: {:?}", field.name());
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let mime_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        // pusty input pliku (anulowane okno wyboru) przychodzi bez nazwy i treści
        if file_name.is_empty() && bytes.is_empty() {
            tracing::debug!("Nie wybrano pliku w szkicu {}", draft_id);
            continue;
        }
        selected = Some(SelectedFile {
            bytes,
            file_name,
            mime_type,
        });
    }

    let ticket = session.form.lock().await.select_file(selected, &session.shutdown);

    if let Some(ticket) = ticket {
        let decoded = preview::spawn_decode(ticket.file.clone(), ticket.cancel.clone());
        match decoded.await {
            Ok(data_uri) => {
                session.form.lock().await.apply_preview(&ticket, data_uri);
            }
            Err(_) => {
                tracing::debug!(
                    "Podgląd pliku '{}' nie został ukończony",
                    ticket.file.file_name
                );
            }
        }
    }

    let form = session.form.lock().await;
    Ok(render_preview(draft_id, &form))
}

pub async fn submit_listing_htmx_handler(
    State(app_state): State<AppState>,
    Path(draft_id): Path<Uuid>,
) -> Result<(HeaderMap, Markup), AppError> {
    let session = find_session(&app_state, draft_id).await?;

    let result = submit_form(&session.form, &app_state.items_api, &session.shutdown).await;

    let mut headers = HeaderMap::new();
    match result {
        Ok(draft) => {
            headers.insert(
                "HX-Trigger",
                HeaderValue::from_static(LISTING_COMPLETED_EVENT),
            );
            Ok((
                headers,
                html! { p ."success" { "Przedmiot „" (draft.name) "” został wystawiony." } },
            ))
        }
        Err(e @ SubmitError::Validation(_)) => {
            tracing::warn!("Formularz {} nie przeszedł walidacji", draft_id);
            Err(AppError::UnprocessableEntityWithHtml(render_submit_error(&e)))
        }
        Err(e) => Ok((headers, render_submit_error(&e))),
    }
}

pub async fn list_items_htmx_handler(
    State(app_state): State<AppState>,
) -> Result<Markup, AppError> {
    let items = app_state.items_api.list_items().await.map_err(|e| {
        tracing::error!("Nie udało się pobrać listy przedmiotów: {}", e);
        AppError::BadGateway(format!("Nie udało się pobrać listy przedmiotów: {}", e))
    })?;
    Ok(render_items(&app_state, &items))
}
