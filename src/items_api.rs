// src/items_api.rs

use reqwest::{Client, multipart};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::SubmitError;
use crate::models::{ImageField, Item, ItemsResponse, ListingDraft, SelectedFile};
use crate::state::ApiConfig;

/// Jedna część ciała `multipart/form-data`.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadPart {
    Text { name: &'static str, value: String },
    File { name: &'static str, file: SelectedFile },
}

impl PayloadPart {
    pub fn name(&self) -> &'static str {
        match self {
            PayloadPart::Text { name, .. } | PayloadPart::File { name, .. } => *name,
        }
    }
}

/// Zawsze trzy części: `name`, `category`, `image`. Bez wybranego pliku
/// `image` idzie jako pusta część tekstowa, nigdy jako plik.
pub fn payload_parts(draft: &ListingDraft) -> [PayloadPart; 3] {
    let image = match &draft.image {
        ImageField::Selected(file) => PayloadPart::File {
            name: "image",
            file: file.clone(),
        },
        ImageField::Unset => PayloadPart::Text {
            name: "image",
            value: String::new(),
        },
    };
    [
        PayloadPart::Text {
            name: "name",
            value: draft.name.clone(),
        },
        PayloadPart::Text {
            name: "category",
            value: draft.category.clone(),
        },
        image,
    ]
}

fn build_form(draft: &ListingDraft) -> Result<multipart::Form, SubmitError> {
    let mut form = multipart::Form::new();
    for part in payload_parts(draft) {
        tracing::debug!("Dodaję część formularza '{}'", part.name());
        form = match part {
            PayloadPart::Text { name, value } => form.text(name, value),
            PayloadPart::File { name, file } => {
                let mut file_part =
                    multipart::Part::bytes(file.bytes.to_vec()).file_name(file.file_name.clone());
                if !file.mime_type.is_empty() {
                    file_part = file_part.mime_str(&file.mime_type).map_err(|e| {
                        tracing::error!("Błąd ustawiania typu MIME '{}': {}", file.mime_type, e);
                        SubmitError::InvalidPart(format!(
                            "nieprawidłowy typ pliku '{}'",
                            file.mime_type
                        ))
                    })?;
                }
                form.part(name, file_part)
            }
        };
    }
    Ok(form)
}

/// Klient backendu z przedmiotami (`/items`).
#[derive(Debug, Clone)]
pub struct ItemsApi {
    client: Client,
    config: ApiConfig,
}

impl ItemsApi {
    pub fn new(client: Client, config: ApiConfig) -> Self {
        Self { client, config }
    }

    /// Wysyła ogłoszenie jednym żądaniem POST, bez ponowień.
    /// Treść odpowiedzi 2xx musi być JSON-em, ale nie jest dalej używana.
    pub async fn submit_listing(
        &self,
        draft: &ListingDraft,
        cancel: &CancellationToken,
    ) -> Result<Value, SubmitError> {
        let form = build_form(draft)?;
        let url = self.config.items_url();
        tracing::info!("Wysyłanie ogłoszenia '{}' do {}", draft.name, url);

        let request = self.client.post(&url).multipart(form).send();
        let response_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("Wysyłka ogłoszenia '{}' przerwana", draft.name);
                return Err(SubmitError::Cancelled);
            }
            result = request => result,
        };

        match response_result {
            Ok(resp) => {
                if resp.status().is_success() {
                    resp.json::<Value>().await.map_err(|e| {
                        tracing::error!("Błąd deserializacji odpowiedzi po wysłaniu ogłoszenia: {}", e);
                        SubmitError::InvalidResponse(e)
                    })
                } else {
                    let status = resp.status();
                    let status_text = status.canonical_reason().unwrap_or_default().to_string();
                    tracing::error!("Błąd wystawiania ogłoszenia: {}", status_text);
                    Err(SubmitError::Status {
                        status,
                        status_text,
                    })
                }
            }
            Err(e) => {
                tracing::error!("Błąd sieci podczas wysyłania ogłoszenia: {:?}", e);
                Err(SubmitError::Transport(e))
            }
        }
    }

    pub async fn list_items(&self) -> Result<Vec<Item>, SubmitError> {
        let url = self.config.items_url();
        let resp = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!("Błąd sieci podczas pobierania listy przedmiotów: {}", e);
            SubmitError::Transport(e)
        })?;

        let status = resp.status();
        if !status.is_success() {
            let status_text = status.canonical_reason().unwrap_or_default().to_string();
            tracing::error!("Błąd pobierania listy przedmiotów: Status={}", status);
            return Err(SubmitError::Status {
                status,
                status_text,
            });
        }

        let body = resp.json::<ItemsResponse>().await.map_err(|e| {
            tracing::error!("Błąd deserializacji listy przedmiotów: {}", e);
            SubmitError::InvalidResponse(e)
        })?;
        Ok(body.items)
    }
}
