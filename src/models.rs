// src/models.rs
use axum::body::Bytes;
use serde::Deserialize;
use strum_macros::{Display, EnumIter, EnumString};
use validator::{Validate, ValidationError, ValidationErrors};

pub const NO_FILE_PLACEHOLDER: &str = "Nie wybrano pliku";

/// Pola tekstowe formularza, nazwane tak jak atrybut `name` inputu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Field {
    Name,
    Category,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub bytes: Bytes,
    pub file_name: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ImageField {
    #[default]
    Unset,
    Selected(SelectedFile),
}

impl ImageField {
    pub fn file(&self) -> Option<&SelectedFile> {
        match self {
            ImageField::Selected(file) => Some(file),
            ImageField::Unset => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Validate)]
pub struct ListingDraft {
    #[validate(length(min = 1, message = "Nazwa jest wymagana"))]
    pub name: String,
    pub category: String,
    // Sprawdzane w `validate_listing`, bo plik nie jest serializowalny
    pub image: ImageField,
}

impl ListingDraft {
    /// Pełna walidacja przed wysyłką: pola tekstowe z derive plus wymagane zdjęcie.
    pub fn validate_listing(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        if self.image.file().is_none() {
            errors.add(
                "image",
                ValidationError::new("image_required").with_message("Wybierz zdjęcie".into()),
            );
        }
        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Kopia szkicu z jednym podmienionym polem tekstowym.
    pub fn with_field(&self, field: Field, value: String) -> Self {
        match field {
            Field::Name => Self {
                name: value,
                ..self.clone()
            },
            Field::Category => Self {
                category: value,
                ..self.clone()
            },
        }
    }

    pub fn with_image(&self, file: SelectedFile) -> Self {
        Self {
            image: ImageField::Selected(file),
            ..self.clone()
        }
    }
}

// Go backend zwraca `image`, Python `image_name`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "image_name")]
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<Item>,
}
