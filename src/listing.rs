// src/listing.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::errors::SubmitError;
use crate::items_api::ItemsApi;
use crate::models::{Field, ListingDraft, NO_FILE_PLACEHOLDER, SelectedFile};

pub type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting,
    Completed,
    Failed,
}

/// Zlecenie dekodowania podglądu dla jednego wybranego pliku.
#[derive(Debug, Clone)]
pub struct PreviewTicket {
    pub generation: u64,
    pub file: SelectedFile,
    pub cancel: CancellationToken,
}

/// Zlecenie jednej próby wysyłki: migawka szkicu i numer żądania.
#[derive(Debug, Clone)]
pub struct SubmitTicket {
    pub request_id: u64,
    pub draft: ListingDraft,
}

/// Stan formularza wystawiania przedmiotu.
///
/// Trzyma bieżący szkic, podgląd zdjęcia i stan ostatniej wysyłki.
/// Wyniki asynchronicznych operacji (podgląd, wysyłka) są przyjmowane tylko
/// wtedy, gdy pochodzą z najnowszego zlecenia.
pub struct ListingForm {
    draft: ListingDraft,
    preview: String,
    preview_generation: u64,
    preview_cancel: Option<CancellationToken>,
    submit_request: u64,
    state: SubmissionState,
    on_listing_completed: Option<CompletionCallback>,
}

impl fmt::Debug for ListingForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListingForm")
            .field("draft", &self.draft)
            .field("preview_len", &self.preview.len())
            .field("preview_generation", &self.preview_generation)
            .field("submit_request", &self.submit_request)
            .field("state", &self.state)
            .finish()
    }
}

impl ListingForm {
    pub fn new(on_listing_completed: Option<CompletionCallback>) -> Self {
        Self {
            draft: ListingDraft::default(),
            preview: String::new(),
            preview_generation: 0,
            preview_cancel: None,
            submit_request: 0,
            state: SubmissionState::Idle,
            on_listing_completed,
        }
    }

    pub fn draft(&self) -> &ListingDraft {
        &self.draft
    }

    pub fn preview(&self) -> &str {
        &self.preview
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn set_field(&mut self, field: Field, value: String) {
        self.draft = self.draft.with_field(field, value);
    }

    /// `None` oznacza zamknięte okno wyboru pliku i niczego nie zmienia.
    pub fn select_file(
        &mut self,
        file: Option<SelectedFile>,
        parent: &CancellationToken,
    ) -> Option<PreviewTicket> {
        let file = file?;
        tracing::debug!(
            "Wybrano plik '{}' ({} bajtów, {})",
            file.file_name,
            file.bytes.len(),
            file.mime_type
        );
        self.draft = self.draft.with_image(file.clone());
        self.preview_generation += 1;

        if let Some(previous) = self.preview_cancel.take() {
            previous.cancel();
        }
        let cancel = parent.child_token();
        self.preview_cancel = Some(cancel.clone());

        Some(PreviewTicket {
            generation: self.preview_generation,
            file,
            cancel,
        })
    }

    pub fn apply_preview(&mut self, ticket: &PreviewTicket, data_uri: String) -> bool {
        if ticket.generation != self.preview_generation {
            tracing::debug!(
                "Pomijam nieaktualny podgląd (generacja {} < {})",
                ticket.generation,
                self.preview_generation
            );
            return false;
        }
        self.preview = data_uri;
        self.preview_cancel = None;
        true
    }

    pub fn display_selected_file(&self) -> &str {
        match self.draft.image.file() {
            Some(file) => &file.file_name,
            None => NO_FILE_PLACEHOLDER,
        }
    }

    pub fn begin_submit(&mut self) -> Result<SubmitTicket, SubmitError> {
        self.draft.validate_listing()?;
        self.submit_request += 1;
        self.state = SubmissionState::Submitting;
        Ok(SubmitTicket {
            request_id: self.submit_request,
            draft: self.draft.clone(),
        })
    }

    /// Zapisuje wynik wysyłki. Każdy sukces wywołuje callback, ale stan
    /// zmienia tylko najnowsza próba. Zwraca `false` dla próby nieaktualnej.
    pub fn finish_submit<T>(&mut self, ticket: &SubmitTicket, result: &Result<T, SubmitError>) -> bool {
        if result.is_ok() {
            if let Some(callback) = &self.on_listing_completed {
                callback();
            }
        }
        if ticket.request_id != self.submit_request {
            tracing::debug!(
                "Wynik wysyłki {} nie zmienia stanu (najnowsza: {})",
                ticket.request_id,
                self.submit_request
            );
            return false;
        }
        self.state = match result {
            Ok(_) => SubmissionState::Completed,
            Err(_) => SubmissionState::Failed,
        };
        true
    }
}

/// Pełny cykl wysyłki dla formularza współdzielonego między żądaniami.
/// Blokada jest zwalniana na czas żądania, więc formularz pozostaje edytowalny.
/// Zwraca wysłany szkic.
pub async fn submit_form(
    form: &Mutex<ListingForm>,
    api: &ItemsApi,
    cancel: &CancellationToken,
) -> Result<ListingDraft, SubmitError> {
    let ticket = form.lock().await.begin_submit()?;
    let result = api.submit_listing(&ticket.draft, cancel).await;
    {
        let mut form = form.lock().await;
        form.finish_submit(&ticket, &result);
        tracing::debug!("Stan formularza po wysyłce {}: {:?}", ticket.request_id, form.state());
    }
    result.map(|_| ticket.draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageField;
    use crate::test_support::{FakeBackend, closed_port_url};
    use axum::body::Bytes;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn file(name: &str) -> SelectedFile {
        SelectedFile {
            bytes: Bytes::from(name.as_bytes().to_vec()),
            file_name: name.to_string(),
            mime_type: "image/png".to_string(),
        }
    }

    fn counting_form() -> (ListingForm, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let form = ListingForm::new(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        (form, calls)
    }

    #[test]
    fn last_edit_wins_per_field() {
        let mut form = ListingForm::new(None);
        let root = CancellationToken::new();
        form.select_file(Some(file("shirt.png")), &root);

        for value in ["S", "Sh", "Shirt"] {
            form.set_field(Field::Name, value.to_string());
        }
        form.set_field(Field::Category, "Clo".to_string());
        form.set_field(Field::Category, "Clothes".to_string());

        assert_eq!(form.draft().name, "Shirt");
        assert_eq!(form.draft().category, "Clothes");
        assert_eq!(form.draft().image, ImageField::Selected(file("shirt.png")));
    }

    #[derive(Clone, Copy)]
    enum Edit {
        Text(Field, &'static str),
        Image(&'static str),
    }

    #[test]
    fn interleaved_edits_keep_fields_independent() {
        use Edit::*;
        let sequences: Vec<Vec<Edit>> = vec![
            vec![],
            vec![Text(Field::Category, "Clothes")],
            vec![Image("a.png"), Text(Field::Name, "S"), Image("b.png")],
            vec![
                Text(Field::Name, "Sh"),
                Text(Field::Category, "Clo"),
                Text(Field::Name, "Shirt"),
                Image("shirt.png"),
                Text(Field::Category, ""),
            ],
            vec![
                Text(Field::Category, "Books"),
                Text(Field::Category, "Toys"),
                Text(Field::Name, ""),
                Text(Field::Name, "Ball"),
            ],
            vec![
                Image("x.png"),
                Text(Field::Name, "Lamp"),
                Text(Field::Category, "Home"),
                Text(Field::Name, "Lamp 2"),
                Image("y.png"),
                Text(Field::Category, "Garden"),
            ],
        ];

        for sequence in sequences {
            let mut form = ListingForm::new(None);
            let root = CancellationToken::new();
            let (mut name, mut category, mut image) = (String::new(), String::new(), None);

            for edit in &sequence {
                let before = form.draft().clone();
                match *edit {
                    Text(field, value) => {
                        form.set_field(field, value.to_string());
                        match field {
                            Field::Name => name = value.to_string(),
                            Field::Category => category = value.to_string(),
                        }
                    }
                    Image(file_name) => {
                        form.select_file(Some(file(file_name)), &root);
                        image = Some(file(file_name));
                    }
                }
                // edycja jednego pola nie rusza pozostałych
                let after = form.draft();
                match *edit {
                    Text(Field::Name, _) => {
                        assert_eq!(after.category, before.category);
                        assert_eq!(after.image, before.image);
                    }
                    Text(Field::Category, _) => {
                        assert_eq!(after.name, before.name);
                        assert_eq!(after.image, before.image);
                    }
                    Image(_) => {
                        assert_eq!(after.name, before.name);
                        assert_eq!(after.category, before.category);
                    }
                }
            }

            assert_eq!(form.draft().name, name);
            assert_eq!(form.draft().category, category);
            assert_eq!(form.draft().image.file(), image.as_ref());
        }
    }

    #[test]
    fn cancelled_dialog_keeps_previous_state() {
        let mut form = ListingForm::new(None);
        let root = CancellationToken::new();
        let ticket = form.select_file(Some(file("shirt.png")), &root).unwrap();
        form.apply_preview(&ticket, "data:image/png;base64,AAAA".to_string());

        assert!(form.select_file(None, &root).is_none());
        assert_eq!(form.display_selected_file(), "shirt.png");
        assert_eq!(form.preview(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn display_helper_uses_placeholder_without_file() {
        let mut form = ListingForm::new(None);
        assert_eq!(form.display_selected_file(), NO_FILE_PLACEHOLDER);

        form.select_file(Some(file("shirt.png")), &CancellationToken::new());
        assert_eq!(form.display_selected_file(), "shirt.png");
    }

    #[test]
    fn stale_preview_is_discarded() {
        let mut form = ListingForm::new(None);
        let root = CancellationToken::new();
        let first = form.select_file(Some(file("a.png")), &root).unwrap();
        let second = form.select_file(Some(file("b.png")), &root).unwrap();

        assert!(first.cancel.is_cancelled());
        assert!(!second.cancel.is_cancelled());

        assert!(form.apply_preview(&second, "data:b".to_string()));
        assert!(!form.apply_preview(&first, "data:a".to_string()));
        assert_eq!(form.preview(), "data:b");
    }

    #[test]
    fn session_teardown_cancels_pending_preview() {
        let mut form = ListingForm::new(None);
        let root = CancellationToken::new();
        let ticket = form.select_file(Some(file("a.png")), &root).unwrap();
        root.cancel();
        assert!(ticket.cancel.is_cancelled());
    }

    #[test]
    fn begin_submit_rejects_incomplete_draft() {
        let (mut form, calls) = counting_form();
        let err = form.begin_submit().unwrap_err();

        assert!(matches!(err, SubmitError::Validation(_)));
        assert_eq!(form.state(), SubmissionState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn successful_submit_fires_callback_once() {
        let (mut form, calls) = counting_form();
        form.set_field(Field::Name, "Shirt".to_string());
        form.select_file(Some(file("shirt.png")), &CancellationToken::new());

        let ticket = form.begin_submit().unwrap();
        assert_eq!(form.state(), SubmissionState::Submitting);
        assert!(form.finish_submit(&ticket, &Ok::<(), SubmitError>(())));

        assert_eq!(form.state(), SubmissionState::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // pola nie są czyszczone po wysyłce
        assert_eq!(form.draft().name, "Shirt");
    }

    #[test]
    fn failed_submit_keeps_fields() {
        let (mut form, calls) = counting_form();
        form.set_field(Field::Name, "Shirt".to_string());
        form.set_field(Field::Category, "Clothes".to_string());
        form.select_file(Some(file("shirt.png")), &CancellationToken::new());

        let ticket = form.begin_submit().unwrap();
        form.finish_submit::<()>(&ticket, &Err(SubmitError::Cancelled));

        assert_eq!(form.state(), SubmissionState::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(form.draft().name, "Shirt");
        assert_eq!(form.draft().category, "Clothes");
    }

    #[test]
    fn older_submit_result_does_not_override_newer_attempt() {
        let (mut form, calls) = counting_form();
        form.set_field(Field::Name, "Shirt".to_string());
        form.select_file(Some(file("shirt.png")), &CancellationToken::new());

        let first = form.begin_submit().unwrap();
        let second = form.begin_submit().unwrap();

        // starsza próba też utworzyła przedmiot: callback tak, stan nie
        assert!(!form.finish_submit(&first, &Ok::<(), SubmitError>(())));
        assert_eq!(form.state(), SubmissionState::Submitting);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(form.finish_submit::<()>(&second, &Err(SubmitError::Cancelled)));
        assert_eq!(form.state(), SubmissionState::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn every_successful_attempt_fires_callback() {
        let (mut form, calls) = counting_form();
        form.set_field(Field::Name, "Shirt".to_string());
        form.select_file(Some(file("shirt.png")), &CancellationToken::new());

        let first = form.begin_submit().unwrap();
        let second = form.begin_submit().unwrap();

        assert!(form.finish_submit(&second, &Ok::<(), SubmitError>(())));
        assert_eq!(form.state(), SubmissionState::Completed);
        assert!(!form.finish_submit(&first, &Ok::<(), SubmitError>(())));

        assert_eq!(form.state(), SubmissionState::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    fn filled_form() -> (ListingForm, Arc<AtomicUsize>) {
        let (mut form, calls) = counting_form();
        form.set_field(Field::Name, "Shirt".to_string());
        form.set_field(Field::Category, "Clothes".to_string());
        form.select_file(Some(file("shirt.png")), &CancellationToken::new());
        (form, calls)
    }

    fn api_for(base_url: &str) -> ItemsApi {
        ItemsApi::new(
            reqwest::Client::new(),
            crate::state::ApiConfig::new(base_url).unwrap(),
        )
    }

    #[tokio::test]
    async fn backend_ok_completes_listing() {
        let backend = FakeBackend::start(StatusCode::OK, "{}").await;
        let (form, calls) = filled_form();
        let form = Mutex::new(form);

        let sent = submit_form(&form, &api_for(&backend.base_url), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sent.name, "Shirt");
        assert_eq!(form.lock().await.state(), SubmissionState::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backend_500_fails_without_callback() {
        let backend = FakeBackend::start(StatusCode::INTERNAL_SERVER_ERROR, "").await;
        let (form, calls) = filled_form();
        let form = Mutex::new(form);

        let err = submit_form(&form, &api_for(&backend.base_url), &CancellationToken::new())
            .await
            .unwrap_err();
        let form = form.into_inner();

        assert!(matches!(err, SubmitError::Status { .. }));
        assert_eq!(form.state(), SubmissionState::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(form.draft().name, "Shirt");
        assert_eq!(form.draft().category, "Clothes");
        assert_eq!(form.display_selected_file(), "shirt.png");
    }

    #[tokio::test]
    async fn refused_connection_fails_without_callback() {
        let (form, calls) = filled_form();
        let form = Mutex::new(form);

        let err = submit_form(&form, &api_for(&closed_port_url().await), &CancellationToken::new())
            .await
            .unwrap_err();
        let form = form.into_inner();

        assert!(matches!(err, SubmitError::Transport(_)));
        assert_eq!(form.state(), SubmissionState::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_form_never_reaches_backend() {
        let backend = FakeBackend::start(StatusCode::OK, "{}").await;
        let (form, calls) = counting_form();
        let form = Mutex::new(form);

        let err = submit_form(&form, &api_for(&backend.base_url), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Validation(_)));
        assert_eq!(backend.request_count().await, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
