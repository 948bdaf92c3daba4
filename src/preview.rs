// src/preview.rs

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::models::SelectedFile;

const FALLBACK_MIME: &str = "application/octet-stream";

pub fn encode_data_uri(file: &SelectedFile) -> String {
    let mime = if file.mime_type.trim().is_empty() {
        FALLBACK_MIME
    } else {
        file.mime_type.as_str()
    };
    format!("data:{};base64,{}", mime, STANDARD.encode(&file.bytes))
}

/// Koduje podgląd w tle. Wynik przychodzi jednorazowo przez kanał;
/// anulowanie tokenu zamyka kanał bez wyniku.
pub fn spawn_decode(file: SelectedFile, cancel: CancellationToken) -> oneshot::Receiver<String> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let file_name = file.file_name.clone();
        let encode = tokio::task::spawn_blocking(move || encode_data_uri(&file));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Anulowano dekodowanie podglądu '{}'", file_name);
            }
            result = encode => match result {
                Ok(data_uri) => {
                    if tx.send(data_uri).is_err() {
                        tracing::debug!("Nikt nie czeka na podgląd '{}'", file_name);
                    }
                }
                Err(e) => {
                    tracing::error!("Błąd dekodowania podglądu '{}': {}", file_name, e);
                }
            },
        }
    });
    rx
}
