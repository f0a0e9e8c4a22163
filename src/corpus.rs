use diesel::prelude::*;
use tokio::task;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppResult;
use crate::extract;
use crate::models::EventFile;
use crate::schema::event_files;
use crate::state::AppState;

/// One successfully-read document of an event's corpus.
pub struct CorpusDocument {
    pub file_id: Uuid,
    pub file_name: String,
    pub text: String,
}

/// Provenance tag attached to a chat turn: the first document of the corpus
/// in listing order. An approximation, not a claim the answer came from it.
pub struct GroundingSource {
    pub file_id: Uuid,
    pub file_name: String,
}

pub struct EventCorpus {
    pub context: String,
    pub source: Option<GroundingSource>,
    pub total_files: usize,
    pub readable_files: usize,
}

impl EventCorpus {
    /// The event has at least one document row, readable or not.
    pub fn has_documents(&self) -> bool {
        self.total_files > 0
    }

    /// At least one document yielded text; the context is non-empty.
    pub fn has_text(&self) -> bool {
        self.readable_files > 0
    }
}

/// Concatenates document texts in listing order, each prefixed with a visible
/// delimiter naming its source. No dedup, no truncation.
pub fn assemble_context(documents: &[CorpusDocument]) -> String {
    let mut context = String::new();
    for document in documents {
        context.push_str("\n\n--- Document: ");
        context.push_str(&document.file_name);
        context.push_str(" ---\n");
        context.push_str(&document.text);
    }
    context
}

/// Best-effort union of the event's readable documents, in upload order.
/// A document whose text cannot be obtained is skipped, never fatal.
pub async fn load_event_corpus(state: &AppState, event_id: Uuid) -> AppResult<EventCorpus> {
    let files: Vec<EventFile> = {
        let mut conn = state.db()?;
        event_files::table
            .filter(event_files::event_id.eq(event_id))
            .order(event_files::uploaded_at.asc())
            .load(&mut conn)?
    };

    let total_files = files.len();
    let mut documents = Vec::with_capacity(total_files);

    for file in files {
        match load_document_text(state, &file).await {
            Some(text) => documents.push(CorpusDocument {
                file_id: file.id,
                file_name: file.file_name,
                text,
            }),
            None => {
                warn!(
                    file_id = %file.id,
                    file_name = %file.file_name,
                    "skipping document with no readable text"
                );
            }
        }
    }

    let source = documents.first().map(|document| GroundingSource {
        file_id: document.file_id,
        file_name: document.file_name.clone(),
    });
    let readable_files = documents.len();
    let context = assemble_context(&documents);

    Ok(EventCorpus {
        context,
        source,
        total_files,
        readable_files,
    })
}

/// Cached upload-time extraction when present; otherwise a live fetch and
/// re-extract pass (rows uploaded before the cache column existed).
async fn load_document_text(state: &AppState, file: &EventFile) -> Option<String> {
    if let Some(cached) = &file.extracted_text {
        if !cached.trim().is_empty() {
            return Some(cached.clone());
        }
    }

    let bytes = match state.storage.get_object(&file.file_path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                file_name = %file.file_name,
                error = %err,
                "failed to fetch document from object storage"
            );
            return None;
        }
    };

    let media_type = file.file_type.clone();
    match task::spawn_blocking(move || extract::extract_text(&media_type, &bytes)).await {
        Ok(text) => text,
        Err(join_err) => {
            warn!(
                file_name = %file.file_name,
                error = %join_err,
                "text extraction task panicked"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, text: &str) -> CorpusDocument {
        CorpusDocument {
            file_id: Uuid::new_v4(),
            file_name: name.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn assembles_documents_in_listing_order() {
        let context = assemble_context(&[
            doc("Rider.txt", "Soundcheck at 16:30"),
            doc("Guests.txt", "VIP list restricted"),
        ]);

        let rider = context.find("--- Document: Rider.txt ---").unwrap();
        let guests = context.find("--- Document: Guests.txt ---").unwrap();
        assert!(rider < guests);
        assert!(context.contains("Soundcheck at 16:30"));
        assert!(context.contains("VIP list restricted"));
    }

    #[test]
    fn empty_corpus_assembles_to_empty_context() {
        assert!(assemble_context(&[]).is_empty());
    }
}
