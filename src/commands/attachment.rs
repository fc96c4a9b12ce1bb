use std::fs;
use std::path::Path;

use crate::doc_processor;
use crate::state::AppState;
use crate::store::models::Attachment;

/// Validate, parse and stage an uploaded file for the next message.
///
/// Only one file can be staged at a time; remove it first to attach another.
pub fn stage_attachment(
    state: &AppState,
    name: &str,
    mime_type: &str,
    bytes: &[u8],
) -> Result<Attachment, String> {
    let mut staged = state.staged();
    if staged.is_some() {
        return Err("Remove the current file to attach a new one".into());
    }

    let max_bytes = state.config().max_upload_bytes;
    let attachment = doc_processor::check_upload(name, bytes.len() as u64, max_bytes)
        .and_then(|_| doc_processor::parse_file(name, mime_type, bytes))
        .map_err(|e| {
            log::warn!("Rejected attachment {}: {}", name, e);
            e.to_string()
        })?;

    log::info!(
        "Staged {} ({} rows)",
        attachment.name(),
        attachment.content().len()
    );
    *staged = Some(attachment.clone());
    Ok(attachment)
}

/// Stage a file from disk. The size limit is checked before the file is read.
pub fn stage_file(state: &AppState, file_path: &str) -> Result<Attachment, String> {
    let path = Path::new(file_path);
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();
    let size = fs::metadata(path).map_err(|e| e.to_string())?.len();

    doc_processor::check_upload(&filename, size, state.config().max_upload_bytes)
        .map_err(|e| e.to_string())?;

    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    stage_attachment(state, &filename, mime_for(&filename), &bytes)
}

fn mime_for(filename: &str) -> &'static str {
    match doc_processor::FileKind::from_name(filename) {
        Ok(doc_processor::FileKind::Csv) => "text/csv",
        Ok(doc_processor::FileKind::Spreadsheet) if filename.to_lowercase().ends_with(".xls") => {
            "application/vnd.ms-excel"
        }
        Ok(doc_processor::FileKind::Spreadsheet) => {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        }
        Err(_) => "",
    }
}

pub fn staged_attachment(state: &AppState) -> Option<Attachment> {
    state.staged().clone()
}

pub fn remove_attachment(state: &AppState) -> Option<Attachment> {
    state.staged().take()
}
