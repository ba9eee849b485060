//! Attachment validation and loading
//!
//! Validation only inspects metadata. Files are read afterwards, once every
//! attachment has passed, so a bad entry never causes a later file to be opened.

use lettre::message::header::ContentType;
use std::path::{Path, PathBuf};

use crate::config::AttachmentPolicy;
use crate::error::{MailError, MailResult};

/// An attachment that passed validation but has not been read yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAttachment {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
}

/// Attachment bytes ready for composition
#[derive(Debug, Clone)]
pub struct AttachmentData {
    pub filename: String,
    pub content_type: ContentType,
    pub bytes: Vec<u8>,
}

/// Check every path in order; the first failure aborts.
pub fn validate(paths: &[PathBuf], policy: &AttachmentPolicy) -> MailResult<Vec<ValidatedAttachment>> {
    paths.iter().map(|path| validate_one(path, policy)).collect()
}

fn validate_one(path: &Path, policy: &AttachmentPolicy) -> MailResult<ValidatedAttachment> {
    let not_found = || MailError::AttachmentNotFound {
        path: path.to_path_buf(),
    };

    let metadata = std::fs::metadata(path).map_err(|_| not_found())?;
    if !metadata.is_file() {
        return Err(not_found());
    }

    let size = metadata.len();
    if size > policy.max_bytes {
        return Err(MailError::AttachmentTooLarge {
            path: path.to_path_buf(),
            size,
            limit: policy.max_bytes,
        });
    }

    // Dotfiles such as ".sh" have no extension; their whole name is checked
    let forbidden = path
        .extension()
        .and_then(|ext| ext.to_str())
        .or_else(|| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix('.'))
        })
        .is_some_and(|ext| policy.is_forbidden(ext));
    if forbidden {
        return Err(MailError::ForbiddenAttachmentType {
            path: path.to_path_buf(),
        });
    }

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(not_found)?;

    Ok(ValidatedAttachment {
        path: path.to_path_buf(),
        filename,
        size,
    })
}

/// Read validated attachments, one file at a time. The size limit is
/// checked again on the bytes read, since a file may grow after validation.
pub async fn load(
    validated: &[ValidatedAttachment],
    policy: &AttachmentPolicy,
) -> MailResult<Vec<AttachmentData>> {
    let mut loaded = Vec::with_capacity(validated.len());
    for attachment in validated {
        let bytes = tokio::fs::read(&attachment.path)
            .await
            .map_err(|_| MailError::AttachmentNotFound {
                path: attachment.path.clone(),
            })?;
        let size = bytes.len() as u64;
        if size > policy.max_bytes {
            return Err(MailError::AttachmentTooLarge {
                path: attachment.path.clone(),
                size,
                limit: policy.max_bytes,
            });
        }
        loaded.push(AttachmentData {
            filename: attachment.filename.clone(),
            content_type: content_type_for(&attachment.path)?,
            bytes,
        });
    }
    Ok(loaded)
}

fn content_type_for(path: &Path) -> MailResult<ContentType> {
    let guessed = mime_guess::from_path(path).first_or_octet_stream();
    ContentType::parse(guessed.as_ref())
        .map_err(|e| MailError::Unknown(format!("unusable content type {guessed}: {e}")))
}
