//! Attachment staging and validation.
//!
//! A staged attachment gets its in-memory preview handle immediately, before
//! any network activity, so the UI can render a thumbnail while the send is
//! in flight.  Validation (count, MIME type, size) is synchronous and happens
//! before a send attempt is allowed; invalid attachments are rejected with
//! zero network calls.

use uuid::Uuid;

use quadlink_net::AttachmentPart;
use quadlink_shared::constants::ALLOWED_ATTACHMENT_MIME;
use quadlink_shared::{ChatError, Result};
use quadlink_store::AttachmentRef;

/// An attachment bound to a pending send.
#[derive(Debug, Clone)]
pub struct StagedAttachment {
    /// Local preview handle, distinct from the eventual hosted URL.
    pub preview_handle: Uuid,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl StagedAttachment {
    /// The reference carried on the optimistic echo: preview available,
    /// hosted URL not yet.
    pub fn to_ref(&self) -> AttachmentRef {
        AttachmentRef {
            preview_handle: Some(self.preview_handle),
            url: None,
            mime: self.mime.clone(),
            byte_size: self.bytes.len() as u64,
            file_name: self.file_name.clone(),
        }
    }
}

/// Validates and packages attachments for the multipart send path.
#[derive(Debug, Clone)]
pub struct AttachmentUploader {
    max_files: usize,
    max_bytes: usize,
}

impl AttachmentUploader {
    pub fn new(max_files: usize, max_bytes: usize) -> Self {
        Self {
            max_files,
            max_bytes,
        }
    }

    /// Stage file bytes for an upcoming send.  Per-file rules (MIME type,
    /// size) are enforced here so a bad file is rejected the moment the user
    /// picks it; the per-message count rule is enforced in
    /// [`validate_batch`].
    ///
    /// [`validate_batch`]: Self::validate_batch
    pub fn stage(
        &self,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<StagedAttachment> {
        let file_name = file_name.into();
        let mime = mime.into();

        if !ALLOWED_ATTACHMENT_MIME.contains(&mime.as_str()) {
            return Err(ChatError::Validation(format!(
                "unsupported attachment type: {mime}"
            )));
        }
        if bytes.is_empty() {
            return Err(ChatError::Validation(format!("{file_name} is empty")));
        }
        if bytes.len() > self.max_bytes {
            return Err(ChatError::Validation(format!(
                "{file_name} is {} bytes, limit is {}",
                bytes.len(),
                self.max_bytes
            )));
        }

        Ok(StagedAttachment {
            preview_handle: Uuid::new_v4(),
            file_name,
            mime,
            bytes,
        })
    }

    /// Per-message validation, run before a send attempt is allowed.
    pub fn validate_batch(&self, staged: &[StagedAttachment]) -> Result<()> {
        if staged.len() > self.max_files {
            return Err(ChatError::Validation(format!(
                "{} attachments, limit is {}",
                staged.len(),
                self.max_files
            )));
        }
        for att in staged {
            if att.bytes.len() > self.max_bytes {
                return Err(ChatError::Validation(format!(
                    "{} is {} bytes, limit is {}",
                    att.file_name,
                    att.bytes.len(),
                    self.max_bytes
                )));
            }
        }
        Ok(())
    }

    /// Package validated attachments into multipart parts.  They travel in
    /// the same request as the text, sharing one reconciliation outcome.
    pub fn into_parts(staged: Vec<StagedAttachment>) -> Vec<AttachmentPart> {
        staged
            .into_iter()
            .map(|a| AttachmentPart {
                file_name: a.file_name,
                mime: a.mime,
                bytes: a.bytes,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploader() -> AttachmentUploader {
        AttachmentUploader::new(5, 5 * 1024 * 1024)
    }

    #[test]
    fn test_stage_produces_immediate_preview_handle() {
        let staged = uploader()
            .stage("photo.png", "image/png", vec![1, 2, 3])
            .unwrap();
        let echo_ref = staged.to_ref();
        assert!(echo_ref.preview_handle.is_some());
        assert!(echo_ref.url.is_none(), "hosted URL exists only after confirm");
        assert_eq!(echo_ref.byte_size, 3);
    }

    #[test]
    fn test_oversized_file_rejected_synchronously() {
        // 10 MiB against the 5 MiB limit.
        let big = vec![0u8; 10 * 1024 * 1024];
        let err = uploader().stage("huge.png", "image/png", big).unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[test]
    fn test_unsupported_mime_rejected() {
        let err = uploader()
            .stage("notes.pdf", "application/pdf", vec![1])
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[test]
    fn test_batch_count_limit() {
        let up = uploader();
        let staged: Vec<_> = (0..6)
            .map(|i| {
                up.stage(format!("f{i}.png"), "image/png", vec![1])
                    .unwrap()
            })
            .collect();
        assert!(up.validate_batch(&staged[..5]).is_ok());
        assert!(matches!(
            up.validate_batch(&staged).unwrap_err(),
            ChatError::Validation(_)
        ));
    }
}
