//! Upload pipeline: sinks, per-file validation, and the virus-scan hook (§4.4).
//!
//! [`sink`] owns the disk/memory write path; this module owns everything the
//! handler runtime is expected to invoke once a file's bytes are in: size
//! enforcement, a MIME whitelist, a leading-byte signature check, and an
//! optional external virus scan. There is no hard-coded size ceiling here —
//! every limit flows in from [`crate::config::UploadConfig`].

pub mod sink;

use std::future::Future;
use std::pin::Pin;

use crate::config::UploadConfig;
use crate::error::CoreError;

/// An external virus-scan collaborator (§4.4 "optional virus scan hook").
/// Returns `Ok(true)` if the content is clean.
pub type VirusScanHook =
    Box<dyn Fn(&[u8]) -> Pin<Box<dyn Future<Output = Result<bool, CoreError>> + Send>> + Send + Sync>;

/// Leading-byte signatures for the MIME types the upload pipeline recognizes
/// out of the box. A declared MIME type with no entry here is allowed
/// through unchecked — absence of a magic number is not itself suspicious.
const SIGNATURES: &[(&str, &[u8])] = &[
    ("image/png", &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
    ("image/jpeg", &[0xFF, 0xD8, 0xFF]),
    ("image/gif", b"GIF8"),
    ("application/pdf", b"%PDF-"),
    ("application/zip", &[0x50, 0x4B, 0x03, 0x04]),
];

/// Checks `data`'s leading bytes against the signature registered for
/// `declared_mime`. Unknown MIME types pass trivially.
pub fn signature_matches(declared_mime: &str, data: &[u8]) -> bool {
    SIGNATURES
        .iter()
        .find(|(mime, _)| *mime == declared_mime)
        .is_none_or(|(_, magic)| data.starts_with(magic))
}

/// Runs the per-file validation chain described in §4.4: size limit, MIME
/// whitelist, signature check, then (if configured) the virus scan hook.
/// Returns the first failure; callers are expected to treat it as "reject
/// this upload" and run [`sink::Sink::cleanup`].
pub async fn validate_upload(
    config: &UploadConfig,
    declared_mime: &str,
    size: u64,
    sample: &[u8],
    scan_hook: Option<&VirusScanHook>,
) -> Result<(), CoreError> {
    if size > config.max_file_bytes {
        return Err(CoreError::UploadTooLarge {
            limit: config.max_file_bytes,
        });
    }

    if !config.allowed_mime_types.is_empty()
        && !config
            .allowed_mime_types
            .iter()
            .any(|allowed| allowed == declared_mime)
    {
        return Err(CoreError::UploadSignatureMismatch);
    }

    if config.verify_signature && !signature_matches(declared_mime, sample) {
        return Err(CoreError::UploadSignatureMismatch);
    }

    if config.virus_scan
        && let Some(hook) = scan_hook
    {
        let clean = hook(sample).await?;
        if !clean {
            return Err(CoreError::UploadVirusDetected);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UploadConfig {
        UploadConfig::default()
    }

    #[test]
    fn signature_check_accepts_matching_magic_bytes() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];
        assert!(signature_matches("image/png", &png));
    }

    #[test]
    fn signature_check_rejects_mismatched_magic_bytes() {
        let not_png = b"not a png at all";
        assert!(!signature_matches("image/png", not_png));
    }

    #[test]
    fn signature_check_passes_unregistered_mime_types() {
        assert!(signature_matches("application/x-my-format", b"anything"));
    }

    #[tokio::test]
    async fn validate_upload_rejects_oversize_files() {
        let mut cfg = config();
        cfg.max_file_bytes = 10;
        let err = validate_upload(&cfg, "image/png", 11, b"", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UploadTooLarge { limit: 10 }));
    }

    #[tokio::test]
    async fn validate_upload_rejects_disallowed_mime_types() {
        let mut cfg = config();
        cfg.allowed_mime_types = vec!["image/png".to_string()];
        let err = validate_upload(&cfg, "application/x-evil", 3, b"abc", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UploadSignatureMismatch));
    }

    #[tokio::test]
    async fn validate_upload_rejects_signature_mismatch() {
        let cfg = config();
        let err = validate_upload(&cfg, "image/png", 3, b"abc", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UploadSignatureMismatch));
    }

    #[tokio::test]
    async fn validate_upload_passes_clean_file() {
        let cfg = config();
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        validate_upload(&cfg, "image/png", png.len() as u64, &png, None)
            .await
            .unwrap();
    }
}
