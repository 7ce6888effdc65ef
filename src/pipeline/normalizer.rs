use chrono::{DateTime, Utc};
use url::Url;

use crate::core::error::{TriageError, ValidationError};
use crate::core::hash::content_hash;
use crate::core::policy::Policy;
use crate::core::types::{EvidenceBundle, EvidenceKind, FileRef, RawSubmission};

pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Validate and canonicalize a raw submission into an evidence bundle.
/// Rejections here are caller-correctable; nothing is persisted yet.
pub fn normalize(
    raw: RawSubmission,
    reporter_id: &str,
    policy: &Policy,
    now: DateTime<Utc>,
) -> Result<EvidenceBundle, TriageError> {
    let text = raw
        .description
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let url = raw
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());

    let mut kinds = Vec::new();
    if text.is_some() {
        kinds.push(EvidenceKind::Description);
    }
    if url.is_some() {
        kinds.push(EvidenceKind::Url);
    }
    if raw.file.is_some() {
        kinds.push(EvidenceKind::File);
    }
    if kinds.is_empty() {
        return Err(ValidationError::MissingEvidence.into());
    }

    let url = match url {
        Some(value) => Some(validate_url(value)?),
        None => None,
    };

    let file = match raw.file {
        Some(file) => {
            let size = file.bytes.len() as u64;
            if size > MAX_FILE_BYTES {
                return Err(ValidationError::OversizedFile {
                    size,
                    limit: MAX_FILE_BYTES,
                }
                .into());
            }
            let declared_type = file
                .declared_type
                .map(|t| t.to_lowercase())
                .or_else(|| extension_of(&file.name))
                .unwrap_or_else(|| "unknown".to_string());
            Some(FileRef {
                name: file.name,
                size_bytes: size,
                declared_type,
                content_hash: content_hash(&file.bytes),
            })
        }
        None => None,
    };

    let text_content = text.map(|t| {
        let capped = cap_chars(t, policy.limits.max_text_chars);
        redact(&capped, policy)
    });

    Ok(EvidenceBundle {
        kinds,
        text_content,
        url,
        file,
        submitted_at: now,
        reporter_id: reporter_id.to_string(),
    })
}

fn validate_url(value: &str) -> Result<String, TriageError> {
    match Url::parse(value) {
        Ok(parsed) => Ok(parsed.to_string()),
        Err(e) => Err(ValidationError::MalformedUrl {
            reason: e.to_string(),
        }
        .into()),
    }
}

/// Truncate on a char boundary; long text is bounded, never rejected.
fn cap_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

fn redact(text: &str, policy: &Policy) -> String {
    let mut out = text.to_string();
    for re in policy.privacy.redact_patterns.iter() {
        out = re.replace_all(&out, "[REDACTED]").to_string();
    }
    out
}

pub fn extension_of(name: &str) -> Option<String> {
    std::path::Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}
