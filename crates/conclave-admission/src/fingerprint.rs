use conclave_core::AuditRequest;
use sha2::{Digest, Sha256};

/// Characters of the codebase that participate in the fingerprint.
const CODEBASE_PREFIX_CHARS: usize = 100;

/// Derive a deterministic cache key from a normalized projection of the
/// request: project id, the leading slice of the codebase, language, depth,
/// and the sorted target list. Semantically-identical requests collide;
/// differing ones do not.
///
/// # Examples
///
/// ```
/// use conclave_admission::request_fingerprint;
/// use conclave_core::AuditRequest;
///
/// let a = request_fingerprint(&AuditRequest::new("p1", "code"));
/// let b = request_fingerprint(&AuditRequest::new("p1", "code"));
/// let c = request_fingerprint(&AuditRequest::new("p2", "code"));
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// ```
pub fn request_fingerprint(request: &AuditRequest) -> String {
    let prefix: String = request.codebase.chars().take(CODEBASE_PREFIX_CHARS).collect();
    let mut targets = request.targets.clone();
    targets.sort();

    let mut hasher = Sha256::new();
    hasher.update(request.project_id.as_bytes());
    hasher.update([0]);
    hasher.update(prefix.as_bytes());
    hasher.update([0]);
    hasher.update(request.language.as_deref().unwrap_or("").as_bytes());
    hasher.update([0]);
    hasher.update(request.options.depth.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(targets.join(",").as_bytes());

    let digest = format!("{:x}", hasher.finalize());
    format!("audit:{}:{}", request.project_id, &digest[..16])
}
