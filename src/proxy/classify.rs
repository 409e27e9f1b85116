//! Attempt outcome classification
//!
//! Maps a transport result to success, soft failure (retry on another
//! endpoint, short penalty) or hard failure (long penalty).

use crate::config::HeaderPolicy;
use crate::error::{AttemptError, TransportError};
use crate::models::FailureKind;

use super::transport::HttpResponse;

/// Status codes that signal rate limiting or anti-bot screening
pub const SOFT_FAIL_STATUSES: &[u16] = &[403, 429, 503];

#[derive(Debug)]
pub enum Verdict {
    Success(HttpResponse),
    SoftFail(AttemptError),
    HardFail(AttemptError),
}

impl Verdict {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Verdict::Success(_) => None,
            Verdict::SoftFail(_) => Some(FailureKind::Soft),
            Verdict::HardFail(_) => Some(FailureKind::Hard),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success(_))
    }
}

pub fn classify(result: Result<HttpResponse, TransportError>, policy: &HeaderPolicy) -> Verdict {
    let response = match result {
        Ok(response) => response,
        Err(err) if err.is_network() => return Verdict::SoftFail(err.into()),
        Err(err) => return Verdict::HardFail(err.into()),
    };

    let status = response.status;

    // A block page can arrive with any status, including 200
    if let Some(signature) = find_block_signature(&response.body, policy) {
        return Verdict::SoftFail(AttemptError::Blocked { status, signature });
    }

    if SOFT_FAIL_STATUSES.contains(&status) {
        return Verdict::SoftFail(AttemptError::Status(status));
    }

    if !(200..300).contains(&status) {
        return Verdict::HardFail(AttemptError::Status(status));
    }

    Verdict::Success(response)
}

/// First configured signature found in the leading bytes of the body
pub fn find_block_signature(body: &[u8], policy: &HeaderPolicy) -> Option<String> {
    if body.is_empty() || policy.block_signatures.is_empty() {
        return None;
    }

    let end = body.len().min(policy.body_scan_limit);
    let head = String::from_utf8_lossy(&body[..end]).to_lowercase();

    policy
        .block_signatures
        .iter()
        .find(|sig| !sig.is_empty() && head.contains(&sig.to_lowercase()))
        .cloned()
}
