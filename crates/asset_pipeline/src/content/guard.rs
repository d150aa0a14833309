use std::fs;
use std::path::Path;

use super::compiler::AssetCompiler;
use super::container::read_header;
use super::hashing::ContentDigest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    UpToDate,
    Stale(StaleReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// Output is not a container, so there is no stored digest to compare.
    PassThrough,
    ContainerMissing,
    ContainerUnreadable,
    DigestMismatch,
}

/// Decides whether `destination` already holds the output for `digest`.
/// Only the preamble is parsed; the payload is never decompressed.
pub fn check_up_to_date(
    compiler: &dyn AssetCompiler,
    destination: &Path,
    digest: &ContentDigest,
) -> GuardDecision {
    if !compiler.uses_container() {
        return GuardDecision::Stale(StaleReason::PassThrough);
    }
    let bytes = match fs::read(destination) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return GuardDecision::Stale(StaleReason::ContainerMissing)
        }
        Err(_) => return GuardDecision::Stale(StaleReason::ContainerUnreadable),
    };
    match read_header(&bytes) {
        Ok(header) if header.digest == digest.as_bytes() => GuardDecision::UpToDate,
        Ok(_) => GuardDecision::Stale(StaleReason::DigestMismatch),
        Err(_) => GuardDecision::Stale(StaleReason::ContainerUnreadable),
    }
}
