use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::hashing::ContentDigest;

pub const CONTAINER_MAJOR_VERSION: i32 = 1;
pub const CONTAINER_MINOR_VERSION: i32 = 0;

// major, minor, digest length. The zlib payload runs to the end of the buffer.
const PREAMBLE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to read container {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("container is truncated: {0}")]
    Truncated(&'static str),
    #[error(
        "unsupported container version {major}.{minor} (reader understands {}.{})",
        CONTAINER_MAJOR_VERSION,
        CONTAINER_MINOR_VERSION
    )]
    UnsupportedVersion { major: i32, minor: i32 },
    #[error("invalid digest length {0}")]
    InvalidDigestLength(i32),
    #[error("failed to compress payload: {0}")]
    Compress(#[source] io::Error),
    #[error("failed to decompress payload: {0}")]
    Decompress(#[source] io::Error),
    #[error("failed to encode payload: {0}")]
    EncodePayload(String),
    #[error("failed to decode payload: {0}")]
    DecodePayload(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub major: i32,
    pub minor: i32,
    pub digest: Vec<u8>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub major: i32,
    pub minor: i32,
    pub digest: Vec<u8>,
    pub compressed_len: usize,
}

impl Container {
    pub fn new(digest: &ContentDigest, payload: Vec<u8>) -> Self {
        Self {
            major: CONTAINER_MAJOR_VERSION,
            minor: CONTAINER_MINOR_VERSION,
            digest: digest.as_bytes().to_vec(),
            payload,
        }
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ContainerError> {
        decode_payload(&self.payload)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ContainerError> {
        check_version(self.major, self.minor)?;
        let digest_len = i32::try_from(self.digest.len())
            .map_err(|_| ContainerError::InvalidDigestLength(i32::MAX))?;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&self.payload)
            .map_err(ContainerError::Compress)?;
        let compressed = encoder.finish().map_err(ContainerError::Compress)?;

        let mut bytes = Vec::with_capacity(PREAMBLE_LEN + self.digest.len() + compressed.len());
        bytes.extend_from_slice(&self.major.to_le_bytes());
        bytes.extend_from_slice(&self.minor.to_le_bytes());
        bytes.extend_from_slice(&digest_len.to_le_bytes());
        bytes.extend_from_slice(&self.digest);
        bytes.extend_from_slice(&compressed);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ContainerError> {
        let (header, body) = split_header(bytes)?;
        let mut payload = Vec::new();
        ZlibDecoder::new(body)
            .read_to_end(&mut payload)
            .map_err(ContainerError::Decompress)?;
        Ok(Self {
            major: header.major,
            minor: header.minor,
            digest: header.digest,
            payload,
        })
    }
}

/// Parses the preamble only; the payload is left compressed.
pub fn read_header(bytes: &[u8]) -> Result<ContainerHeader, ContainerError> {
    split_header(bytes).map(|(header, _)| header)
}

pub fn read_container(path: &Path) -> Result<Container, ContainerError> {
    let bytes = fs::read(path).map_err(|source| ContainerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Container::decode(&bytes)
}

pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, ContainerError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|error| ContainerError::EncodePayload(error.to_string()))
}

pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ContainerError> {
    let (value, read) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|error| ContainerError::DecodePayload(error.to_string()))?;
    if read != bytes.len() {
        return Err(ContainerError::DecodePayload(format!(
            "{} trailing bytes after payload",
            bytes.len() - read
        )));
    }
    Ok(value)
}

fn split_header(bytes: &[u8]) -> Result<(ContainerHeader, &[u8]), ContainerError> {
    let mut cursor = 0usize;
    let major = read_i32(bytes, &mut cursor, "major version")?;
    let minor = read_i32(bytes, &mut cursor, "minor version")?;
    check_version(major, minor)?;
    let digest_len = read_i32(bytes, &mut cursor, "digest length")?;
    let len = usize::try_from(digest_len).map_err(|_| ContainerError::InvalidDigestLength(digest_len))?;
    let digest = read_exact(bytes, &mut cursor, len, "digest")?.to_vec();
    let body = &bytes[cursor..];
    Ok((
        ContainerHeader {
            major,
            minor,
            digest,
            compressed_len: body.len(),
        },
        body,
    ))
}

fn check_version(major: i32, minor: i32) -> Result<(), ContainerError> {
    if major != CONTAINER_MAJOR_VERSION || !(0..=CONTAINER_MINOR_VERSION).contains(&minor) {
        return Err(ContainerError::UnsupportedVersion { major, minor });
    }
    Ok(())
}

fn read_i32(bytes: &[u8], cursor: &mut usize, what: &'static str) -> Result<i32, ContainerError> {
    let raw = read_exact(bytes, cursor, 4, what)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(raw);
    Ok(i32::from_le_bytes(buf))
}

fn read_exact<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], ContainerError> {
    let end = cursor.saturating_add(len);
    if end > bytes.len() {
        return Err(ContainerError::Truncated(what));
    }
    let out = &bytes[*cursor..end];
    *cursor = end;
    Ok(out)
}
