//! OTA archive binary format (design spec §6): `u32 version | record*` where
//! `record = u16 name_len | utf8 name | u32 data_len | data`, all
//! little-endian. Pure and host-testable — no I/O.

use crate::error::{Error, Result};

/// One file extracted from an OTA archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// A parsed OTA archive: a version stamp plus the files to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub version: u32,
    pub files: Vec<ArchiveFile>,
}

impl Archive {
    /// Parse an archive, verifying `version` equals `expected_version`
    /// (§4.D: "four-byte little-endian version must equal the requested
    /// version" — the sole acceptance criterion; §9's open question notes a
    /// content hash should be added by implementers on top of this).
    pub fn parse(bytes: &[u8], expected_version: u32) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let version = cursor.read_u32()?;
        if version != expected_version {
            return Err(Error::malformed(format!(
                "archive version mismatch: expected {expected_version}, got {version}"
            )));
        }

        let mut files = Vec::new();
        while cursor.remaining() > 0 {
            let name_len = cursor.read_u16()? as usize;
            let name_bytes = cursor.read_bytes(name_len)?;
            let name = String::from_utf8(name_bytes.to_vec())
                .map_err(|e| Error::malformed(format!("archive file name: {e}")))?;
            let data_len = cursor.read_u32()? as usize;
            let data = cursor.read_bytes(data_len)?.to_vec();
            files.push(ArchiveFile { name, data });
        }

        Ok(Self { version, files })
    }

    /// Serialize back to the wire format. Used by tests and by tooling that
    /// builds archives for the bus.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        for file in &self.files {
            let name_bytes = file.name.as_bytes();
            out.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
            out.extend_from_slice(name_bytes);
            out.extend_from_slice(&(file.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&file.data);
        }
        out
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::malformed("archive truncated"));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let slice = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([slice[0], slice[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let slice = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_archive() {
        let archive = Archive {
            version: 42,
            files: vec![
                ArchiveFile {
                    name: "firmware.bin".to_string(),
                    data: vec![1, 2, 3, 4],
                },
                ArchiveFile {
                    name: "manifest.json".to_string(),
                    data: b"{}".to_vec(),
                },
            ],
        };

        let encoded = archive.encode();
        let parsed = Archive::parse(&encoded, 42).unwrap();
        assert_eq!(parsed, archive);
    }

    #[test]
    fn rejects_version_mismatch() {
        let archive = Archive {
            version: 41,
            files: vec![],
        };
        let encoded = archive.encode();
        let err = Archive::parse(&encoded, 42).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn rejects_truncated_archive() {
        let bytes = 7u32.to_le_bytes().to_vec();
        let err = Archive::parse(&bytes, 7).is_ok();
        assert!(err, "empty file list is a valid archive");

        let mut truncated = 7u32.to_le_bytes().to_vec();
        truncated.extend_from_slice(&5u16.to_le_bytes());
        truncated.extend_from_slice(b"ab");
        assert!(Archive::parse(&truncated, 7).is_err());
    }
}
