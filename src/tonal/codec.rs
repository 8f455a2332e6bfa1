//! Encoder and decoder for the big-endian silbido `.bin` wire format.
//!
//! ```text
//! magic "silbido!" | version u16 | featureBitmask u16 | userVersion u16 |
//! headerSize u32 | [len u16 + comment] | [len u16 + timestamp] |
//! contours until end of stream
//! ```
//!
//! Each contour: `confidence f64? | score f64? | species? | call? |
//! graphId u64 | nodeCount u32 | nodes`, every optional present exactly when
//! its header bit is set. Each node writes one f64 per set bit among TIME,
//! FREQ, SNR, PHASE, RIDGE, in bit order. Field presence is derived from the
//! bitmask alone, never from how many bytes remain.

use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use super::{validate, Contour, TfNode, TonalFeatures, TonalFile, TonalHeader};

const MAGIC: &[u8; 8] = b"silbido!";

/// magic + version + bitmask + userVersion + headerSize.
const FIXED_HEADER_LEN: u32 = 18;

/// Opaque on the wire; existing writers emit arbitrary constants and no
/// reader assigns it meaning.
const GRAPH_ID: u64 = 0;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("not a silbido file: bad magic")]
    BadMagic,
    #[error("header size mismatch: declared {declared}, computed {computed}")]
    HeaderSizeMismatch { declared: u32, computed: u32 },
    #[error("stream ended mid-structure")]
    TruncatedStream,
    #[error("{field} is {len} bytes; the longest encodable string is 65535")]
    FieldTooLong { field: &'static str, len: usize },
    #[error("unknown feature bits 0x{0:04x}")]
    UnknownFeatures(u16),
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
    #[error("populated fields disagree with declared features: {0}")]
    FeatureMismatch(&'static str),
    #[error("contour {contour} node times are not strictly increasing")]
    UnorderedNodes { contour: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Serialize a validated [`TonalFile`] to the wire format.
///
/// Re-checks the bitmask agreement before writing; string fields longer than
/// 65535 UTF-8 bytes fail with [`CodecError::FieldTooLong`].
pub fn encode(file: &TonalFile) -> Result<Vec<u8>, CodecError> {
    let header = file.header();
    let contours = file.contours();
    validate(header, contours)?;

    let mut header_size = FIXED_HEADER_LEN;
    if let Some(comment) = &header.comment {
        header_size += 2 + checked_len("comment", comment)? as u32;
    }
    if let Some(timestamp) = &header.timestamp {
        header_size += 2 + checked_len("timestamp", timestamp)? as u32;
    }

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.write_u16::<BigEndian>(header.version)?;
    out.write_u16::<BigEndian>(header.features.bits())?;
    out.write_u16::<BigEndian>(header.user_version)?;
    out.write_u32::<BigEndian>(header_size)?;
    if let Some(comment) = &header.comment {
        write_string(&mut out, "comment", comment)?;
    }
    if let Some(timestamp) = &header.timestamp {
        write_string(&mut out, "timestamp", timestamp)?;
    }

    for contour in contours {
        if let Some(v) = contour.confidence {
            out.write_f64::<BigEndian>(v)?;
        }
        if let Some(v) = contour.score {
            out.write_f64::<BigEndian>(v)?;
        }
        if let Some(s) = &contour.species {
            write_string(&mut out, "species", s)?;
        }
        if let Some(s) = &contour.call {
            write_string(&mut out, "call", s)?;
        }
        out.write_u64::<BigEndian>(GRAPH_ID)?;
        out.write_u32::<BigEndian>(contour.nodes.len() as u32)?;
        for node in &contour.nodes {
            out.write_f64::<BigEndian>(node.time_s)?;
            out.write_f64::<BigEndian>(node.freq_hz)?;
            if let Some(v) = node.snr {
                out.write_f64::<BigEndian>(v)?;
            }
            if let Some(v) = node.phase {
                out.write_f64::<BigEndian>(v)?;
            }
            if let Some(v) = node.ridge {
                out.write_f64::<BigEndian>(v)?;
            }
        }
    }

    Ok(out)
}

/// Parse a complete wire stream into a validated [`TonalFile`].
///
/// Contours repeat until the stream is exhausted; running out of bytes
/// anywhere inside a structure is [`CodecError::TruncatedStream`].
pub fn decode(bytes: &[u8]) -> Result<TonalFile, CodecError> {
    let mut cur = Cursor::new(bytes);

    let mut magic = [0u8; 8];
    cur.read_exact(&mut magic)
        .map_err(|_| CodecError::TruncatedStream)?;
    if &magic != MAGIC {
        return Err(CodecError::BadMagic);
    }

    let version = read_u16(&mut cur)?;
    let raw_features = read_u16(&mut cur)?;
    let features = TonalFeatures::from_bits(raw_features)
        .ok_or(CodecError::UnknownFeatures(raw_features & !TonalFeatures::all().bits()))?;
    let user_version = read_u16(&mut cur)?;
    let declared_size = read_u32(&mut cur)?;

    if !features.contains(TonalFeatures::DEFAULT) {
        return Err(CodecError::FeatureMismatch(
            "time and frequency bits are required",
        ));
    }

    let mut computed_size = FIXED_HEADER_LEN;
    let comment = if features.contains(TonalFeatures::USERCOMMENT) {
        let s = read_string(&mut cur, "comment")?;
        computed_size += 2 + s.len() as u32;
        Some(s)
    } else {
        None
    };
    let timestamp = if features.contains(TonalFeatures::TIMESTAMP) {
        let s = read_string(&mut cur, "timestamp")?;
        computed_size += 2 + s.len() as u32;
        Some(s)
    } else {
        None
    };

    if declared_size != computed_size {
        return Err(CodecError::HeaderSizeMismatch {
            declared: declared_size,
            computed: computed_size,
        });
    }

    let mut contours = Vec::new();
    while (cur.position() as usize) < bytes.len() {
        let confidence = if features.contains(TonalFeatures::CONFIDENCE) {
            Some(read_f64(&mut cur)?)
        } else {
            None
        };
        let score = if features.contains(TonalFeatures::SCORE) {
            Some(read_f64(&mut cur)?)
        } else {
            None
        };
        let species = if features.contains(TonalFeatures::SPECIES) {
            Some(read_string(&mut cur, "species")?)
        } else {
            None
        };
        let call = if features.contains(TonalFeatures::CALL) {
            Some(read_string(&mut cur, "call")?)
        } else {
            None
        };

        let _graph_id = read_u64(&mut cur)?;
        let node_count = read_u32(&mut cur)?;

        // No up-front reserve; node_count is untrusted wire data.
        let mut nodes = Vec::new();
        for _ in 0..node_count {
            let time_s = read_f64(&mut cur)?;
            let freq_hz = read_f64(&mut cur)?;
            let snr = if features.contains(TonalFeatures::SNR) {
                Some(read_f64(&mut cur)?)
            } else {
                None
            };
            let phase = if features.contains(TonalFeatures::PHASE) {
                Some(read_f64(&mut cur)?)
            } else {
                None
            };
            let ridge = if features.contains(TonalFeatures::RIDGE) {
                Some(read_f64(&mut cur)?)
            } else {
                None
            };
            nodes.push(TfNode {
                time_s,
                freq_hz,
                snr,
                phase,
                ridge,
            });
        }

        contours.push(Contour {
            confidence,
            score,
            species,
            call,
            nodes,
        });
    }

    let header = TonalHeader {
        version,
        features,
        user_version,
        comment,
        timestamp,
    };
    TonalFile::new(header, contours)
}

/// Read and decode one annotation file.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<TonalFile, CodecError> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}

/// Encode and write one annotation file.
pub fn write_file<P: AsRef<Path>>(path: P, file: &TonalFile) -> Result<(), CodecError> {
    let bytes = encode(file)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn checked_len(field: &'static str, s: &str) -> Result<u16, CodecError> {
    u16::try_from(s.len()).map_err(|_| CodecError::FieldTooLong {
        field,
        len: s.len(),
    })
}

fn write_string(out: &mut Vec<u8>, field: &'static str, s: &str) -> Result<(), CodecError> {
    let len = checked_len(field, s)?;
    out.write_u16::<BigEndian>(len)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_string(cur: &mut Cursor<&[u8]>, field: &'static str) -> Result<String, CodecError> {
    let len = read_u16(cur)? as usize;
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf)
        .map_err(|_| CodecError::TruncatedStream)?;
    String::from_utf8(buf).map_err(|_| CodecError::InvalidUtf8(field))
}

fn read_u16(cur: &mut Cursor<&[u8]>) -> Result<u16, CodecError> {
    cur.read_u16::<BigEndian>()
        .map_err(|_| CodecError::TruncatedStream)
}

fn read_u32(cur: &mut Cursor<&[u8]>) -> Result<u32, CodecError> {
    cur.read_u32::<BigEndian>()
        .map_err(|_| CodecError::TruncatedStream)
}

fn read_u64(cur: &mut Cursor<&[u8]>) -> Result<u64, CodecError> {
    cur.read_u64::<BigEndian>()
        .map_err(|_| CodecError::TruncatedStream)
}

fn read_f64(cur: &mut Cursor<&[u8]>) -> Result<f64, CodecError> {
    cur.read_f64::<BigEndian>()
        .map_err(|_| CodecError::TruncatedStream)
}
