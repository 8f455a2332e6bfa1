//! Silbido tonal annotation model.
//!
//! A tonal file holds whistle contours, each a strictly time-increasing run
//! of time-frequency nodes. The header carries a feature bitmask declaring
//! exactly which optional fields are populated; the wire layout of every
//! contour and node is derived from those bits alone, so a file whose
//! populated fields drift from its declared bits, or whose nodes run
//! backwards in time, is unrepresentable here. [`TonalFile::new`] rejects
//! such records up front and [`codec::encode`] re-checks before writing.

pub mod codec;

pub use codec::{decode, encode, read_file, write_file, CodecError};

use bitflags::bitflags;

/// Format version written to new files. Decoding accepts any version since
/// the layout is governed entirely by the feature bitmask.
pub const FORMAT_VERSION: u16 = 4;

bitflags! {
    /// Header bitmask declaring which optional fields are present.
    ///
    /// TIME through RIDGE contribute one f64 per node, in bit order.
    /// SCORE, CONFIDENCE, SPECIES and CALL are per-contour; TIMESTAMP and
    /// USERCOMMENT are header strings.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TonalFeatures: u16 {
        const TIME = 1;
        const FREQ = 1 << 1;
        const SNR = 1 << 2;
        const PHASE = 1 << 3;
        const SCORE = 1 << 4;
        const CONFIDENCE = 1 << 5;
        const RIDGE = 1 << 6;
        const TIMESTAMP = 1 << 7;
        const USERCOMMENT = 1 << 8;
        const SPECIES = 1 << 9;
        const CALL = 1 << 10;
    }
}

impl TonalFeatures {
    /// The minimal mask every readable file carries.
    pub const DEFAULT: TonalFeatures = TonalFeatures::TIME.union(TonalFeatures::FREQ);
}

/// One sample on a contour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TfNode {
    pub time_s: f64,
    pub freq_hz: f64,
    pub snr: Option<f64>,
    pub phase: Option<f64>,
    pub ridge: Option<f64>,
}

impl TfNode {
    pub fn new(time_s: f64, freq_hz: f64) -> Self {
        Self {
            time_s,
            freq_hz,
            snr: None,
            phase: None,
            ridge: None,
        }
    }
}

/// One whistle trace: time-increasing nodes plus optional per-contour
/// metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Contour {
    pub confidence: Option<f64>,
    pub score: Option<f64>,
    pub species: Option<String>,
    pub call: Option<String>,
    pub nodes: Vec<TfNode>,
}

impl Contour {
    pub fn from_nodes(nodes: Vec<TfNode>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TonalHeader {
    pub version: u16,
    pub features: TonalFeatures,
    pub user_version: u16,
    pub comment: Option<String>,
    pub timestamp: Option<String>,
}

impl Default for TonalHeader {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            features: TonalFeatures::DEFAULT,
            user_version: 0,
            comment: None,
            timestamp: None,
        }
    }
}

/// A validated header + contour list. Construction is the only way in, so a
/// `TonalFile` always satisfies the bitmask agreement and node ordering
/// invariants.
#[derive(Clone, Debug, PartialEq)]
pub struct TonalFile {
    header: TonalHeader,
    contours: Vec<Contour>,
}

impl TonalFile {
    /// Build a file after checking that every populated field, on the header
    /// and on every contour and node, matches the declared feature bits, and
    /// that each contour's node times strictly increase.
    pub fn new(header: TonalHeader, contours: Vec<Contour>) -> Result<Self, CodecError> {
        validate(&header, &contours)?;
        Ok(Self { header, contours })
    }

    pub fn header(&self) -> &TonalHeader {
        &self.header
    }

    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    pub fn into_contours(self) -> Vec<Contour> {
        self.contours
    }
}

pub(crate) fn validate(header: &TonalHeader, contours: &[Contour]) -> Result<(), CodecError> {
    let f = header.features;

    if !f.contains(TonalFeatures::DEFAULT) {
        return Err(CodecError::FeatureMismatch(
            "time and frequency bits are required",
        ));
    }
    if header.comment.is_some() != f.contains(TonalFeatures::USERCOMMENT) {
        return Err(CodecError::FeatureMismatch(
            "comment presence disagrees with USERCOMMENT bit",
        ));
    }
    if header.timestamp.is_some() != f.contains(TonalFeatures::TIMESTAMP) {
        return Err(CodecError::FeatureMismatch(
            "timestamp presence disagrees with TIMESTAMP bit",
        ));
    }

    for (idx, contour) in contours.iter().enumerate() {
        if contour.confidence.is_some() != f.contains(TonalFeatures::CONFIDENCE) {
            return Err(CodecError::FeatureMismatch(
                "confidence presence disagrees with CONFIDENCE bit",
            ));
        }
        if contour.score.is_some() != f.contains(TonalFeatures::SCORE) {
            return Err(CodecError::FeatureMismatch(
                "score presence disagrees with SCORE bit",
            ));
        }
        if contour.species.is_some() != f.contains(TonalFeatures::SPECIES) {
            return Err(CodecError::FeatureMismatch(
                "species presence disagrees with SPECIES bit",
            ));
        }
        if contour.call.is_some() != f.contains(TonalFeatures::CALL) {
            return Err(CodecError::FeatureMismatch(
                "call presence disagrees with CALL bit",
            ));
        }
        for node in &contour.nodes {
            if node.snr.is_some() != f.contains(TonalFeatures::SNR) {
                return Err(CodecError::FeatureMismatch(
                    "snr presence disagrees with SNR bit",
                ));
            }
            if node.phase.is_some() != f.contains(TonalFeatures::PHASE) {
                return Err(CodecError::FeatureMismatch(
                    "phase presence disagrees with PHASE bit",
                ));
            }
            if node.ridge.is_some() != f.contains(TonalFeatures::RIDGE) {
                return Err(CodecError::FeatureMismatch(
                    "ridge presence disagrees with RIDGE bit",
                ));
            }
        }
        // Strictly increasing; the negated form also rejects NaN times.
        for pair in contour.nodes.windows(2) {
            if !(pair[0].time_s < pair[1].time_s) {
                return Err(CodecError::UnorderedNodes { contour: idx });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_matching_fields() {
        let contour = Contour::from_nodes(vec![TfNode::new(0.5, 8000.0), TfNode::new(0.6, 8100.0)]);
        assert!(TonalFile::new(TonalHeader::default(), vec![contour]).is_ok());
    }

    #[test]
    fn test_rejects_undeclared_field() {
        let mut contour =
            Contour::from_nodes(vec![TfNode::new(0.5, 8000.0), TfNode::new(0.6, 8100.0)]);
        contour.score = Some(0.9);
        let result = TonalFile::new(TonalHeader::default(), vec![contour]);
        assert!(matches!(result, Err(CodecError::FeatureMismatch(_))));
    }

    #[test]
    fn test_rejects_missing_declared_field() {
        let header = TonalHeader {
            features: TonalFeatures::DEFAULT | TonalFeatures::SNR,
            ..TonalHeader::default()
        };
        let contour = Contour::from_nodes(vec![TfNode::new(0.5, 8000.0)]);
        let result = TonalFile::new(header, vec![contour]);
        assert!(matches!(result, Err(CodecError::FeatureMismatch(_))));
    }

    #[test]
    fn test_rejects_missing_time_freq_bits() {
        let header = TonalHeader {
            features: TonalFeatures::FREQ,
            ..TonalHeader::default()
        };
        let result = TonalFile::new(header, vec![]);
        assert!(matches!(result, Err(CodecError::FeatureMismatch(_))));
    }

    #[test]
    fn test_rejects_comment_without_bit() {
        let header = TonalHeader {
            comment: Some("hand labelled".into()),
            ..TonalHeader::default()
        };
        let result = TonalFile::new(header, vec![]);
        assert!(matches!(result, Err(CodecError::FeatureMismatch(_))));
    }

    #[test]
    fn test_rejects_non_increasing_node_times() {
        let ok = Contour::from_nodes(vec![TfNode::new(0.5, 8000.0), TfNode::new(0.6, 8100.0)]);
        let backwards =
            Contour::from_nodes(vec![TfNode::new(0.6, 8000.0), TfNode::new(0.5, 8100.0)]);
        let result = TonalFile::new(TonalHeader::default(), vec![ok, backwards]);
        assert!(matches!(result, Err(CodecError::UnorderedNodes { contour: 1 })));

        let stalled =
            Contour::from_nodes(vec![TfNode::new(0.5, 8000.0), TfNode::new(0.5, 8100.0)]);
        let result = TonalFile::new(TonalHeader::default(), vec![stalled]);
        assert!(matches!(result, Err(CodecError::UnorderedNodes { contour: 0 })));
    }
}
