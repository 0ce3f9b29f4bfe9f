//! SentencePiece models, loaded and run through the `sentencepiece` processor.
//!
//! Any serialized SentencePiece model works (unigram or BPE). The processor applies the
//! model's own normalization, so every word comes back with a leading `▁` piece or prefix.

use std::fmt;
use std::path::Path;

use log::{debug, warn};
use rustc_hash::FxHashSet;
use sentencepiece::{PieceWithId, SentencePieceProcessor};

use crate::error::{Result, RtokError};

/// Kind of a piece in a serialized model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PieceKind {
    Normal,
    Unknown,
    UserDefined,
}

impl PieceKind {
    fn code(self) -> u64 {
        match self {
            Self::Normal => 1,
            Self::Unknown => 2,
            Self::UserDefined => 4,
        }
    }
}

/// A loaded SentencePiece model, optionally restricted to a vocabulary.
pub struct SentencePiece {
    processor: SentencePieceProcessor,
    vocabulary: Option<FxHashSet<String>>,
}

impl fmt::Debug for SentencePiece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentencePiece")
            .field("pieces", &self.processor.len())
            .field("restricted", &self.vocabulary.is_some())
            .finish()
    }
}

impl SentencePiece {
    /// Loads a serialized model (`.model` file).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let processor = SentencePieceProcessor::open(path).map_err(|err| {
            RtokError::model_load(path, format!("unable to open SentencePiece model: {err}"))
        })?;
        debug!(
            "loaded SentencePiece model {path:?} with {} pieces",
            processor.len()
        );
        Ok(Self {
            processor,
            vocabulary: None,
        })
    }

    /// Loads a model from its serialized protobuf bytes.
    pub fn from_serialized_proto(data: &[u8]) -> Result<Self> {
        Ok(Self {
            processor: SentencePieceProcessor::from_serialized_proto(data)?,
            vocabulary: None,
        })
    }

    /// Builds a unigram model from `(piece, score)` pairs. The piece at `unk_id` is the unknown
    /// piece and `user_defined` pieces always match as a whole.
    pub fn from_pieces(
        pieces: &[(String, f32)],
        unk_id: usize,
        user_defined: &[String],
    ) -> Result<Self> {
        Self::from_serialized_proto(&unigram_model_proto(pieces, unk_id, user_defined)?)
    }

    /// Restricts multi-character pieces to `vocabulary`.
    #[must_use]
    pub fn with_vocabulary<I, S>(mut self, vocabulary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vocabulary = Some(vocabulary.into_iter().map(Into::into).collect());
        self
    }

    /// Number of pieces in the model.
    #[must_use]
    pub fn len(&self) -> usize {
        self.processor.len()
    }

    /// Returns `true` when the model has no pieces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processor.is_empty()
    }

    /// Identifier of the unknown piece.
    #[must_use]
    pub fn unk_id(&self) -> u32 {
        self.processor.unk_id()
    }

    /// Best segmentation of `text`.
    #[must_use]
    pub fn encode_best(&self, text: &str) -> Vec<String> {
        self.encode(text, 0, 0.0)
    }

    /// Segments `text`, sampling when `nbest_size` is negative or greater than one.
    ///
    /// Sampling draws from the processor's own generator. A failed encoding yields no pieces.
    #[must_use]
    pub fn encode(&self, text: &str, nbest_size: i32, alpha: f32) -> Vec<String> {
        let encoded = if nbest_size == 0 || nbest_size == 1 {
            self.processor.encode(text)
        } else {
            // A size of `usize::MAX` reaches the processor as -1: sample the full lattice.
            let nbest = usize::try_from(nbest_size).unwrap_or(usize::MAX);
            self.processor.sample_encode(text, nbest, alpha)
        };
        match encoded {
            Ok(pieces) => self.restrict(pieces),
            Err(err) => {
                warn!("SentencePiece failed to encode {text:?}: {err}");
                Vec::new()
            }
        }
    }

    fn restrict(&self, pieces: Vec<PieceWithId>) -> Vec<String> {
        let Some(vocabulary) = &self.vocabulary else {
            return pieces.into_iter().map(|piece| piece.piece).collect();
        };
        let mut restricted = Vec::with_capacity(pieces.len());
        for PieceWithId { piece, .. } in pieces {
            if piece.chars().nth(1).is_none() || vocabulary.contains(&piece) {
                restricted.push(piece);
            } else {
                split_in_vocabulary(&piece, vocabulary, &mut restricted);
            }
        }
        restricted
    }
}

// Greedy longest match over pieces of `vocabulary`, falling back to single characters.
fn split_in_vocabulary(piece: &str, vocabulary: &FxHashSet<String>, out: &mut Vec<String>) {
    let mut rest = piece;
    while let Some(first) = rest.chars().next() {
        let end = rest
            .char_indices()
            .map(|(offset, c)| offset + c.len_utf8())
            .skip(1)
            .filter(|&end| vocabulary.contains(&rest[..end]))
            .last()
            .unwrap_or(first.len_utf8());
        out.push(rest[..end].to_owned());
        rest = &rest[end..];
    }
}

/// Serializes a unigram `ModelProto` holding `pieces`.
///
/// Only the fields the processor reads are written: the pieces, the model type and a default
/// normalizer spec (no character map, dummy prefix, whitespace escaping).
pub(crate) fn unigram_model_proto(
    pieces: &[(String, f32)],
    unk_id: usize,
    user_defined: &[String],
) -> Result<Vec<u8>> {
    if unk_id >= pieces.len() {
        return Err(RtokError::InvalidConfig(format!(
            "unk_id {unk_id} is out of range for {} pieces",
            pieces.len()
        )));
    }

    let mut model = Vec::new();
    let mut seen = FxHashSet::default();
    for (id, (piece, score)) in pieces.iter().enumerate() {
        if piece.is_empty() || !score.is_finite() {
            return Err(RtokError::InvalidConfig(format!(
                "invalid SentencePiece entry {piece:?} with score {score}"
            )));
        }
        if !seen.insert(piece.as_str()) {
            continue;
        }
        let kind = if id == unk_id {
            PieceKind::Unknown
        } else if user_defined.contains(piece) {
            PieceKind::UserDefined
        } else {
            PieceKind::Normal
        };
        let mut entry = Vec::with_capacity(piece.len() + 8);
        put_bytes(&mut entry, 1, piece.as_bytes());
        put_key(&mut entry, 2, WIRE_FIXED32);
        entry.extend_from_slice(&score.to_le_bytes());
        put_varint_field(&mut entry, 3, kind.code());
        put_bytes(&mut model, 1, &entry);
    }

    // trainer_spec.model_type = UNIGRAM
    let mut trainer_spec = Vec::new();
    put_varint_field(&mut trainer_spec, 3, 1);
    put_bytes(&mut model, 2, &trainer_spec);

    let mut normalizer_spec = Vec::new();
    put_bytes(&mut normalizer_spec, 1, b"identity");
    put_varint_field(&mut normalizer_spec, 3, 1);
    put_varint_field(&mut normalizer_spec, 4, 1);
    put_varint_field(&mut normalizer_spec, 5, 1);
    put_bytes(&mut model, 3, &normalizer_spec);

    Ok(model)
}

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED32: u64 = 5;
const WIRE_BYTES: u64 = 2;

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn put_key(out: &mut Vec<u8>, field: u64, wire_type: u64) {
    put_varint(out, (field << 3) | wire_type);
}

fn put_varint_field(out: &mut Vec<u8>, field: u64, value: u64) {
    put_key(out, field, WIRE_VARINT);
    put_varint(out, value);
}

fn put_bytes(out: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    put_key(out, field, WIRE_BYTES);
    put_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn pieces(entries: &[(&str, f32)]) -> Vec<(String, f32)> {
        entries
            .iter()
            .map(|(piece, score)| ((*piece).to_owned(), *score))
            .collect()
    }

    fn model() -> SentencePiece {
        let entries = pieces(&[
            ("<unk>", 0.0),
            ("▁", -2.0),
            ("▁hello", -3.0),
            ("▁world", -3.5),
            ("▁he", -4.0),
            ("llo", -4.0),
            ("h", -5.0),
            ("e", -5.0),
            ("l", -5.0),
            ("o", -5.0),
            ("w", -5.0),
            ("r", -5.0),
            ("d", -5.0),
        ]);
        SentencePiece::from_pieces(&entries, 0, &[]).unwrap()
    }

    #[test]
    fn best_path_prefers_whole_words() {
        let model = model();
        assert_eq!(model.len(), 13);
        assert_eq!(model.unk_id(), 0);
        assert_eq!(model.encode_best("hello world"), vec!["▁hello", "▁world"]);
        assert_eq!(model.encode_best("held"), vec!["▁he", "l", "d"]);
    }

    #[test]
    fn vocabulary_restricts_long_pieces() {
        let model = model().with_vocabulary(["▁he", "llo"]);
        assert_eq!(model.encode_best("hello"), vec!["▁he", "llo"]);

        let model = self::model().with_vocabulary(["▁"]);
        assert_eq!(model.encode_best("hello"), vec!["▁", "h", "e", "l", "l", "o"]);
    }

    #[test]
    fn sampling_keeps_the_surface() {
        let model = model();
        let sampled: HashSet<Vec<String>> = (0..100)
            .map(|_| model.encode("hello", -1, 0.1))
            .collect();
        assert!(sampled.iter().all(|pieces| pieces.concat() == "▁hello"));
        assert_eq!(model.encode("hello", 1, 0.1), vec!["▁hello"]);
    }

    #[test]
    fn model_files_are_loaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("toy.model");
        let entries = pieces(&[("<unk>", 0.0), ("▁a", -1.0), ("a", -2.0)]);
        std::fs::write(&path, unigram_model_proto(&entries, 0, &[]).unwrap()).unwrap();

        let model = SentencePiece::from_file(&path).unwrap();
        assert_eq!(model.encode_best("a a"), vec!["▁a", "▁a"]);

        let missing = dir.path().join("missing.model");
        assert!(matches!(
            SentencePiece::from_file(&missing),
            Err(RtokError::ModelLoad { .. })
        ));
        std::fs::write(&path, "▁a\t-1\n").unwrap();
        assert!(matches!(
            SentencePiece::from_file(&path),
            Err(RtokError::ModelLoad { .. })
        ));
    }

    #[test]
    fn invalid_inventories_are_rejected() {
        let entries = pieces(&[("▁a", -1.0)]);
        assert!(unigram_model_proto(&entries, 3, &[]).is_err());
        let entries = pieces(&[("<unk>", 0.0), ("▁a", f32::NAN)]);
        assert!(unigram_model_proto(&entries, 0, &[]).is_err());
    }

    #[test]
    fn user_defined_pieces_match_whole() {
        let entries = pieces(&[
            ("<unk>", 0.0),
            ("<sep>", 0.0),
            ("▁", -1.0),
            ("a", -2.0),
            ("<", -2.0),
            ("s", -2.0),
            ("e", -2.0),
            ("p", -2.0),
            (">", -2.0),
        ]);
        let model = SentencePiece::from_pieces(&entries, 0, &["<sep>".to_owned()]).unwrap();
        assert_eq!(model.encode_best("a<sep>"), vec!["▁", "a", "<sep>"]);
    }

    #[test]
    fn varints_use_continuation_bits() {
        let mut out = Vec::new();
        put_varint(&mut out, 300);
        assert_eq!(out, vec![0xac, 0x02]);
    }
}
