//! End-to-end corpus checks over synthesized audio and annotations.
//!
//! The corpus is two 2 s recordings at 16 kHz: `a.wav` carries a 4125 Hz
//! tone with an annotation tracing 4200 Hz over 100..132 ms, `b.wav` is
//! silence with an empty annotation. With 8 ms frames, 2 ms steps and
//! 16 x 16 patches over 0..8000 Hz each file grids into 62 x 4 = 248
//! patches. The tone fits 33 whole cycles per frame, so its energy stays
//! in bin 33 at constant magnitude, and the 4200 Hz annotation rounds to
//! the same tile row as that bin.

use std::f64::consts::TAU;
use std::io;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use whistlegrid::dataset::export::{export_all, PatchSink};
use whistlegrid::dataset::DatasetConfig;
use whistlegrid::grid::PatchParams;
use whistlegrid::mask::ExpandParams;
use whistlegrid::tonal::{codec, Contour, TfNode, TonalFile, TonalHeader};
use whistlegrid::{MaskTile, PatchProvider, SpectrogramTile, TonalDataset};

const RATE: u32 = 16000;

fn write_wav(path: &Path, samples: impl Iterator<Item = i16>) {
    let spec = WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for sample in samples {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}

fn sine(freq_hz: f64, samples: usize) -> impl Iterator<Item = i16> {
    (0..samples).map(move |n| (1000.0 * (TAU * freq_hz * n as f64 / RATE as f64).sin()) as i16)
}

fn write_annotation(path: &Path, contours: Vec<Contour>) {
    let file = TonalFile::new(TonalHeader::default(), contours).unwrap();
    codec::write_file(path, &file).unwrap();
}

/// Lay out audio/ and anno/ under `dir` and return their paths.
fn build_corpus(dir: &Path) -> (PathBuf, PathBuf) {
    let audio_dir = dir.join("audio");
    let anno_dir = dir.join("anno");
    std::fs::create_dir_all(&audio_dir).unwrap();
    std::fs::create_dir_all(&anno_dir).unwrap();

    let two_seconds = (2 * RATE) as usize;
    write_wav(&audio_dir.join("a.wav"), sine(4125.0, two_seconds));
    write_wav(&audio_dir.join("b.wav"), std::iter::repeat(0).take(two_seconds));

    let trace = Contour::from_nodes(vec![
        TfNode::new(0.100, 4200.0),
        TfNode::new(0.132, 4200.0),
    ]);
    write_annotation(&anno_dir.join("a.bin"), vec![trace]);
    write_annotation(&anno_dir.join("b.bin"), Vec::new());

    (audio_dir, anno_dir)
}

fn config() -> DatasetConfig {
    DatasetConfig {
        min_freq_hz: 0.0,
        max_freq_hz: 8000.0,
        patch: PatchParams {
            time_patch_frames: 16,
            freq_patch_frames: 16,
            time_patch_advance: 16,
            freq_patch_advance: 16,
        },
        ..DatasetConfig::default()
    }
}

fn open(dir: &Path, config: DatasetConfig) -> TonalDataset {
    let (audio_dir, anno_dir) = build_corpus(dir);
    TonalDataset::open(&audio_dir, &anno_dir, config).unwrap()
}

#[test]
fn test_grid_layout_and_positive_classification() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = open(dir.path(), config());

    assert_eq!(dataset.num_files(), 2);
    assert_eq!(dataset.len(), 496);
    assert_eq!(dataset.grid().divisions(0), (62, 4));
    assert_eq!(dataset.grid().divisions(1), (62, 4));

    // Nodes at 100 and 132 ms, 4200 Hz: time divisions 3 and 4 in
    // frequency division 2 of the first file.
    assert_eq!(dataset.positives().ids(), &[127, 128]);
}

#[test]
fn test_every_id_resolves_and_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = open(dir.path(), config());
    let grid = dataset.grid();

    for id in 0..dataset.len() {
        let loc = grid.lookup(id).unwrap();
        assert_eq!(
            grid.global_id(loc.file_idx, loc.time_division, loc.freq_division),
            Some(id)
        );
    }
    assert!(grid.lookup(496).is_err());
}

#[test]
fn test_positive_patch_renders_aligned_tile_and_mask() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = open(dir.path(), config());

    // Patch 127: window 96..128 ms x 4000..6000 Hz.
    let (spectrogram, mask) = dataset.get(127).unwrap();
    assert_eq!((spectrogram.width, spectrogram.height), (16, 16));
    assert_eq!((mask.width, mask.height), (16, 16));
    assert_eq!(spectrogram.actual_end_time_ms, 128.0);

    // Bin 33, flipped within the 32..48 bin band, is tile row 14. Values
    // are normalized: log10(1000 * 128 / 2) / 6.
    let expected = (64000.0f32).log10() / 6.0;
    for col in 0..16 {
        assert!((spectrogram.at(14, col) - expected).abs() < 0.01, "column {col}");
    }
    assert!(spectrogram.values.iter().all(|v| (0.0..=1.0).contains(v)));

    // The 4200 Hz trace rounds to row 14 as well and enters this window
    // at 100 ms, column 2.
    assert_eq!(mask.set_count(), 14);
    for col in 2..16 {
        assert_eq!(mask.at(14, col), 1.0, "column {col}");
    }
}

#[test]
fn test_negative_patches_have_empty_masks() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = open(dir.path(), config());

    let (_, mask) = dataset.get(0).unwrap();
    assert_eq!(mask.set_count(), 0);

    // First patch of the silent file.
    let (spectrogram, mask) = dataset.get(248).unwrap();
    assert_eq!(mask.set_count(), 0);
    assert!(spectrogram.values.iter().all(|&v| v == 0.0));
}

#[test]
fn test_expansion_widens_along_the_tone() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = open(
        dir.path(),
        DatasetConfig {
            expansion: Some(ExpandParams::default()),
            ..config()
        },
    );

    // The tone row holds constant energy, so growth from the leftmost
    // seed at column 2 reaches columns 0 and 1.
    let (_, mask) = dataset.get(127).unwrap();
    assert_eq!(mask.set_count(), 16);
    for col in 0..16 {
        assert_eq!(mask.at(14, col), 1.0, "column {col}");
    }
}

#[test]
fn test_fractional_rate_fetch_keeps_shapes_aligned() {
    // At 22050 Hz the 2 ms hop is a fractional 44.1 samples; every fetch
    // must still pair a 16 x 16 tile with a 16 x 16 mask, with expansion on.
    let dir = tempfile::tempdir().unwrap();
    let audio_dir = dir.path().join("audio");
    let anno_dir = dir.path().join("anno");
    std::fs::create_dir_all(&audio_dir).unwrap();
    std::fs::create_dir_all(&anno_dir).unwrap();

    let rate = 22_050u32;
    let spec = WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(audio_dir.join("c.wav"), spec).unwrap();
    for n in 0..rate as usize {
        let sample = (1000.0 * (TAU * 4125.0 * n as f64 / rate as f64).sin()) as i16;
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();

    let trace = Contour::from_nodes(vec![
        TfNode::new(0.004, 4200.0),
        TfNode::new(0.030, 4200.0),
    ]);
    write_annotation(&anno_dir.join("c.bin"), vec![trace]);

    let dataset = TonalDataset::open(
        &audio_dir,
        &anno_dir,
        DatasetConfig {
            expansion: Some(ExpandParams::default()),
            ..config()
        },
    )
    .unwrap();

    assert_eq!(dataset.grid().divisions(0), (31, 4));
    for id in 0..dataset.len() {
        let (spectrogram, mask) = dataset.get(id).unwrap();
        assert_eq!((spectrogram.width, spectrogram.height), (16, 16), "patch {id}");
        assert_eq!((mask.width, mask.height), (16, 16), "patch {id}");
    }
}

#[test]
fn test_on_demand_store_matches_owned() {
    let dir = tempfile::tempdir().unwrap();
    let (audio_dir, anno_dir) = build_corpus(dir.path());

    let owned = TonalDataset::open(&audio_dir, &anno_dir, config()).unwrap();
    let on_demand = TonalDataset::open(
        &audio_dir,
        &anno_dir,
        DatasetConfig {
            cache_audio: false,
            ..config()
        },
    )
    .unwrap();

    let (spec_a, mask_a) = owned.get(127).unwrap();
    let (spec_b, mask_b) = on_demand.get(127).unwrap();
    assert_eq!(spec_a.values, spec_b.values);
    assert_eq!(mask_a.values, mask_b.values);
}

#[test]
fn test_balanced_view_over_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = open(dir.path(), config());

    let view = dataset.balanced_view(0.5, Some(13));
    assert_eq!(view.len(), 4);
    let n_pos = view
        .ids()
        .iter()
        .filter(|id| dataset.positives().contains(**id))
        .count();
    assert_eq!(n_pos, 2);

    let (spectrogram, mask) = view.get(0).unwrap();
    assert_eq!((spectrogram.width, spectrogram.height), (16, 16));
    assert_eq!((mask.width, mask.height), (16, 16));
}

struct CountingSink {
    tiles: usize,
    shape: Option<(usize, usize)>,
}

impl PatchSink for CountingSink {
    fn put(
        &mut self,
        _id: usize,
        spectrogram: &SpectrogramTile,
        mask: &MaskTile,
    ) -> io::Result<()> {
        assert_eq!((spectrogram.width, spectrogram.height), (mask.width, mask.height));
        self.shape.get_or_insert((spectrogram.width, spectrogram.height));
        self.tiles += 1;
        Ok(())
    }
}

#[test]
fn test_export_visits_every_patch() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = open(dir.path(), config());

    let mut sink = CountingSink { tiles: 0, shape: None };
    let report = export_all(&dataset, &mut sink, true).unwrap();
    assert_eq!(report.written, 496);
    assert!(report.failures.is_empty());
    assert_eq!(sink.tiles, 496);
    assert_eq!(sink.shape, Some((16, 16)));
}
