//! wgrid: inspect and export whistle patch-grid corpora.
//!
//! Three subcommands over an audio + annotation directory pair:
//! - `info` summarizes the grid a corpus would produce
//! - `export` renders every patch, or a class-balanced draw, into chunked
//!   raw-float files
//! - `dump` renders a single patch to PGM images for eyeballing

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;

use whistlegrid::dataset::export::{export_all, PatchSink};
use whistlegrid::dataset::DatasetConfig;
use whistlegrid::grid::PatchParams;
use whistlegrid::mask::ExpandParams;
use whistlegrid::{MaskTile, PatchProvider, RenderParams, SpectrogramTile, TonalDataset};

#[derive(Parser)]
#[command(name = "wgrid", version, about = "Inspect and export whistle patch-grid corpora")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize the patch grid a corpus produces.
    Info {
        #[command(flatten)]
        corpus: CorpusArgs,
        /// Emit the summary as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Render patches into chunked raw-float files plus a manifest.
    Export {
        #[command(flatten)]
        corpus: CorpusArgs,
        /// Output directory for chunk files and manifest.json.
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
        /// Patches per chunk file.
        #[arg(long, default_value_t = 1024)]
        chunk_size: usize,
        /// Export a class-balanced draw with this positive share instead of
        /// the whole grid.
        #[arg(long, value_name = "PROPORTION")]
        balance: Option<f64>,
        /// Shuffle seed for --balance.
        #[arg(long)]
        seed: Option<u64>,
        /// Abort on the first patch that fails to render.
        #[arg(long)]
        fail_fast: bool,
    },
    /// Render one patch to patch_<ID>_{spec,mask}.pgm.
    Dump {
        #[command(flatten)]
        corpus: CorpusArgs,
        /// Global patch id.
        id: usize,
        /// Output directory.
        #[arg(long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },
}

#[derive(clap::Args)]
struct CorpusArgs {
    /// Directory of WAV recordings.
    audio_dir: PathBuf,
    /// Directory of silbido annotation files.
    annotation_dir: PathBuf,
    /// Annotation extension paired with audio stems.
    #[arg(long, default_value = "bin")]
    annotation_ext: String,
    /// Bottom of the rendered band in Hz.
    #[arg(long, default_value_t = 5000.0)]
    min_freq: f64,
    /// Top of the rendered band in Hz.
    #[arg(long, default_value_t = 50000.0)]
    max_freq: f64,
    /// DFT window length in ms.
    #[arg(long, default_value_t = 8.0)]
    frame_ms: f64,
    /// Hop between frames in ms.
    #[arg(long, default_value_t = 2.0)]
    step_ms: f64,
    /// Log-magnitude normalization floor.
    #[arg(long, default_value_t = 0.0)]
    clip_min: f32,
    /// Log-magnitude normalization ceiling.
    #[arg(long, default_value_t = 6.0)]
    clip_max: f32,
    /// Patch size in time frames.
    #[arg(long, default_value_t = 64)]
    time_frames: usize,
    /// Patch size in frequency bins.
    #[arg(long, default_value_t = 64)]
    freq_frames: usize,
    /// Rasterized contour line height in pixels.
    #[arg(long, default_value_t = 1)]
    line_thickness: usize,
    /// Widen masks along whistle energy after rasterization.
    #[arg(long)]
    expand: bool,
    /// Fail on annotations that do not decode instead of keeping them as
    /// contour-less files.
    #[arg(long)]
    strict: bool,
    /// Reopen audio per patch instead of caching decoded waveforms.
    #[arg(long)]
    no_cache: bool,
}

impl CorpusArgs {
    fn open(&self) -> Result<TonalDataset> {
        let config = DatasetConfig {
            render: RenderParams {
                frame_time_span_ms: self.frame_ms,
                step_time_span_ms: self.step_ms,
                clip_min: self.clip_min,
                clip_max: self.clip_max,
                ..RenderParams::default()
            },
            min_freq_hz: self.min_freq,
            max_freq_hz: self.max_freq,
            patch: PatchParams {
                time_patch_frames: self.time_frames,
                freq_patch_frames: self.freq_frames,
                time_patch_advance: self.time_frames,
                freq_patch_advance: self.freq_frames,
            },
            line_thickness: self.line_thickness,
            expansion: self.expand.then(ExpandParams::default),
            annotation_ext: self.annotation_ext.clone(),
            fail_fast: self.strict,
            cache_audio: !self.no_cache,
        };
        TonalDataset::open(&self.audio_dir, &self.annotation_dir, config)
            .context("failed to open corpus")
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.command {
        Command::Info { corpus, json } => info_cmd(&corpus, json),
        Command::Export {
            corpus,
            out,
            chunk_size,
            balance,
            seed,
            fail_fast,
        } => export_cmd(&corpus, &out, chunk_size, balance, seed, fail_fast),
        Command::Dump { corpus, id, out } => dump_cmd(&corpus, id, &out),
    }
}

fn info_cmd(corpus: &CorpusArgs, json: bool) -> Result<()> {
    let dataset = corpus.open()?;
    let grid = dataset.grid();
    let geom = grid.geometry();
    let files: Vec<FileSummary> = (0..dataset.num_files())
        .map(|file_idx| {
            let (ntd, nfd) = grid.divisions(file_idx);
            FileSummary {
                audio: dataset.audio_path(file_idx).display().to_string(),
                annotation: dataset.annotation_path(file_idx).display().to_string(),
                contours: dataset.contours(file_idx).len(),
                time_divisions: ntd,
                freq_divisions: nfd,
                first_id: grid.file_base(file_idx),
            }
        })
        .collect();
    let summary = CorpusSummary {
        patch_time_len_ms: geom.time_patch_len_ms,
        patch_freq_len_hz: geom.freq_patch_len_hz,
        total_patches: grid.total_patches(),
        positive_patches: dataset.positives().len(),
        skipped_annotations: dataset.decode_failures().len(),
        files,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!(
        "patch: {:.1} ms x {:.1} Hz",
        summary.patch_time_len_ms, summary.patch_freq_len_hz
    );
    println!("files: {}", summary.files.len());
    for file in &summary.files {
        println!(
            "  {}: {} contours, {} x {} patches (ids {}..{})",
            file.audio,
            file.contours,
            file.time_divisions,
            file.freq_divisions,
            file.first_id,
            file.first_id + file.time_divisions * file.freq_divisions,
        );
    }
    println!("total patches: {}", summary.total_patches);
    println!("positive patches: {}", summary.positive_patches);
    if summary.skipped_annotations > 0 {
        println!("skipped annotations: {}", summary.skipped_annotations);
    }
    Ok(())
}

fn export_cmd(
    corpus: &CorpusArgs,
    out: &Path,
    chunk_size: usize,
    balance: Option<f64>,
    seed: Option<u64>,
    fail_fast: bool,
) -> Result<()> {
    ensure!(chunk_size > 0, "chunk size must be positive");
    let dataset = corpus.open()?;
    if dataset.is_empty() {
        bail!("corpus holds no patches");
    }

    let mut sink = ChunkedDirSink::new(out, chunk_size)
        .with_context(|| format!("failed to start export into {}", out.display()))?;
    let (report, source_ids) = match balance {
        Some(proportion) => {
            ensure!(
                (0.0..=1.0).contains(&proportion),
                "balance must lie in [0, 1]"
            );
            let view = dataset.balanced_view(proportion, seed);
            if view.is_empty() {
                bail!("balanced selection drew no patches");
            }
            let report = export_all(&view, &mut sink, fail_fast)?;
            (report, Some(view.ids().to_vec()))
        }
        None => (export_all(&dataset, &mut sink, fail_fast)?, None),
    };
    let (patch_width, patch_height, chunks) = sink.finish()?;

    let manifest = Manifest {
        config: dataset.config().clone(),
        patch_width,
        patch_height,
        chunk_size,
        total_written: report.written,
        failed_ids: report.failures.iter().map(|(id, _)| *id).collect(),
        source_ids,
        chunks,
    };
    let manifest_path = out.join("manifest.json");
    let file = File::create(&manifest_path)
        .with_context(|| format!("failed to create {}", manifest_path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &manifest)?;

    info!(
        "wrote {} patches in {} chunks to {}",
        report.written,
        manifest.chunks.len(),
        out.display()
    );
    if !manifest.failed_ids.is_empty() {
        warn!("{} patches failed to render", manifest.failed_ids.len());
    }
    Ok(())
}

fn dump_cmd(corpus: &CorpusArgs, id: usize, out: &Path) -> Result<()> {
    let dataset = corpus.open()?;
    let (spectrogram, mask) = dataset.get(id)?;
    fs::create_dir_all(out)?;

    let spec_path = out.join(format!("patch_{id}_spec.pgm"));
    let mask_path = out.join(format!("patch_{id}_mask.pgm"));
    write_pgm(&spec_path, spectrogram.width, spectrogram.height, &spectrogram.values)?;
    write_pgm(&mask_path, mask.width, mask.height, &mask.values)?;
    println!("wrote {} and {}", spec_path.display(), mask_path.display());
    Ok(())
}

#[derive(Serialize)]
struct CorpusSummary {
    patch_time_len_ms: f64,
    patch_freq_len_hz: f64,
    total_patches: usize,
    positive_patches: usize,
    skipped_annotations: usize,
    files: Vec<FileSummary>,
}

#[derive(Serialize)]
struct FileSummary {
    audio: String,
    annotation: String,
    contours: usize,
    time_divisions: usize,
    freq_divisions: usize,
    first_id: usize,
}

/// Layout of an exported corpus: the config that produced it, per-chunk file
/// names and counts, the shared patch shape, and the ids that failed to
/// render. A full export writes ascending patch ids minus `failed_ids`; a
/// balanced export records its draw in `source_ids` and `failed_ids` index
/// into that list.
#[derive(Serialize)]
struct Manifest {
    config: DatasetConfig,
    patch_width: usize,
    patch_height: usize,
    chunk_size: usize,
    total_written: usize,
    failed_ids: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_ids: Option<Vec<usize>>,
    chunks: Vec<ChunkEntry>,
}

#[derive(Serialize)]
struct ChunkEntry {
    data: String,
    labels: String,
    count: usize,
}

/// Writes patches as raw little-endian f32, `chunk_size` to a file pair:
/// `data_NNNNN.f32` holds spectrogram tiles, `labels_NNNNN.f32` the masks,
/// both row-major with the highest frequency first.
struct ChunkedDirSink {
    dir: PathBuf,
    chunk_size: usize,
    in_chunk: usize,
    patch_width: usize,
    patch_height: usize,
    data: BufWriter<File>,
    labels: BufWriter<File>,
    chunks: Vec<ChunkEntry>,
}

impl ChunkedDirSink {
    fn new(dir: &Path, chunk_size: usize) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let (data, labels, entry) = Self::open_pair(dir, 0)?;
        Ok(ChunkedDirSink {
            dir: dir.to_path_buf(),
            chunk_size,
            in_chunk: 0,
            patch_width: 0,
            patch_height: 0,
            data,
            labels,
            chunks: vec![entry],
        })
    }

    fn open_pair(
        dir: &Path,
        index: usize,
    ) -> io::Result<(BufWriter<File>, BufWriter<File>, ChunkEntry)> {
        let data_name = format!("data_{index:05}.f32");
        let labels_name = format!("labels_{index:05}.f32");
        let data = BufWriter::new(File::create(dir.join(&data_name))?);
        let labels = BufWriter::new(File::create(dir.join(&labels_name))?);
        Ok((
            data,
            labels,
            ChunkEntry {
                data: data_name,
                labels: labels_name,
                count: 0,
            },
        ))
    }

    fn roll(&mut self) -> io::Result<()> {
        self.data.flush()?;
        self.labels.flush()?;
        if let Some(last) = self.chunks.last_mut() {
            last.count = self.in_chunk;
        }
        let (data, labels, entry) = Self::open_pair(&self.dir, self.chunks.len())?;
        self.data = data;
        self.labels = labels;
        self.chunks.push(entry);
        self.in_chunk = 0;
        Ok(())
    }

    fn finish(mut self) -> io::Result<(usize, usize, Vec<ChunkEntry>)> {
        self.data.flush()?;
        self.labels.flush()?;
        if let Some(last) = self.chunks.last_mut() {
            last.count = self.in_chunk;
        }
        Ok((self.patch_width, self.patch_height, self.chunks))
    }
}

impl PatchSink for ChunkedDirSink {
    fn put(
        &mut self,
        _id: usize,
        spectrogram: &SpectrogramTile,
        mask: &MaskTile,
    ) -> io::Result<()> {
        if self.in_chunk == self.chunk_size {
            self.roll()?;
        }
        if self.patch_width == 0 {
            self.patch_width = spectrogram.width;
            self.patch_height = spectrogram.height;
        }
        for &value in &spectrogram.values {
            self.data.write_f32::<LittleEndian>(value)?;
        }
        for &value in &mask.values {
            self.labels.write_f32::<LittleEndian>(value)?;
        }
        self.in_chunk += 1;
        Ok(())
    }
}

/// Binary PGM with values mapped from [0, 1] to 0-255.
fn write_pgm(path: &Path, width: usize, height: usize, values: &[f32]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    write!(w, "P5\n{width} {height}\n255\n")?;
    for &value in values {
        w.write_all(&[(value.clamp(0.0, 1.0) * 255.0) as u8])?;
    }
    w.flush()?;
    Ok(())
}
