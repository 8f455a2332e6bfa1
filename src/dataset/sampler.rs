//! Positive-patch classification and class-balanced sampling.
//!
//! Whistle energy is sparse, so the raw patch grid is dominated by negatives.
//! [`PositiveSet`] marks every patch whose mask would hold at least one
//! annotated pixel, and the two samplers rebalance draws against it. All
//! shuffling goes through an explicit generator so a seed reproduces a
//! selection exactly.

use rand::prelude::*;
use rand::rngs::StdRng;

use super::{DatasetError, PatchProvider};
use crate::grid::{GridError, PatchGridIndex};
use crate::tonal::Contour;
use crate::types::{MaskTile, SpectrogramTile};

/// Sorted set of global patch ids containing annotation energy.
#[derive(Debug, Clone)]
pub struct PositiveSet {
    ids: Vec<usize>,
}

impl PositiveSet {
    /// Mark every grid cell whose window contains a contour node.
    ///
    /// `contours` holds one list per corpus file, aligned with the grid's
    /// file order. Nodes outside the configured band are ignored. With
    /// overlapping patches a node lands in several cells per axis; the walk
    /// covers `ceil(length/advance - frac(position))` cells downward from
    /// the node's own division, dropping any that fall outside the file's
    /// grid. Nodes past the last time division mark nothing rather than
    /// bleeding into a neighboring band's ids.
    pub fn build(grid: &PatchGridIndex, contours: &[Vec<Contour>]) -> Self {
        let geom = grid.geometry();
        let freq_range = geom.freq_patch_len_hz / geom.freq_patch_adv_hz;
        let time_range = geom.time_patch_len_ms / geom.time_patch_adv_ms;
        let min_freq = grid.min_freq_hz();
        let max_freq = grid.max_freq_hz();

        let mut ids = Vec::new();
        for (file_idx, file_contours) in contours.iter().enumerate() {
            let (ntd, nfd) = grid.divisions(file_idx);
            if ntd == 0 || nfd == 0 {
                continue;
            }
            for contour in file_contours {
                for node in &contour.nodes {
                    if node.freq_hz < min_freq || node.freq_hz >= max_freq {
                        continue;
                    }
                    let freq_pos = (node.freq_hz - min_freq) / geom.freq_patch_adv_hz;
                    let time_pos = node.time_s * 1000.0 / geom.time_patch_adv_ms;
                    let freq_overlap = (freq_range - freq_pos.fract()).ceil() as usize;
                    let time_overlap = (time_range - time_pos.fract()).ceil() as usize;

                    for df in 0..freq_overlap {
                        let f_idx = freq_pos.floor() as isize - df as isize;
                        if f_idx < 0 {
                            break;
                        }
                        if f_idx as usize >= nfd {
                            continue;
                        }
                        for dt in 0..time_overlap {
                            let t_idx = time_pos.floor() as isize - dt as isize;
                            if t_idx < 0 {
                                break;
                            }
                            if t_idx as usize >= ntd {
                                continue;
                            }
                            if let Some(id) =
                                grid.global_id(file_idx, t_idx as usize, f_idx as usize)
                            {
                                ids.push(id);
                            }
                        }
                    }
                }
            }
        }
        Self::from_ids(ids)
    }

    /// Build directly from a list of ids, deduplicating.
    pub fn from_ids(mut ids: Vec<usize>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        PositiveSet { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: usize) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// A shuffled selection of patch ids holding a fixed positive proportion.
///
/// Indexing delegates to the underlying provider, so the view drops straight
/// into any loop that consumes (spectrogram, mask) pairs.
pub struct BalancedView<'d, P: PatchProvider> {
    dataset: &'d P,
    ids: Vec<usize>,
}

impl<'d, P: PatchProvider> BalancedView<'d, P> {
    /// Draw a view whose entries are `proportion` positive.
    ///
    /// Both classes are shuffled, truncated so positives make up the asked
    /// share (the positive pool caps how many entries survive), concatenated
    /// and shuffled again. `proportion` of 0 or 1 keeps all of one class and
    /// none of the other. Pass a seed to reproduce the same selection.
    pub fn new(
        dataset: &'d P,
        positives: &PositiveSet,
        proportion: f64,
        seed: Option<u64>,
    ) -> Self {
        let mut rng = rng_for(seed);
        let mut pos: Vec<usize> = positives.ids().to_vec();
        let mut neg: Vec<usize> = (0..dataset.len())
            .filter(|id| !positives.contains(*id))
            .collect();
        pos.shuffle(&mut rng);
        neg.shuffle(&mut rng);

        let (len_p, len_n) = if proportion <= 0.0 {
            (0, neg.len())
        } else if proportion >= 1.0 {
            (pos.len(), 0)
        } else {
            let len_p = (pos.len() as f64)
                .min(proportion * neg.len() as f64 / (1.0 - proportion))
                as usize;
            let len_n = ((1.0 - proportion) * len_p as f64 / proportion) as usize;
            (len_p, len_n)
        };
        pos.truncate(len_p);
        neg.truncate(len_n);

        let mut ids = pos;
        ids.append(&mut neg);
        ids.shuffle(&mut rng);
        BalancedView { dataset, ids }
    }

    /// Global patch ids in view order.
    pub fn ids(&self) -> &[usize] {
        &self.ids
    }
}

/// View positions stand in for patch ids, so a view slots into anything
/// that consumes a [`PatchProvider`], bulk export included.
impl<P: PatchProvider> PatchProvider for BalancedView<'_, P> {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn get(&self, idx: usize) -> Result<(SpectrogramTile, MaskTile), DatasetError> {
        match self.ids.get(idx) {
            Some(&id) => self.dataset.get(id),
            None => Err(DatasetError::Grid(GridError::IndexOutOfRange {
                id: idx,
                total: self.ids.len(),
            })),
        }
    }
}

/// Alternating positive/negative draw schedule with per-pass reshuffles.
///
/// Each pass lays out `epoch_size` ids: even positions come from the
/// positive pool, odd from the negative, each pool freshly shuffled and
/// cycled if the pass outruns it. The default pass length visits the
/// smaller pool exactly once per class.
pub struct BalancedIterable {
    positive: Vec<usize>,
    negative: Vec<usize>,
    epoch_size: usize,
    rng: StdRng,
}

impl BalancedIterable {
    pub fn new<P: PatchProvider>(
        dataset: &P,
        positives: &PositiveSet,
        epoch_size: Option<usize>,
        seed: Option<u64>,
    ) -> Self {
        let positive = positives.ids().to_vec();
        let negative: Vec<usize> = (0..dataset.len())
            .filter(|id| !positives.contains(*id))
            .collect();
        let epoch_size = epoch_size.unwrap_or(2 * positive.len().min(negative.len()));
        BalancedIterable {
            positive,
            negative,
            epoch_size,
            rng: rng_for(seed),
        }
    }

    pub fn epoch_size(&self) -> usize {
        self.epoch_size
    }

    /// Reshuffle both pools and lay out the next pass's draw order. An
    /// empty pool yields an empty pass.
    pub fn next_epoch(&mut self) -> Vec<usize> {
        if self.positive.is_empty() || self.negative.is_empty() {
            return Vec::new();
        }
        self.positive.shuffle(&mut self.rng);
        self.negative.shuffle(&mut self.rng);
        (0..self.epoch_size)
            .map(|i| {
                let pool = if i % 2 == 0 { &self.positive } else { &self.negative };
                pool[(i / 2) % pool.len()]
            })
            .collect()
    }
}
