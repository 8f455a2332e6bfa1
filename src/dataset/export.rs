//! Bulk patch enumeration into an external sink.

use std::io;

use log::warn;
use thiserror::Error;

use super::{DatasetError, PatchProvider};
use crate::types::{MaskTile, SpectrogramTile};

/// Receives rendered patches during a bulk export. Implementations decide
/// the storage layout; `export_all` only guarantees ascending ids.
pub trait PatchSink {
    fn put(&mut self, id: usize, spectrogram: &SpectrogramTile, mask: &MaskTile)
        -> io::Result<()>;
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to render patch {id}: {source}")]
    Fetch { id: usize, source: DatasetError },
    #[error("sink write failed: {0}")]
    Sink(#[from] io::Error),
}

/// What a bulk export accomplished: patches handed to the sink, plus the
/// per-patch render failures that were skipped.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: usize,
    pub failures: Vec<(usize, DatasetError)>,
}

/// Render every patch in id order and hand each to the sink.
///
/// A patch that fails to render is logged, recorded in the report, and
/// skipped. With `fail_fast` set the first render failure aborts instead.
/// Sink errors are always fatal.
pub fn export_all<P, S>(
    provider: &P,
    sink: &mut S,
    fail_fast: bool,
) -> Result<ExportReport, ExportError>
where
    P: PatchProvider,
    S: PatchSink,
{
    let mut report = ExportReport::default();
    for id in 0..provider.len() {
        match provider.get(id) {
            Ok((spectrogram, mask)) => {
                sink.put(id, &spectrogram, &mask)?;
                report.written += 1;
            }
            Err(source) if fail_fast => return Err(ExportError::Fetch { id, source }),
            Err(source) => {
                warn!("skipping patch {id}: {source}");
                report.failures.push((id, source));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::RenderError;

    struct FlakyProvider {
        total: usize,
        bad: Vec<usize>,
    }

    impl PatchProvider for FlakyProvider {
        fn len(&self) -> usize {
            self.total
        }

        fn get(&self, id: usize) -> Result<(SpectrogramTile, MaskTile), DatasetError> {
            if self.bad.contains(&id) {
                return Err(DatasetError::Render(RenderError::InsufficientSamples {
                    start_time_ms: 0.0,
                    end_time_ms: 0.0,
                }));
            }
            let tile = SpectrogramTile {
                width: 1,
                height: 1,
                values: vec![id as f32],
                actual_end_time_ms: 0.0,
            };
            Ok((tile, MaskTile::zeros(1, 1)))
        }
    }

    struct VecSink {
        ids: Vec<usize>,
        fail_at: Option<usize>,
    }

    impl PatchSink for VecSink {
        fn put(
            &mut self,
            id: usize,
            _spectrogram: &SpectrogramTile,
            _mask: &MaskTile,
        ) -> io::Result<()> {
            if self.fail_at == Some(id) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.ids.push(id);
            Ok(())
        }
    }

    #[test]
    fn test_export_collects_failures_and_continues() {
        let provider = FlakyProvider { total: 5, bad: vec![2] };
        let mut sink = VecSink { ids: Vec::new(), fail_at: None };
        let report = export_all(&provider, &mut sink, false).unwrap();
        assert_eq!(report.written, 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, 2);
        assert_eq!(sink.ids, vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_export_fail_fast_stops_at_first_failure() {
        let provider = FlakyProvider { total: 5, bad: vec![2] };
        let mut sink = VecSink { ids: Vec::new(), fail_at: None };
        match export_all(&provider, &mut sink, true) {
            Err(ExportError::Fetch { id, .. }) => assert_eq!(id, 2),
            other => panic!("expected fetch error, got {other:?}"),
        }
        assert_eq!(sink.ids, vec![0, 1]);
    }

    #[test]
    fn test_sink_error_is_always_fatal() {
        let provider = FlakyProvider { total: 5, bad: vec![] };
        let mut sink = VecSink { ids: Vec::new(), fail_at: Some(1) };
        assert!(matches!(
            export_all(&provider, &mut sink, false),
            Err(ExportError::Sink(_))
        ));
        assert_eq!(sink.ids, vec![0]);
    }
}
