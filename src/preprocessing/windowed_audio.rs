use std::path::Path;

use ndarray::{Array2, Axis};

use crate::config::Stride;
use crate::constants::SIZE_OF_FLOAT;
use crate::error::{Result, TranscribeError};
use crate::preprocessing::raw_audio::get_audio_segment;

/// Where the segments of a file start and how many there are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    pub offset: usize,
    pub stride: usize,
    pub count: usize,
    pub window: usize,
}

impl SegmentPlan {
    /// Work out stride and count for a file of `total_samples` samples.
    ///
    /// The span covered by the segment starts is
    /// `total_samples - offset - 4 * window`. With `Stride::Auto` the span is
    /// divided into `count - 1` equal steps; with `Stride::Fixed` the count is
    /// the number of steps that fit in the span, plus one.
    pub fn new(total_samples: usize, window: usize, stride: Stride, offset: usize, count: usize) -> Result<Self> {
        if window == 0 {
            return Err(TranscribeError::InvalidParameter("window must be at least 1 sample".to_string()));
        }

        let span = (total_samples as i64) - (offset as i64) - (SIZE_OF_FLOAT * window) as i64;
        if span < 0 {
            return Err(TranscribeError::InsufficientAudio {
                total: total_samples,
                offset,
                window,
            });
        }
        let span = span as usize;

        let (stride, count) = match stride {
            Stride::Auto => {
                if count < 2 {
                    return Err(TranscribeError::InvalidParameter(format!(
                        "automatic stride needs a count of at least 2, got {count}"
                    )));
                }
                let stride = span / (count - 1);
                log::info!("Number of stride = {}", stride);
                if stride == 0 {
                    log::warn!("automatic stride is 0, every segment starts at sample {}", offset);
                }
                (stride, count)
            }
            Stride::Fixed(stride) => {
                if stride == 0 {
                    return Err(TranscribeError::InvalidParameter("stride must be positive".to_string()));
                }
                (stride, span / stride + 1)
            }
        };

        Ok(Self { offset, stride, count, window })
    }

    pub fn start(&self, index: usize) -> usize {
        self.offset + index * self.stride
    }

    pub fn starts(&self) -> SegmentStarts<'_> {
        SegmentStarts { plan: self, index: 0 }
    }
}

pub struct SegmentStarts<'a> {
    plan: &'a SegmentPlan,
    index: usize,
}

impl<'a> Iterator for SegmentStarts<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.plan.count {
            return None;
        }

        let start = self.plan.start(self.index);
        self.index += 1;
        Some(start)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.count - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for SegmentStarts<'a> {}

/// Read every segment of `plan` into a `(count, window)` matrix, one normalized segment per row.
pub fn build_segment_batch<P: AsRef<Path>>(path: P, plan: &SegmentPlan) -> Result<Array2<f32>> {
    let path = path.as_ref();
    let mut batch = Array2::zeros((plan.count, plan.window));

    for (mut row, start) in batch.axis_iter_mut(Axis(0)).zip(plan.starts()) {
        let segment = get_audio_segment(path, start, plan.window)?;
        row.assign(&segment);
    }

    Ok(batch)
}
