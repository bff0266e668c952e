use std::{fmt, path::Path, str::FromStr};

use ndarray::{s, Array2, ArrayView2, Ix2};
use ort::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch, GraphOptimizationLevel, Session,
    SessionBuilder, Tensor,
};

use crate::config::{RemainderPolicy, TranscribeConfig};
use crate::error::{Result, TranscribeError};
use crate::preprocessing::raw_audio::sample_count;
use crate::preprocessing::windowed_audio::{build_segment_batch, SegmentPlan};

/// Anything that maps a `(batch, window)` block of normalized audio to `(batch, m)` pitch activations.
pub trait PianoRollModel {
    fn predict(&self, batch: ArrayView2<f32>) -> Result<Array2<f32>>;
}

/// Compute device the model runs on.
///
/// Selecting a device that ONNX Runtime cannot register (no such GPU, or a
/// runtime built without CUDA) fails model loading instead of falling back to CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(i32),
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|id| id.parse::<i32>().ok())
                .filter(|id| *id >= 0)
                .map(Device::Cuda)
                .ok_or_else(|| format!("unknown device {other:?}, expected cpu, cuda or cuda:N")),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(id) => write!(f, "cuda:{id}"),
        }
    }
}

impl Device {
    fn execution_provider(self) -> ExecutionProviderDispatch {
        match self {
            Device::Cpu => CPUExecutionProvider::default().build(),
            Device::Cuda(id) => CUDAExecutionProvider::default().with_device_id(id).build(),
        }
        .error_on_failure()
    }

    /// Session builder bound to this device.
    pub fn session_builder(self, intra_threads: usize) -> Result<SessionBuilder> {
        Ok(Session::builder()?
            .with_execution_providers([self.execution_provider()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?)
    }
}

/// A piano-roll model exported to ONNX, run through ONNX Runtime.
pub struct OnnxModel {
    session: Session,
    output_name: String,
}

impl OnnxModel {
    pub fn load<P: AsRef<Path>>(model_path: P, device: Device, intra_threads: usize) -> Result<Self> {
        let session = device.session_builder(intra_threads)?.commit_from_file(model_path)?;

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| TranscribeError::InvalidParameter("model has no outputs".to_string()))?;
        log::info!("loaded model on {} (output {:?})", device, output_name);

        Ok(Self { session, output_name })
    }
}

impl PianoRollModel for OnnxModel {
    fn predict(&self, batch: ArrayView2<f32>) -> Result<Array2<f32>> {
        let input_shape: Vec<i64> = batch.shape().iter().map(|&dim| dim as i64).collect();
        let input_data: Vec<f32> = batch.iter().copied().collect();
        let input_tensor = Tensor::from_array((input_shape, input_data))?;
        let outputs = self.session.run(ort::inputs![input_tensor]?)?;

        let value = outputs.get(self.output_name.as_str()).ok_or_else(|| TranscribeError::ModelOutput {
            expected: vec![batch.nrows()],
            got: vec![],
        })?;
        let prediction = value.try_extract_tensor::<f32>()?.into_dimensionality::<Ix2>()?.to_owned();

        Ok(prediction)
    }
}

/// Slice a raw audio file into segments and run them through `model`.
///
/// # Arguments
///
/// * `path` - Path to the raw float32 file.
/// * `model` - Model mapping segments to pitch activations.
/// * `config` - Window, stride, offset, count, batch size and output width.
///
/// # Returns
///
/// * A `(count, m)` matrix with one row of activations per segment. When the
///   remainder policy is `Drop`, rows of the final partial batch are left at zero.
pub fn get_piano_roll<P: AsRef<Path>, M: PianoRollModel + ?Sized>(
    path: P,
    model: &M,
    config: &TranscribeConfig,
) -> Result<Array2<f32>> {
    let path = path.as_ref();
    if config.batch_size == 0 {
        return Err(TranscribeError::InvalidParameter("batch size must be positive".to_string()));
    }

    let total_samples = sample_count(path)?;
    let plan = SegmentPlan::new(total_samples, config.window, config.stride, config.offset, config.count)?;
    log::info!(
        "{} segments of {} samples, stride {}, from sample {}",
        plan.count,
        plan.window,
        plan.stride,
        plan.offset
    );

    let segments = build_segment_batch(path, &plan)?;
    run_batches(segments.view(), model, config.batch_size, config.m, config.remainder)
}

/// Run `segments` through `model` `batch_size` rows at a time.
pub fn run_batches<M: PianoRollModel + ?Sized>(
    segments: ArrayView2<f32>,
    model: &M,
    batch_size: usize,
    m: usize,
    remainder: RemainderPolicy,
) -> Result<Array2<f32>> {
    if batch_size == 0 {
        return Err(TranscribeError::InvalidParameter("batch size must be positive".to_string()));
    }

    let count = segments.nrows();
    let full_batches = count / batch_size;
    let leftover = count % batch_size;
    let n_batches = match remainder {
        RemainderPolicy::Process if leftover > 0 => full_batches + 1,
        _ => full_batches,
    };

    let mut prediction = Array2::zeros((count, m));
    for i in 0..n_batches {
        log::info!("{}/{} batches", i, n_batches);
        let start = batch_size * i;
        let end = (batch_size * (i + 1)).min(count);

        let batch_prediction = model.predict(segments.slice(s![start..end, ..]))?;
        if batch_prediction.dim() != (end - start, m) {
            return Err(TranscribeError::ModelOutput {
                expected: vec![end - start, m],
                got: batch_prediction.shape().to_vec(),
            });
        }
        prediction.slice_mut(s![start..end, ..]).assign(&batch_prediction);
    }

    if remainder == RemainderPolicy::Drop && leftover > 0 {
        log::warn!(
            "dropped segments {}..{}: not a full batch of {}, predictions left at zero",
            full_batches * batch_size,
            count,
            batch_size
        );
    }

    Ok(prediction)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;

    use ndarray::Axis;

    use super::*;
    use crate::config::Stride;
    use crate::preprocessing::raw_audio::tests::write_samples;

    /// Emits the row's first sample (shifted into `[0, 1]`) in every pitch column
    /// and records the size of each batch it sees.
    pub(crate) struct MockModel {
        pub m: usize,
        pub batch_sizes: RefCell<Vec<usize>>,
    }

    impl MockModel {
        pub(crate) fn new(m: usize) -> Self {
            Self { m, batch_sizes: RefCell::new(vec![]) }
        }
    }

    impl PianoRollModel for MockModel {
        fn predict(&self, batch: ArrayView2<f32>) -> Result<Array2<f32>> {
            self.batch_sizes.borrow_mut().push(batch.nrows());
            let mut output = Array2::zeros((batch.nrows(), self.m));
            for (mut out_row, in_row) in output.axis_iter_mut(Axis(0)).zip(batch.outer_iter()) {
                out_row.fill(in_row[0] * 0.5 + 0.5);
            }
            Ok(output)
        }
    }

    struct WrongShapeModel;

    impl PianoRollModel for WrongShapeModel {
        fn predict(&self, batch: ArrayView2<f32>) -> Result<Array2<f32>> {
            Ok(Array2::zeros((batch.nrows(), 3)))
        }
    }

    fn ones(count: usize, window: usize) -> Array2<f32> {
        Array2::ones((count, window))
    }

    #[test]
    fn device_parsing() {
        assert_eq!("cpu".parse::<Device>(), Ok(Device::Cpu));
        assert_eq!("CUDA".parse::<Device>(), Ok(Device::Cuda(0)));
        assert_eq!("cuda:2".parse::<Device>(), Ok(Device::Cuda(2)));
        assert!("cuda:x".parse::<Device>().is_err());
        assert!("tpu".parse::<Device>().is_err());
        assert_eq!(Device::Cuda(1).to_string(), "cuda:1");
    }

    #[test]
    fn unavailable_device_fails_instead_of_falling_back() {
        assert!(Device::Cpu.session_builder(1).is_ok());
        assert!(matches!(Device::Cuda(99).session_builder(1), Err(TranscribeError::Model(_))));
    }

    #[test]
    fn drop_policy_leaves_partial_batch_unpopulated() {
        let model = MockModel::new(128);
        let prediction = run_batches(ones(1200, 4).view(), &model, 500, 128, RemainderPolicy::Drop).unwrap();

        assert_eq!(prediction.dim(), (1200, 128));
        assert_eq!(*model.batch_sizes.borrow(), vec![500, 500]);
        assert!(prediction.slice(s![..1000, ..]).iter().all(|v| *v == 1.0));
        assert!(prediction.slice(s![1000.., ..]).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn process_policy_runs_the_remainder() {
        let model = MockModel::new(128);
        let prediction = run_batches(ones(1200, 4).view(), &model, 500, 128, RemainderPolicy::Process).unwrap();

        assert_eq!(*model.batch_sizes.borrow(), vec![500, 500, 200]);
        assert!(prediction.iter().all(|v| *v == 1.0));
    }

    #[test]
    fn exact_multiple_has_no_remainder() {
        let model = MockModel::new(8);
        run_batches(ones(30, 2).view(), &model, 10, 8, RemainderPolicy::Process).unwrap();
        assert_eq!(*model.batch_sizes.borrow(), vec![10, 10, 10]);
    }

    #[test]
    fn fewer_rows_than_a_batch_with_drop_yields_zeros() {
        let model = MockModel::new(8);
        let prediction = run_batches(ones(7, 2).view(), &model, 10, 8, RemainderPolicy::Drop).unwrap();
        assert!(model.batch_sizes.borrow().is_empty());
        assert!(prediction.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn wrong_output_shape_is_an_error() {
        let result = run_batches(ones(4, 2).view(), &WrongShapeModel, 2, 128, RemainderPolicy::Process);
        assert!(matches!(result, Err(TranscribeError::ModelOutput { .. })));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let result = run_batches(ones(4, 2).view(), &MockModel::new(8), 0, 8, RemainderPolicy::Process);
        assert!(matches!(result, Err(TranscribeError::InvalidParameter(_))));
    }

    #[test]
    fn piano_roll_from_file() {
        // Constant positive audio normalizes to 1/sqrt(window) in every sample.
        let file = write_samples(&vec![0.25; 2000]);
        let config = TranscribeConfig {
            window: 16,
            stride: Stride::Fixed(100),
            offset: 50,
            count: 0,
            batch_size: 4,
            m: 128,
            remainder: RemainderPolicy::Process,
        };

        let model = MockModel::new(128);
        let prediction = get_piano_roll(file.path(), &model, &config).unwrap();

        // (2000 - 50 - 64) / 100 + 1
        assert_eq!(prediction.dim(), (19, 128));
        assert_eq!(*model.batch_sizes.borrow(), vec![4, 4, 4, 4, 3]);
        let expected = 0.25 * 0.5 + 0.5;
        assert!(prediction.iter().all(|v| (v - expected).abs() < 1e-5));
    }

    #[test]
    fn piano_roll_rejects_short_file() {
        let file = write_samples(&vec![0.1; 100]);
        let config = TranscribeConfig { window: 64, offset: 10, ..TranscribeConfig::default() };
        let result = get_piano_roll(file.path(), &MockModel::new(128), &config);
        assert!(matches!(result, Err(TranscribeError::InsufficientAudio { .. })));
    }
}
