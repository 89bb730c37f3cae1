/// Paired image/gradient dataset loaded from a volume container
use ndarray::{Array4, Array5, ArrayView4, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::volume_file::read_volume_array;
use crate::DgdError;

/// Default array names in the input container
pub const IMAGE_NAME: &str = "imag";
pub const GRAD_NAME: &str = "grad";

/// How the leading axes of a stored array should be interpreted.
///
/// `Auto` applies the square-cross-section rule of [`classify_layout`].
/// The other two variants bypass it for data where the rule guesses wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutHint {
    #[default]
    Auto,
    SingleVolume,
    Batch,
}

/// Interpretation of a stored array's shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeLayout {
    /// One volume `(y, x, z)`
    SingleVolume { rows: usize, cols: usize, deps: usize },
    /// `count` volumes `(index, y, x, z)`
    Batch {
        count: usize,
        rows: usize,
        cols: usize,
        deps: usize,
    },
}

impl VolumeLayout {
    /// Number of volumes described by this layout
    pub fn num_volumes(&self) -> usize {
        match *self {
            VolumeLayout::SingleVolume { .. } => 1,
            VolumeLayout::Batch { count, .. } => count,
        }
    }

    /// Spatial dimensions `[y, x, z]`
    pub fn spatial(&self) -> [usize; 3] {
        match *self {
            VolumeLayout::SingleVolume { rows, cols, deps }
            | VolumeLayout::Batch { rows, cols, deps, .. } => [rows, cols, deps],
        }
    }

    /// Canonical 5D shape `(index, y, x, z, 1)`
    pub fn canonical_shape(&self) -> (usize, usize, usize, usize, usize) {
        let [rows, cols, deps] = self.spatial();
        (self.num_volumes(), rows, cols, deps, 1)
    }

    fn element_count(&self) -> usize {
        let [rows, cols, deps] = self.spatial();
        self.num_volumes() * rows * cols * deps
    }
}

/// Classify a raw shape with the default rule.
///
/// If the first two axes are equal the array is one volume whose spatial
/// axes are 0, 1, 2; otherwise it is a batch indexed by axis 0 with spatial
/// axes 1, 2, 3.
///
/// The rule is ambiguous: a batch whose count happens to equal its row count
/// reads as a single volume, and a single volume with a non-square cross
/// section reads as a batch. Both misreadings are caught by the element-count
/// check and surface as a [`DgdError::Format`]; pass an explicit
/// [`LayoutHint`] to [`classify_layout_with`] to resolve them. A 4D array
/// with equal leading axes is accepted as one volume with a warning, since
/// a batch of N volumes of N rows cannot be told apart from it.
pub fn classify_layout(shape: &[usize]) -> crate::Result<VolumeLayout> {
    classify_layout_with(shape, LayoutHint::Auto)
}

/// Classify a raw shape, optionally forcing the interpretation
pub fn classify_layout_with(shape: &[usize], hint: LayoutHint) -> crate::Result<VolumeLayout> {
    if shape.len() < 3 {
        return Err(DgdError::Format(format!(
            "expected at least 3 dimensions, got shape {:?}",
            shape
        )));
    }

    let single = match hint {
        LayoutHint::Auto => shape[0] == shape[1],
        LayoutHint::SingleVolume => true,
        LayoutHint::Batch => false,
    };

    let layout = if single {
        VolumeLayout::SingleVolume {
            rows: shape[0],
            cols: shape[1],
            deps: shape[2],
        }
    } else {
        if shape.len() < 4 {
            return Err(DgdError::Format(format!(
                "shape {:?} read as a batch needs 4 dimensions; \
                 use LayoutHint::SingleVolume for a non-square single volume",
                shape
            )));
        }
        VolumeLayout::Batch {
            count: shape[0],
            rows: shape[1],
            cols: shape[2],
            deps: shape[3],
        }
    };

    let total: usize = shape.iter().product();
    if total != layout.element_count() {
        let alternative = if single { "Batch" } else { "SingleVolume" };
        return Err(DgdError::Format(format!(
            "shape {:?} does not fit {:?}; use LayoutHint::{} if the layout was misread",
            shape, layout, alternative
        )));
    }

    if hint == LayoutHint::Auto && single && shape.len() >= 4 {
        log::warn!(
            "shape {:?} has equal leading axes and was read as one volume; \
             use LayoutHint::Batch if axis 0 indexes volumes",
            shape
        );
    }

    Ok(layout)
}

/// Extract a named array as `(index, y, x, z, 1)` using the default layout rule
pub fn extract_images<P: AsRef<Path>>(path: P, array_name: &str) -> crate::Result<Array5<f32>> {
    extract_images_with(path, array_name, LayoutHint::Auto)
}

/// Extract a named array as `(index, y, x, z, 1)`
pub fn extract_images_with<P: AsRef<Path>>(
    path: P,
    array_name: &str,
    hint: LayoutHint,
) -> crate::Result<Array5<f32>> {
    let raw = read_volume_array(path.as_ref(), array_name)?;
    let layout = classify_layout_with(raw.shape(), hint)?;

    let [rows, cols, deps] = layout.spatial();
    log::info!(
        "Extracted '{}': raw shape {:?} -> {} volume(s) of {}x{}x{}",
        array_name,
        raw.shape(),
        layout.num_volumes(),
        rows,
        cols,
        deps
    );

    // Logical iteration order is row-major regardless of the stored layout
    let data: Vec<f32> = raw.iter().copied().collect();
    Array5::from_shape_vec(layout.canonical_shape(), data)
        .map_err(|e| DgdError::Format(format!("reshaping '{}': {}", array_name, e)))
}

/// Current estimate and physics gradient, batch aligned
#[derive(Debug, Clone)]
pub struct PairedDataset {
    images: Array4<f32>, // [N, y, x, z]
    grad: Array4<f32>,   // [N, y, x, z]
}

impl PairedDataset {
    /// Build from two canonical 5D arrays
    pub fn new(images: Array5<f32>, grad: Array5<f32>) -> crate::Result<Self> {
        if images.shape()[0] != grad.shape()[0] {
            return Err(DgdError::Validation(format!(
                "batch mismatch: images.shape {:?} grad.shape {:?}",
                images.shape(),
                grad.shape()
            )));
        }

        for (label, array) in [("images", &images), ("grad", &grad)] {
            if array.shape()[4] != 1 {
                return Err(DgdError::Validation(format!(
                    "{} must have a single channel, got shape {:?}",
                    label,
                    array.shape()
                )));
            }
        }

        if images.shape()[1..4] != grad.shape()[1..4] {
            return Err(DgdError::Validation(format!(
                "spatial mismatch: images.shape {:?} grad.shape {:?}",
                images.shape(),
                grad.shape()
            )));
        }

        Ok(Self {
            images: images.index_axis_move(Axis(4), 0),
            grad: grad.index_axis_move(Axis(4), 0),
        })
    }

    /// Number of paired examples
    pub fn num_examples(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    pub fn len(&self) -> usize {
        self.num_examples()
    }

    pub fn is_empty(&self) -> bool {
        self.num_examples() == 0
    }

    /// Spatial dimensions `[y, x, z]` shared by every volume
    pub fn spatial_shape(&self) -> [usize; 3] {
        let s = self.images.shape();
        [s[1], s[2], s[3]]
    }

    /// Current estimates `[N, y, x, z]`
    pub fn images(&self) -> ArrayView4<'_, f32> {
        self.images.view()
    }

    /// Physics gradients `[N, y, x, z]`
    pub fn grad(&self) -> ArrayView4<'_, f32> {
        self.grad.view()
    }
}

/// Load the default `imag`/`grad` pair from one file
pub fn read_data_sets<P: AsRef<Path>>(path: P) -> crate::Result<PairedDataset> {
    read_data_sets_with(path, IMAGE_NAME, GRAD_NAME, LayoutHint::Auto)
}

/// Load a named image/gradient pair from one file
pub fn read_data_sets_with<P: AsRef<Path>>(
    path: P,
    image_name: &str,
    grad_name: &str,
    hint: LayoutHint,
) -> crate::Result<PairedDataset> {
    let path = path.as_ref();
    log::info!("Start loading data from {:?}", path);

    let images = extract_images_with(path, image_name, hint)?;
    let grad = extract_images_with(path, grad_name, hint)?;

    let dataset = PairedDataset::new(images, grad)?;
    log::info!(
        "Dataset loaded: {} example(s), volume {:?}",
        dataset.num_examples(),
        dataset.spatial_shape()
    );

    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::write_volume_array;
    use ndarray::{Array3, Array4, ArrayD, IxDyn};
    use std::cell::RefCell;
    use std::sync::Once;
    use tempfile::tempdir;

    fn write_pair(path: &Path, imag: &ArrayD<f32>, grad: &ArrayD<f32>) {
        let file = hdf5::File::create(path).unwrap();
        for (name, array) in [(IMAGE_NAME, imag), (GRAD_NAME, grad)] {
            let data: Vec<f32> = array.iter().copied().collect();
            file.new_dataset::<f32>()
                .shape(array.shape().to_vec())
                .create(name)
                .unwrap()
                .write_raw(data.as_slice())
                .unwrap();
        }
    }

    thread_local! {
        static WARNINGS: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    /// Records warnings per test thread
    struct WarningLog;

    impl log::Log for WarningLog {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Warn
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                WARNINGS.with(|w| w.borrow_mut().push(record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static WARNING_LOG: WarningLog = WarningLog;

    fn warnings_during(f: impl FnOnce()) -> Vec<String> {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let _ = log::set_logger(&WARNING_LOG);
            log::set_max_level(log::LevelFilter::Warn);
        });

        WARNINGS.with(|w| w.borrow_mut().clear());
        f();
        WARNINGS.with(|w| w.borrow().clone())
    }

    #[test]
    fn test_classify_square_is_single_volume() {
        let layout = classify_layout(&[6, 6, 6]).unwrap();
        assert_eq!(layout, VolumeLayout::SingleVolume { rows: 6, cols: 6, deps: 6 });
        assert_eq!(layout.canonical_shape(), (1, 6, 6, 6, 1));
    }

    #[test]
    fn test_classify_distinct_leading_axes_is_batch() {
        let layout = classify_layout(&[3, 8, 8, 4]).unwrap();
        assert_eq!(layout.num_volumes(), 3);
        assert_eq!(layout.spatial(), [8, 8, 4]);
    }

    #[test]
    fn test_classify_rejects_low_rank() {
        assert!(matches!(classify_layout(&[4, 4]), Err(DgdError::Format(_))));
    }

    #[test]
    fn test_ambiguous_batch_needs_hint() {
        // Four volumes of 4x4x2: leading axes coincide
        let shape = [4, 4, 4, 2];
        assert!(matches!(classify_layout(&shape), Err(DgdError::Format(_))));

        let layout = classify_layout_with(&shape, LayoutHint::Batch).unwrap();
        assert_eq!(layout.canonical_shape(), (4, 4, 4, 2, 1));
    }

    #[test]
    fn test_non_square_single_volume_needs_hint() {
        let shape = [4, 6, 2];
        assert!(matches!(classify_layout(&shape), Err(DgdError::Format(_))));

        let layout = classify_layout_with(&shape, LayoutHint::SingleVolume).unwrap();
        assert_eq!(layout.canonical_shape(), (1, 4, 6, 2, 1));
    }

    #[test]
    fn test_trailing_unit_axis_is_single_volume() {
        let layout = classify_layout(&[8, 8, 4, 1]).unwrap();
        assert_eq!(layout.canonical_shape(), (1, 8, 8, 4, 1));
    }

    #[test]
    fn test_auto_warns_when_4d_array_becomes_one_volume() {
        let warnings = warnings_during(|| {
            let layout = classify_layout(&[8, 8, 4, 1]).unwrap();
            assert_eq!(layout.num_volumes(), 1);
        });

        assert_eq!(warnings.len(), 1, "warnings: {:?}", warnings);
        assert!(warnings[0].contains("[8, 8, 4, 1]"));
        assert!(warnings[0].contains("LayoutHint::Batch"));
    }

    #[test]
    fn test_unambiguous_layouts_do_not_warn() {
        let warnings = warnings_during(|| {
            classify_layout(&[6, 6, 6]).unwrap();
            classify_layout(&[3, 8, 8, 4]).unwrap();
            classify_layout_with(&[8, 8, 4, 1], LayoutHint::SingleVolume).unwrap();
        });

        assert!(warnings.is_empty(), "warnings: {:?}", warnings);
    }

    #[test]
    fn test_extract_single_volume() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("single.h5");
        let volume = Array3::from_shape_fn((5, 5, 5), |(y, x, z)| (y * 100 + x * 10 + z) as f32);
        write_volume_array(&path, IMAGE_NAME, &volume).unwrap();

        let images = extract_images(&path, IMAGE_NAME).unwrap();
        assert_eq!(images.shape(), &[1, 5, 5, 5, 1]);
        assert_eq!(images[[0, 4, 3, 2, 0]], 432.0);
    }

    #[test]
    fn test_extract_batch_preserves_dims() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batch.h5");
        let batch = Array4::from_shape_fn((3, 6, 5, 4), |(b, y, x, z)| (b * 1000 + y * 100 + x * 10 + z) as f32);
        write_volume_array(&path, GRAD_NAME, &batch).unwrap();

        let grad = extract_images(&path, GRAD_NAME).unwrap();
        assert_eq!(grad.shape(), &[3, 6, 5, 4, 1]);
        assert_eq!(grad[[2, 5, 4, 3, 0]], 2543.0);
    }

    #[test]
    fn test_read_data_sets_pairs_arrays() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.h5");
        let imag = ArrayD::from_elem(IxDyn(&[2, 4, 4, 3]), 1.0f32);
        let grad = ArrayD::from_elem(IxDyn(&[2, 4, 4, 3]), -1.0f32);
        write_pair(&path, &imag, &grad);

        let dataset = read_data_sets(&path).unwrap();
        assert_eq!(dataset.num_examples(), 2);
        assert_eq!(dataset.spatial_shape(), [4, 4, 3]);
        assert_eq!(dataset.images().shape(), &[2, 4, 4, 3]);
        assert!(dataset.grad().iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_read_data_sets_rejects_batch_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mismatch.h5");
        let imag = ArrayD::<f32>::zeros(IxDyn(&[2, 4, 4, 3]));
        let grad = ArrayD::<f32>::zeros(IxDyn(&[3, 4, 4, 3]));
        write_pair(&path, &imag, &grad);

        let err = read_data_sets(&path).unwrap_err();
        assert!(matches!(err, DgdError::Validation(_)), "got {:?}", err);
    }

    #[test]
    fn test_paired_dataset_rejects_multi_channel() {
        let images = Array5::<f32>::zeros((1, 2, 2, 2, 2));
        let grad = Array5::<f32>::zeros((1, 2, 2, 2, 2));
        assert!(matches!(
            PairedDataset::new(images, grad),
            Err(DgdError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_gradient_is_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image_only.h5");
        write_volume_array(&path, IMAGE_NAME, &Array3::<f32>::zeros((4, 4, 2))).unwrap();

        assert!(matches!(read_data_sets(&path), Err(DgdError::Format(_))));
    }
}
