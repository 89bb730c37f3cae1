/// Data loading for DGD inference
///
/// Input volumes live as datasets of an HDF5 file. Each array is
/// either one 3D volume or a batch of them; the layout is classified from
/// its shape and normalised to `(index, y, x, z, channel=1)`.
pub mod volume_dataset;
pub mod volume_file;

pub use volume_dataset::{
    classify_layout, classify_layout_with, extract_images, extract_images_with, read_data_sets,
    read_data_sets_with, LayoutHint, PairedDataset, VolumeLayout,
};
pub use volume_file::{array_names, read_volume_array, write_volume_array};
