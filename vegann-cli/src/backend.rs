//! Backend selection based on cargo features.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        use burn::backend::cuda::{Cuda, CudaDevice};

        /// Selected backend type.
        pub type SelectedBackend = Cuda;
        /// Selected device type.
        pub type SelectedDevice = CudaDevice;

        /// Creates the default device for the selected backend.
        pub fn create_device() -> SelectedDevice {
            CudaDevice::default()
        }

        /// Backend name for logging.
        pub const fn backend_name() -> &'static str {
            "CUDA (NVIDIA GPU)"
        }
    } else if #[cfg(feature = "wgpu")] {
        use burn::backend::wgpu::{Wgpu, WgpuDevice};

        /// Selected backend type.
        pub type SelectedBackend = Wgpu;
        /// Selected device type.
        pub type SelectedDevice = WgpuDevice;

        /// Creates the default device for the selected backend.
        pub fn create_device() -> SelectedDevice {
            WgpuDevice::default()
        }

        /// Backend name for logging.
        pub const fn backend_name() -> &'static str {
            "WGPU (GPU)"
        }
    } else {
        use burn::backend::ndarray::{NdArray, NdArrayDevice};

        /// Selected backend type.
        pub type SelectedBackend = NdArray;
        /// Selected device type.
        pub type SelectedDevice = NdArrayDevice;

        /// Creates the default device for the selected backend.
        pub fn create_device() -> SelectedDevice {
            NdArrayDevice::default()
        }

        /// Backend name for logging.
        pub const fn backend_name() -> &'static str {
            "NdArray (CPU)"
        }
    }
}
