//! Backend selection for the Burn framework.
//!
//! CUDA is used when the crate is built with the `cuda` feature, NdArray (CPU)
//! otherwise. The device is chosen once from [`DeviceConfig`] at start-up and
//! passed by value from there on.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;
use tracing::{info, warn};

use crate::config::DeviceConfig;
use crate::types::DeviceType;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn::backend::NdArray;

/// The autodiff backend used for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Device type of the default backend
pub type DefaultDevice = <DefaultBackend as Backend>::Device;

/// Resolve the configured device, falling back to the CPU when the requested
/// accelerator is not compiled in.
pub fn select_device(config: &DeviceConfig) -> DefaultDevice {
    match config.device_type {
        DeviceType::Cuda => cuda_device(config.cuda_device_id.unwrap_or(0)),
        DeviceType::Cpu => {
            if cfg!(feature = "cuda") {
                warn!("CPU requested but this build only links the CUDA backend, using GPU 0");
            }
            info!("Using device: {}", backend_name());
            DefaultDevice::default()
        }
    }
}

#[cfg(feature = "cuda")]
fn cuda_device(id: usize) -> DefaultDevice {
    info!("Using device: {} (GPU {})", backend_name(), id);
    burn_cuda::CudaDevice::new(id)
}

#[cfg(not(feature = "cuda"))]
fn cuda_device(id: usize) -> DefaultDevice {
    warn!(
        "CUDA device {} requested but the cuda feature is not enabled, falling back to {}",
        id,
        backend_name()
    );
    DefaultDevice::default()
}

/// Human-readable name of the compiled backend
pub fn backend_name() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA (GPU)"
    } else {
        "NdArray (CPU)"
    }
}
