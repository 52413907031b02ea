// bmpblur: image-derived Gaussian blur.
//
// The filter kernel is not synthesized from a formula — it is sampled from
// the pixels of a second (square) image, normalized, and convolved against
// the target. Two backends implement the same convolution contract:
//
//   convolution::CpuBackend — single-threaded reference implementation
//   gpu::GpuBackend         — wgpu compute shader, one invocation per pixel
//
// The CPU implementation is the authoritative oracle: the GPU backend is
// validated against it per-pixel within a ±1 tolerance after truncation,
// since floating-point accumulation order differs between the two.

pub mod bmp;
pub mod convolution;
pub mod gpu;
pub mod image;
pub mod kernel;

pub use convolution::{Backend, CpuBackend};
pub use image::RgbImage;
pub use kernel::Kernel;
