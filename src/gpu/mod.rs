// gpu/mod.rs — GPU acceleration layer.
//
// This module provides a wgpu-based compute implementation of the
// convolution contract in the parent crate. The CPU implementation in
// `convolution` remains the authoritative reference — the GPU backend is
// validated against it per-pixel.
//
// The split mirrors the CPU side:
//
//   device.rs      — adapter selection, device/queue, workgroup sizing
//   convolution.rs — the accelerated Backend implementation
//
// A convolution pass is an embarrassingly-parallel map: every output pixel
// reads only the immutable source planes and writes only its own slot, so
// the shader needs no synchronization at all. The host call is synchronous:
// upload, dispatch, block on readback, commit.

pub mod convolution;
pub mod device;

pub use convolution::GpuBackend;
pub use device::{GpuDevice, GpuError};
