// convolution.rs — The shared convolution contract and the CPU reference
// backend.
//
// Every output pixel is a weighted sum over a square neighborhood, each
// channel handled independently:
//
//   offset = -((kernel_width - 1) / 2)       // kernel_width is odd
//   acc = Σ  src[sy * width + sx] * weights[fy * kernel_width + fx]
//   out[y * width + x] = clamp(trunc(acc), 0, 255)
//
// BORDER HANDLING: center fallback, NOT edge clamping.
// When a tap (sx, sy) lands outside the image, it re-samples the CENTER
// pixel (x, y) of the output location. Edge pixels are therefore biased
// toward their own value instead of toward a replicated edge. This is the
// contract both backends implement; do not swap in clamp-to-edge.
//
// EVEN KERNEL WIDTHS: the whole pass is a silent no-op. An even kernel has
// no center tap, so the fallback rule cannot even be stated for it. Callers
// that consider an even kernel a bug should check before calling.
//
// Output is staged in scratch planes and committed only after the full
// image has been processed — every pixel must read the unmodified source
// neighborhood, so reads and writes never alias within one pass.

use std::fmt;

use crate::gpu::device::GpuError;
use crate::image::RgbImage;
use crate::kernel::Kernel;

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// An interchangeable convolution execution strategy.
///
/// Both implementations ([`CpuBackend`] and [`crate::gpu::GpuBackend`])
/// satisfy the same contract, so the integration tests run one property
/// suite against either via `&dyn Backend`. From the caller's point of
/// view `apply` is synchronous: when it returns `Ok`, the image planes
/// hold the fully convolved result.
pub trait Backend {
    /// Convolve `kernel` against `image`, mutating its planes in place.
    fn apply(&self, kernel: &Kernel, image: &mut RgbImage) -> Result<(), ConvolveError>;

    /// Human-readable backend name for logs and timing output.
    fn name(&self) -> &'static str;
}

/// Errors from a convolution pass.
///
/// The CPU backend is infallible; every variant here comes from the
/// accelerated path. Kept as one type so `Backend::apply` has a single
/// signature across implementations.
#[derive(Debug)]
pub enum ConvolveError {
    /// The GPU backend failed to execute (device lost, readback failed).
    Gpu(GpuError),
}

impl fmt::Display for ConvolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvolveError::Gpu(e) => write!(f, "accelerated backend failed: {e}"),
        }
    }
}

impl std::error::Error for ConvolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvolveError::Gpu(e) => Some(e),
        }
    }
}

impl From<GpuError> for ConvolveError {
    fn from(e: GpuError) -> Self {
        ConvolveError::Gpu(e)
    }
}

// ---------------------------------------------------------------------------
// Shared numeric semantics
// ---------------------------------------------------------------------------

/// Quantize one accumulated channel value: truncate toward zero, then clamp
/// into the valid byte range.
///
/// Truncation (not rounding!) matches the reference semantics; both
/// backends funnel their f32 accumulators through this exact function so
/// they quantize identically.
#[inline]
pub(crate) fn truncate_clamp(acc: f32) -> u8 {
    // `as i32` truncates toward zero and saturates on overflow/NaN.
    (acc as i32).clamp(0, 255) as u8
}

/// Convolve a single channel plane, returning the new plane.
///
/// `src.len()` must equal `width * height` and the kernel width must be
/// odd — [`CpuBackend::apply`] checks the latter before calling.
pub(crate) fn convolve_plane(
    src: &[u8],
    width: usize,
    height: usize,
    kernel: &Kernel,
) -> Vec<u8> {
    debug_assert_eq!(src.len(), width * height);
    debug_assert!(kernel.width() % 2 == 1);

    let kw = kernel.width() as isize;
    let weights = kernel.weights();
    let w = width as isize;
    let h = height as isize;
    let offset = -((kw - 1) / 2);

    let mut out = vec![0u8; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for fy in 0..kw {
                for fx in 0..kw {
                    let mut sx = x + fx + offset;
                    let mut sy = y + fy + offset;
                    if sx < 0 || sx >= w || sy < 0 || sy >= h {
                        // Out-of-range tap: re-sample the center pixel.
                        sx = x;
                        sy = y;
                    }
                    acc += src[(sy * w + sx) as usize] as f32
                        * weights[(fy * kw + fx) as usize];
                }
            }
            out[(y * w + x) as usize] = truncate_clamp(acc);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// CpuBackend
// ---------------------------------------------------------------------------

/// Single-threaded reference implementation of the convolution contract.
///
/// Deterministic and allocation-light (one scratch plane per channel).
/// This is the oracle the GPU backend is validated against.
pub struct CpuBackend;

impl Backend for CpuBackend {
    fn apply(&self, kernel: &Kernel, image: &mut RgbImage) -> Result<(), ConvolveError> {
        if kernel.width() % 2 != 1 {
            // Even kernel: explicit no-op, image untouched.
            return Ok(());
        }

        let (width, height) = (image.width(), image.height());
        let [red, green, blue] = image.planes();
        let new_red = convolve_plane(red, width, height, kernel);
        let new_green = convolve_plane(green, width, height, kernel);
        let new_blue = convolve_plane(blue, width, height, kernel);

        // Commit all three planes only after the full pass.
        let (r, g, b) = image.planes_mut();
        r.copy_from_slice(&new_red);
        g.copy_from_slice(&new_green);
        b.copy_from_slice(&new_blue);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}
