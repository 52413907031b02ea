// kernel.rs — Square convolution kernel.
//
// Two construction paths:
//
//   Kernel::from_image — the interesting one. The weight at flat index i is
//     the mean of the three channel bytes at index i of a (square) source
//     image. A photograph of a bright blob becomes, after normalization, a
//     blob-shaped blur filter.
//
//   Kernel::gaussian   — a conventional procedural Gaussian, built as the
//     separable product of a normalized 1D profile.
//
// Either way the caller normalizes before convolving; normalize() is
// idempotent, so doing it on an already-normalized kernel is harmless.
//
// Kernel width is independent of the target image's dimensions — a 49×49
// kernel convolves a 1920×1080 frame just fine.

use std::fmt;

use crate::image::RgbImage;

/// A square matrix of f32 convolution weights, row-major.
///
/// `weights[fy * width + fx]` is the tap at kernel position (fx, fy).
/// Width is usually odd (a symmetric neighborhood); even widths can be
/// constructed via [`Kernel::from_weights`] and cause the convolution to
/// no-op — see the contract in the `convolution` module.
pub struct Kernel {
    width: usize,
    weights: Vec<f32>,
}

impl Kernel {
    /// Build a kernel by sampling a square source image.
    ///
    /// Weight `i` = (red[i] + green[i] + blue[i]) / 3, as f32. The kernel
    /// width equals the source image width. The result is NOT normalized —
    /// call [`Kernel::normalize`] before convolving.
    ///
    /// # Errors
    /// [`KernelError::NonSquareSource`] if `width != height`. Indexing a
    /// non-square plane as if it were square would silently read weights
    /// from the wrong rows, so this is checked up front.
    pub fn from_image(source: &RgbImage) -> Result<Self, KernelError> {
        if source.width() != source.height() {
            return Err(KernelError::NonSquareSource {
                width: source.width(),
                height: source.height(),
            });
        }
        let [red, green, blue] = source.planes();
        let weights = (0..source.size())
            .map(|i| (red[i] as f32 + green[i] as f32 + blue[i] as f32) / 3.0)
            .collect();
        Ok(Kernel { width: source.width(), weights })
    }

    /// Build a normalized 2D Gaussian kernel procedurally.
    ///
    /// The kernel is the outer product of a 1D profile
    /// `g[i] = exp(-d² / 2σ²)` where `d` is the distance from the center
    /// tap. The 1D profile is normalized to sum 1 before the product, so
    /// the 2D weights already sum to 1 — a subsequent [`Kernel::normalize`]
    /// is a no-op.
    ///
    /// # Errors
    /// [`KernelError::EvenWidth`] if `width` is even (no center tap);
    /// [`KernelError::NonPositiveSigma`] if `sigma <= 0`.
    pub fn gaussian(width: usize, sigma: f32) -> Result<Self, KernelError> {
        if width % 2 != 1 {
            return Err(KernelError::EvenWidth { width });
        }
        if sigma <= 0.0 {
            return Err(KernelError::NonPositiveSigma { sigma });
        }

        let half = (width - 1) / 2;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut profile = Vec::with_capacity(width);
        for i in 0..width {
            let d = i as f32 - half as f32;
            profile.push((-d * d / two_sigma_sq).exp());
        }
        let sum: f32 = profile.iter().sum();
        for v in &mut profile {
            *v /= sum;
        }

        let mut weights = Vec::with_capacity(width * width);
        for fy in 0..width {
            for fx in 0..width {
                weights.push(profile[fy] * profile[fx]);
            }
        }
        Ok(Kernel { width, weights })
    }

    /// Construct a kernel directly from a weight buffer.
    ///
    /// No normalization, no odd-width requirement — this is how tests build
    /// identity kernels, asymmetric probes, and the even-width kernels that
    /// exercise the convolution no-op path.
    ///
    /// # Panics
    /// Panics if `weights.len() != width * width`.
    pub fn from_weights(width: usize, weights: Vec<f32>) -> Self {
        assert_eq!(
            weights.len(),
            width * width,
            "weight buffer length ({}) must equal width² ({})",
            weights.len(),
            width * width,
        );
        Kernel { width, weights }
    }

    /// Divide every weight by the sum of all weights, so they sum to 1.
    ///
    /// Idempotent: normalizing an already-normalized kernel divides by a
    /// sum of ~1.0 and changes nothing beyond rounding.
    ///
    /// # Errors
    /// [`KernelError::ZeroSum`] if the weights sum to zero — dividing
    /// through would propagate NaN/Inf into every downstream pixel.
    pub fn normalize(&mut self) -> Result<(), KernelError> {
        let sum: f32 = self.weights.iter().sum();
        if sum == 0.0 {
            return Err(KernelError::ZeroSum);
        }
        for w in &mut self.weights {
            *w /= sum;
        }
        Ok(())
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// The flat row-major weight buffer, length `width * width`.
    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// The tap at kernel position (fx, fy).
    #[inline]
    pub fn weight(&self, fx: usize, fy: usize) -> f32 {
        self.weights[fy * self.width + fx]
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sum: f32 = self.weights.iter().sum();
        write!(f, "Kernel {{ {0}×{0}, sum={sum:.6} }}", self.width)
    }
}

/// Errors from kernel construction and normalization.
#[derive(Debug, PartialEq)]
pub enum KernelError {
    /// Kernel source image is not square; sampling it as a square weight
    /// matrix would misindex.
    NonSquareSource { width: usize, height: usize },
    /// Weights sum to zero — normalization would divide by zero.
    ZeroSum,
    /// Procedural kernel requested with an even width (no center tap).
    EvenWidth { width: usize },
    /// Procedural kernel requested with sigma <= 0.
    NonPositiveSigma { sigma: f32 },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::NonSquareSource { width, height } => write!(
                f,
                "kernel source image must be square, got {width}×{height}"
            ),
            KernelError::ZeroSum => {
                write!(f, "degenerate kernel: weights sum to zero, cannot normalize")
            }
            KernelError::EvenWidth { width } => {
                write!(f, "gaussian kernel width must be odd, got {width}")
            }
            KernelError::NonPositiveSigma { sigma } => {
                write!(f, "gaussian sigma must be positive, got {sigma}")
            }
        }
    }
}

impl std::error::Error for KernelError {}
