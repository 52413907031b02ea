// image.rs — Planar RGB image buffer.
//
// Unlike the usual interleaved RGBRGB... layout, pixels are stored as three
// independent byte planes. Every stage of the pipeline (kernel sampling,
// CPU convolution, GPU upload) operates on one channel at a time, so the
// planar layout avoids a deinterleave step everywhere downstream.
//
// Flat index i maps to pixel (x, y) via i = y * width + x.
//
// INVARIANT: all three planes have length width * height at all times.
// Constructors assert it; nothing hands out a way to resize a single plane.

use std::fmt;

/// A planar 8-bit RGB image with runtime dimensions.
///
/// The planes are owned `Vec<u8>` buffers sized at construction and freed
/// on drop. Backends mutate them in place via [`RgbImage::planes_mut`].
pub struct RgbImage {
    width: usize,
    height: usize,
    red: Vec<u8>,
    green: Vec<u8>,
    blue: Vec<u8>,
}

// Deep copy of three heap buffers — implemented manually to make the cost
// visible at the call site rather than hidden behind a derive.
impl Clone for RgbImage {
    fn clone(&self) -> Self {
        RgbImage {
            width: self.width,
            height: self.height,
            red: self.red.clone(),
            green: self.green.clone(),
            blue: self.blue.clone(),
        }
    }
}

impl RgbImage {
    /// Create a black (all-zero) image with the given dimensions.
    ///
    /// # Panics
    /// Panics if either dimension is zero.
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "image dimensions must be positive (got {width}×{height})");
        let size = width * height;
        RgbImage {
            width,
            height,
            red: vec![0u8; size],
            green: vec![0u8; size],
            blue: vec![0u8; size],
        }
    }

    /// Create an image from three existing channel planes.
    ///
    /// # Panics
    /// Panics if either dimension is zero or any plane's length differs
    /// from `width * height`.
    pub fn from_planes(
        width: usize,
        height: usize,
        red: Vec<u8>,
        green: Vec<u8>,
        blue: Vec<u8>,
    ) -> Self {
        assert!(width > 0 && height > 0, "image dimensions must be positive (got {width}×{height})");
        let size = width * height;
        assert_eq!(red.len(), size, "red plane length ({}) must equal width * height ({size})", red.len());
        assert_eq!(green.len(), size, "green plane length ({}) must equal width * height ({size})", green.len());
        assert_eq!(blue.len(), size, "blue plane length ({}) must equal width * height ({size})", blue.len());
        RgbImage { width, height, red, green, blue }
    }

    /// Create an image where every pixel of every channel holds `value`.
    /// Handy for the constant-field tests.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        let size = width * height;
        Self::from_planes(
            width,
            height,
            vec![value; size],
            vec![value; size],
            vec![value; size],
        )
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of pixels per plane (`width * height`).
    #[inline]
    pub fn size(&self) -> usize {
        self.width * self.height
    }

    /// Borrow the three planes in R, G, B order.
    #[inline]
    pub fn planes(&self) -> [&[u8]; 3] {
        [&self.red, &self.green, &self.blue]
    }

    /// Mutably borrow the three planes in R, G, B order.
    ///
    /// Returned as a tuple (not an array) so the borrow checker sees three
    /// disjoint borrows — a backend can commit all channels in one pass.
    #[inline]
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        (&mut self.red, &mut self.green, &mut self.blue)
    }

    /// Get the (r, g, b) triple at pixel (x, y).
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> (u8, u8, u8) {
        self.bounds_check(x, y);
        let i = y * self.width + x;
        (self.red[i], self.green[i], self.blue[i])
    }

    /// Set the (r, g, b) triple at pixel (x, y).
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, rgb: (u8, u8, u8)) {
        self.bounds_check(x, y);
        let i = y * self.width + x;
        self.red[i] = rgb.0;
        self.green[i] = rgb.1;
        self.blue[i] = rgb.2;
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

// Compact debug formatting — prints dimensions and the top-left corner,
// enough to eyeball small test images without drowning the output.
impl fmt::Debug for RgbImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RgbImage {{ {}×{} }}", self.width, self.height)?;
        for y in 0..self.height.min(4) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(8) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                let (r, g, b) = self.get(x, y);
                write!(f, "({r},{g},{b})")?;
            }
            if self.width > 8 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 4 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}
