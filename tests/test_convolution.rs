// tests/test_convolution.rs — Backend contract tests against the public API.
//
// The property suite is written once against `&dyn Backend` and run for
// each implementation: always for the CPU reference, and behind
// `#[ignore]` for the GPU (run with `cargo test -- --include-ignored` on
// a machine with an adapter). Both must satisfy the identical contract.

use bmpblur::convolution::{Backend, CpuBackend};
use bmpblur::gpu::GpuBackend;
use bmpblur::{Kernel, RgbImage};

// ===== Shared property suite =====

/// A normalized kernel leaves a uniform image untouched. Pixel value 90
/// and 1/9-style weights keep every f32 product exact, so the check is
/// for equality, not tolerance.
fn check_uniform_fixed_point(backend: &dyn Backend) {
    let mut kernel = Kernel::from_image(&RgbImage::filled(3, 3, 90)).unwrap();
    kernel.normalize().unwrap();

    let mut img = RgbImage::filled(12, 7, 90);
    backend.apply(&kernel, &mut img).unwrap();
    for plane in img.planes() {
        assert!(
            plane.iter().all(|&v| v == 90),
            "{}: uniform image changed", backend.name()
        );
    }
}

/// Even-width kernel: the pass is a no-op, bit for bit.
fn check_even_kernel_noop(backend: &dyn Backend) {
    let kernel = Kernel::from_weights(4, vec![1.0; 16]);
    let r: Vec<u8> = (0..30).collect();
    let g: Vec<u8> = (100..130).collect();
    let b: Vec<u8> = (200..230).collect();
    let mut img = RgbImage::from_planes(6, 5, r.clone(), g.clone(), b.clone());
    backend.apply(&kernel, &mut img).unwrap();
    let [pr, pg, pb] = img.planes();
    assert_eq!(pr, &r[..], "{}: red plane changed", backend.name());
    assert_eq!(pg, &g[..], "{}: green plane changed", backend.name());
    assert_eq!(pb, &b[..], "{}: blue plane changed", backend.name());
}

/// 3×3 uniform kernel on a 1×1 image: every off-center tap falls back to
/// the single pixel, so the output is exactly the input.
fn check_single_pixel_identity(backend: &dyn Backend) {
    let kernel = Kernel::from_weights(3, vec![1.0 / 9.0; 9]);
    let mut img = RgbImage::from_planes(1, 1, vec![90], vec![9], vec![189]);
    backend.apply(&kernel, &mut img).unwrap();
    assert_eq!(img.get(0, 0), (90, 9, 189), "{}", backend.name());
}

/// Center-fallback (not edge-clamp) is observable with an off-center
/// single-tap kernel on a gradient.
fn check_center_fallback(backend: &dyn Backend) {
    // Single tap at kernel position (0, 0) samples (x-1, y-1).
    let mut weights = vec![0.0f32; 9];
    weights[0] = 1.0;
    let kernel = Kernel::from_weights(3, weights);

    let plane = vec![10u8, 20, 30, 40];
    let mut img = RgbImage::from_planes(2, 2, plane.clone(), plane.clone(), plane);
    backend.apply(&kernel, &mut img).unwrap();

    // (0,0), (1,0), (0,1) all have the tap out of range → center value.
    // (1,1) samples (0,0) = 10.
    assert_eq!(img.get(0, 0).0, 10, "{}", backend.name());
    assert_eq!(img.get(1, 0).0, 20, "{}", backend.name());
    assert_eq!(img.get(0, 1).0, 30, "{}", backend.name());
    assert_eq!(img.get(1, 1).0, 10, "{}", backend.name());
}

fn run_suite(backend: &dyn Backend) {
    check_uniform_fixed_point(backend);
    check_even_kernel_noop(backend);
    check_single_pixel_identity(backend);
    check_center_fallback(backend);
}

// ===== CPU backend =====

#[test]
fn cpu_uniform_fixed_point() {
    check_uniform_fixed_point(&CpuBackend);
}

#[test]
fn cpu_even_kernel_noop() {
    check_even_kernel_noop(&CpuBackend);
}

#[test]
fn cpu_single_pixel_identity() {
    check_single_pixel_identity(&CpuBackend);
}

#[test]
fn cpu_center_fallback() {
    check_center_fallback(&CpuBackend);
}

// ===== GPU backend (same suite, needs an adapter) =====

#[test]
#[ignore = "requires a GPU adapter"]
fn gpu_full_suite() {
    let backend = GpuBackend::new().expect("need a GPU");
    run_suite(&backend);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn gpu_agrees_with_cpu() {
    // The defining requirement of the accelerated path: per-pixel,
    // per-channel agreement with the reference within ±1 after
    // truncation (accumulation order may differ).
    let backend = GpuBackend::new().expect("need a GPU");

    let mut filter = RgbImage::new(7, 7);
    for y in 0..7 {
        for x in 0..7 {
            // A lopsided blob so the kernel is asymmetric.
            let v = (10 + x * 13 + y * 29) as u8;
            filter.set(x, y, (v, v / 2, v));
        }
    }
    let mut kernel = Kernel::from_image(&filter).unwrap();
    kernel.normalize().unwrap();

    let mut img = RgbImage::new(64, 48);
    for y in 0..48 {
        for x in 0..64 {
            img.set(x, y, ((x * 4) as u8, (y * 5) as u8, ((x + y) * 2) as u8));
        }
    }

    let mut cpu_img = img.clone();
    let mut gpu_img = img;
    CpuBackend.apply(&kernel, &mut cpu_img).unwrap();
    backend.apply(&kernel, &mut gpu_img).unwrap();

    for (cp, gp) in cpu_img.planes().iter().zip(gpu_img.planes()) {
        for (i, (&c, &g)) in cp.iter().zip(gp.iter()).enumerate() {
            assert!(
                (c as i16 - g as i16).abs() <= 1,
                "pixel {i}: cpu={c} gpu={g}"
            );
        }
    }
}

// ===== Kernel/engine interaction through the public API =====

#[test]
fn kernel_from_uniform_source_is_box_filter() {
    let mut kernel = Kernel::from_image(&RgbImage::filled(3, 3, 90)).unwrap();
    kernel.normalize().unwrap();
    for &w in kernel.weights() {
        assert!((w - 1.0 / 9.0).abs() < 1e-6);
    }
}

#[test]
fn kernel_width_independent_of_image_width() {
    // A 5×5 kernel convolves a 3×8 image without complaint.
    let mut kernel = Kernel::gaussian(5, 1.2).unwrap();
    kernel.normalize().unwrap();
    let mut img = RgbImage::filled(3, 8, 144); // 144 = 16 * 9
    CpuBackend.apply(&kernel, &mut img).unwrap();
    assert_eq!(img.width(), 3);
    assert_eq!(img.height(), 8);
}

#[test]
fn gaussian_blur_spreads_energy() {
    // A bright spike blurred by a Gaussian must lose peak height and
    // light up its neighbors.
    let mut kernel = Kernel::gaussian(5, 1.0).unwrap();
    kernel.normalize().unwrap();

    let mut img = RgbImage::new(11, 11);
    img.set(5, 5, (255, 255, 255));
    CpuBackend.apply(&kernel, &mut img).unwrap();

    let (peak, _, _) = img.get(5, 5);
    let (neighbor, _, _) = img.get(6, 5);
    assert!(peak < 255, "peak should shrink, got {peak}");
    assert!(peak > 0, "peak should not vanish");
    assert!(neighbor > 0, "neighbor should receive energy");
    assert!(peak > neighbor, "peak should stay the maximum");
}
