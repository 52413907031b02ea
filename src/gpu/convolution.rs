// gpu/convolution.rs — Accelerated convolution backend.
//
// Mirrors `convolution::CpuBackend` on the GPU: one compute invocation per
// output pixel, identical math including the center-fallback border rule.
//
// DATA FLOW (all within one blocking `apply` call):
//   1. Channel planes are widened u8 → f32 on the CPU and uploaded as
//      read-only storage buffers, alongside the kernel weights and a
//      small uniform with the dimensions.
//   2. One dispatch covers the whole image (2D workgroups, ceiling
//      division; the shader discards overshoot invocations).
//   3. The three f32 output buffers are copied to MAP_READ staging
//      buffers, mapped, and quantized through the same truncate-and-clamp
//      helper the CPU backend uses, then committed to the image planes.
//
// WHY STORAGE BUFFERS AND NOT TEXTURES?
// A texture would buy hardware border addressing we explicitly must not
// use (the contract's border rule re-samples the center pixel, which no
// sampler mode expresses), and the kernel weight matrix can be far larger
// than uniform space allows (a 49×49 filter is 2401 floats). Flat storage
// buffers keep the indexing identical to the CPU loop.
//
// The shader's workgroup dimensions are baked into the WGSL source by
// string substitution at pipeline creation ({{WG_X}}/{{WG_Y}} tokens) —
// naga does not accept `override` expressions inside @workgroup_size().

use wgpu::util::DeviceExt;

use crate::convolution::{truncate_clamp, Backend, ConvolveError};
use crate::gpu::device::{GpuDevice, GpuError};
use crate::image::RgbImage;
use crate::kernel::Kernel;

/// Uniform parameter block. Layout must match `Params` in convolve.wgsl:
/// three u32 fields plus explicit padding to 16 bytes.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    width: u32,
    height: u32,
    kernel_width: u32,
    _pad: u32,
}

/// Compiled convolution pipeline. Shader compilation is the expensive
/// part; create once per device and reuse across passes.
pub struct GpuConvolvePipeline {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
}

impl GpuConvolvePipeline {
    pub fn new(gpu: &GpuDevice) -> Self {
        let shader_template = include_str!("../shaders/convolve.wgsl");
        let shader_src = shader_template
            .replace("{{WG_X}}", &gpu.workgroup_size.x.to_string())
            .replace("{{WG_Y}}", &gpu.workgroup_size.y.to_string());

        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("convolve.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        // One layout entry per @group(0) binding in convolve.wgsl:
        // uniform params, read-only weights + three source planes, and
        // three writable output planes.
        let storage_read = wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        };
        let storage_write = wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        };
        let entry = |binding: u32, ty: wgpu::BindingType| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        };

        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("convolve BGL"),
            entries: &[
                entry(
                    0,
                    wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                ),
                entry(1, storage_read),
                entry(2, storage_read),
                entry(3, storage_read),
                entry(4, storage_read),
                entry(5, storage_write),
                entry(6, storage_write),
                entry(7, storage_write),
            ],
        });

        let pipeline_layout =
            gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("convolve pipeline layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });

        let pipeline =
            gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("convolve"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: "convolve",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });

        GpuConvolvePipeline { pipeline, bgl }
    }

    /// Run one full convolution pass and commit the result into `image`.
    fn run(
        &self,
        gpu: &GpuDevice,
        kernel: &Kernel,
        image: &mut RgbImage,
    ) -> Result<(), GpuError> {
        let width = image.width() as u32;
        let height = image.height() as u32;
        let size = image.size();
        let plane_bytes = (size * std::mem::size_of::<f32>()) as u64;

        // --- Upload ---
        let params = Params {
            width,
            height,
            kernel_width: kernel.width() as u32,
            _pad: 0,
        };
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("convolve params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let weights_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("convolve weights"),
            contents: bytemuck::cast_slice(kernel.weights()),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let upload_plane = |label: &str, plane: &[u8]| {
            let widened: Vec<f32> = plane.iter().map(|&v| v as f32).collect();
            gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&widened),
                usage: wgpu::BufferUsages::STORAGE,
            })
        };
        let [red, green, blue] = image.planes();
        let src_r = upload_plane("convolve src red", red);
        let src_g = upload_plane("convolve src green", green);
        let src_b = upload_plane("convolve src blue", blue);

        let make_dst = |label: &str| {
            gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: plane_bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let dst_r = make_dst("convolve dst red");
        let dst_g = make_dst("convolve dst green");
        let dst_b = make_dst("convolve dst blue");

        let make_staging = |label: &str| {
            gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: plane_bytes,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let staging_r = make_staging("convolve staging red");
        let staging_g = make_staging("convolve staging green");
        let staging_b = make_staging("convolve staging blue");

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("convolve bind group"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: weights_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: src_r.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: src_g.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: src_b.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: dst_r.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 6, resource: dst_g.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 7, resource: dst_b.as_entire_binding() },
            ],
        });

        // --- Dispatch + copy out, one submission ---
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("convolve pass"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("convolve"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let (dx, dy) = gpu.dispatch_size(width, height);
            pass.dispatch_workgroups(dx, dy, 1);
        }
        encoder.copy_buffer_to_buffer(&dst_r, 0, &staging_r, 0, plane_bytes);
        encoder.copy_buffer_to_buffer(&dst_g, 0, &staging_g, 0, plane_bytes);
        encoder.copy_buffer_to_buffer(&dst_b, 0, &staging_b, 0, plane_bytes);
        gpu.queue.submit(std::iter::once(encoder.finish()));

        // --- Blocking readback ---
        // Request all three maps, then drive the device until the
        // callbacks fire. The caller observes a fully synchronous pass.
        let request_map = |buf: &wgpu::Buffer| {
            let (tx, rx) = std::sync::mpsc::channel();
            buf.slice(..).map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
            rx
        };
        let rx_r = request_map(&staging_r);
        let rx_g = request_map(&staging_g);
        let rx_b = request_map(&staging_b);
        gpu.device.poll(wgpu::Maintain::Wait);

        let confirm = |rx: std::sync::mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>| {
            rx.recv()
                .map_err(|_| GpuError::Readback("map callback never fired".into()))?
                .map_err(|e| GpuError::Readback(e.to_string()))
        };
        confirm(rx_r)?;
        confirm(rx_g)?;
        confirm(rx_b)?;

        // Quantize through the exact same helper as the CPU backend and
        // commit all three planes at once.
        let commit = |staging: &wgpu::Buffer, plane: &mut [u8]| {
            let mapped = staging.slice(..).get_mapped_range();
            let values: &[f32] = bytemuck::cast_slice(&mapped[..]);
            for (dst, &acc) in plane.iter_mut().zip(values) {
                *dst = truncate_clamp(acc);
            }
        };
        let (r, g, b) = image.planes_mut();
        commit(&staging_r, r);
        commit(&staging_g, g);
        commit(&staging_b, b);
        staging_r.unmap();
        staging_g.unmap();
        staging_b.unmap();

        Ok(())
    }
}

/// The accelerated convolution backend: a device plus a compiled pipeline.
///
/// Construction fails when no GPU is available — the caller (not this
/// module) decides whether that is fatal or a cue to fall back to
/// [`crate::convolution::CpuBackend`].
pub struct GpuBackend {
    gpu: GpuDevice,
    pipeline: GpuConvolvePipeline,
}

impl GpuBackend {
    /// Acquire a device and compile the convolution pipeline.
    pub fn new() -> Result<Self, GpuError> {
        let gpu = GpuDevice::new()?;
        eprintln!("[bmpblur] using {gpu}");
        let pipeline = GpuConvolvePipeline::new(&gpu);
        Ok(GpuBackend { gpu, pipeline })
    }

    /// Build a backend on an already-initialized device.
    pub fn with_device(gpu: GpuDevice) -> Self {
        let pipeline = GpuConvolvePipeline::new(&gpu);
        GpuBackend { gpu, pipeline }
    }

    pub fn adapter_name(&self) -> &str {
        &self.gpu.adapter_info.name
    }
}

impl Backend for GpuBackend {
    fn apply(&self, kernel: &Kernel, image: &mut RgbImage) -> Result<(), ConvolveError> {
        if kernel.width() % 2 != 1 {
            // Same silent no-op as the CPU backend — the two must stay
            // behaviorally identical.
            return Ok(());
        }
        self.pipeline.run(&self.gpu, kernel, image)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "gpu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convolution::CpuBackend;

    // ---- Pure tests (no GPU) -----------------------------------------------

    #[test]
    fn test_params_layout() {
        // Must match the 16-byte uniform struct in convolve.wgsl.
        assert_eq!(std::mem::size_of::<Params>(), 16);
    }

    #[test]
    fn test_shader_template_tokens_present() {
        let src = include_str!("../shaders/convolve.wgsl");
        assert!(src.contains("{{WG_X}}"));
        assert!(src.contains("{{WG_Y}}"));
        assert!(src.contains("fn convolve"));
    }

    // ---- GPU integration tests ---------------------------------------------
    // Run with `cargo test -- --include-ignored` on a machine with a GPU.

    /// Deterministic pseudo-random image without extra deps (LCG).
    fn noise_image(width: usize, height: usize, mut seed: u32) -> RgbImage {
        let mut plane = |salt: u32| -> Vec<u8> {
            seed ^= salt;
            (0..width * height)
                .map(|_| {
                    seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
                    (seed >> 24) as u8
                })
                .collect()
        };
        let r = plane(0x1111);
        let g = plane(0x2222);
        let b = plane(0x3333);
        RgbImage::from_planes(width, height, r, g, b)
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_gpu_matches_cpu_within_one() {
        let backend = GpuBackend::new().expect("need a GPU");

        // Noise image, blob-shaped 9×9 kernel sampled from a second image.
        let filter_src = noise_image(9, 9, 777);
        let mut kernel = Kernel::from_image(&filter_src).unwrap();
        kernel.normalize().unwrap();

        let src = noise_image(120, 80, 42);
        let mut gpu_img = src.clone();
        let mut cpu_img = src.clone();
        backend.apply(&kernel, &mut gpu_img).unwrap();
        CpuBackend.apply(&kernel, &mut cpu_img).unwrap();

        for (c, (gp, cp)) in gpu_img.planes().iter().zip(cpu_img.planes()).enumerate() {
            for (i, (&g, &c_v)) in gp.iter().zip(cp.iter()).enumerate() {
                let diff = (g as i16 - c_v as i16).abs();
                assert!(
                    diff <= 1,
                    "channel {c} pixel {i}: gpu={g} cpu={c_v} (diff {diff})"
                );
            }
        }
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_gpu_constant_image_fixed_point() {
        let backend = GpuBackend::new().expect("need a GPU");
        // 3×3 with value 90: every 90 * (1/9) product is exact in f32, so
        // equality holds bit-for-bit regardless of accumulation order.
        let mut kernel = Kernel::from_image(&RgbImage::filled(3, 3, 90)).unwrap();
        kernel.normalize().unwrap();

        let mut img = RgbImage::filled(33, 17, 90);
        backend.apply(&kernel, &mut img).unwrap();
        for plane in img.planes() {
            assert!(plane.iter().all(|&v| v == 90));
        }
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_gpu_even_kernel_noop() {
        let backend = GpuBackend::new().expect("need a GPU");
        let kernel = Kernel::from_weights(4, vec![0.25; 16]);
        let src = noise_image(16, 16, 5);
        let mut img = src.clone();
        backend.apply(&kernel, &mut img).unwrap();
        for (sp, ip) in src.planes().iter().zip(img.planes()) {
            assert_eq!(*sp, ip);
        }
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_gpu_single_pixel_center_fallback() {
        // 1×1 image: every off-center tap falls back to the lone pixel.
        let backend = GpuBackend::new().expect("need a GPU");
        let kernel = Kernel::from_weights(3, vec![1.0 / 9.0; 9]);
        let mut img = RgbImage::from_planes(1, 1, vec![90], vec![9], vec![189]);
        backend.apply(&kernel, &mut img).unwrap();
        assert_eq!(img.get(0, 0), (90, 9, 189));
    }
}
