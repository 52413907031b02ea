// gpu/device.rs — wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate adapters and select the first real GPU.
//   - Hold the device/queue pair for the lifetime of the backend.
//   - Provide `WorkgroupSize` and the ceiling-division dispatch math used
//     when launching the convolution pipeline.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` power-preference heuristics can grab a
// software rasterizer (llvmpipe) on headless machines, which would make the
// "accelerated" backend slower than the CPU reference while still reporting
// success. We enumerate explicitly and prefer hardware device types; a
// software adapter is taken only as a last resort, with its name printed so
// the choice is visible.
//
// `pollster::block_on` runs wgpu's async init to completion on the current
// thread — the API is async for WebGPU's sake, but for native backends we
// just block.

use std::fmt;

/// A workgroup size configuration for 2D compute dispatches.
///
/// The product must not exceed the device's
/// `max_compute_invocations_per_workgroup` limit; the 16×16 default is 256,
/// the floor that limit guarantees on every compliant adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl Default for WorkgroupSize {
    fn default() -> Self {
        WorkgroupSize { x: 16, y: 16 }
    }
}

impl WorkgroupSize {
    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Cached adapter information for logging and diagnostics.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// The core GPU context: device, queue, and workgroup configuration.
///
/// Expensive to create (instance + device initialization); create one and
/// hold it for the lifetime of the backend.
///
/// # Field drop order
/// Rust drops struct fields in declaration order. `_instance` is declared
/// last so the `wgpu::Instance` outlives `device` and `queue` — some
/// drivers crash if the instance is destroyed first.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    /// Keeps the `wgpu::Instance` alive until `device` and `queue` drop.
    /// Never accessed; exists only to pin the drop order.
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a `GpuDevice` on the best available adapter.
    ///
    /// # Errors
    /// [`GpuError::NoSuitableAdapter`] if no adapter exists at all, or
    /// [`GpuError::DeviceRequest`] if the device request fails.
    pub fn new() -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async())
    }

    async fn init_async() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let all_adapters: Vec<wgpu::Adapter> = instance
            .enumerate_adapters(wgpu::Backends::PRIMARY)
            .into_iter()
            .collect();

        if all_adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }

        for a in &all_adapters {
            let info = a.get_info();
            eprintln!(
                "[bmpblur] adapter: {} ({:?}, {:?})",
                info.name, info.backend, info.device_type
            );
        }

        // Prefer real hardware; fall back to whatever exists (software
        // rasterizer included) so headless CI can still exercise the path.
        let adapter = all_adapters
            .into_iter()
            .reduce(|best, candidate| {
                if adapter_rank(&candidate) > adapter_rank(&best) {
                    candidate
                } else {
                    best
                }
            })
            .ok_or(GpuError::NoSuitableAdapter)?;

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("bmpblur"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceRequest)?;

        Ok(GpuDevice {
            device,
            queue,
            adapter_info,
            workgroup_size: WorkgroupSize::default(),
            _instance: instance,
        })
    }

    /// Override the default workgroup size.
    ///
    /// # Errors
    /// [`GpuError::WorkgroupTooLarge`] if `x * y` exceeds the guaranteed
    /// 256-invocation limit.
    pub fn set_workgroup_size(&mut self, x: u32, y: u32) -> Result<(), GpuError> {
        let total = x * y;
        let max = wgpu::Limits::default().max_compute_invocations_per_workgroup;
        if total > max {
            return Err(GpuError::WorkgroupTooLarge { total, max });
        }
        self.workgroup_size = WorkgroupSize { x, y };
        Ok(())
    }

    /// Number of workgroups in each dimension needed to cover an image.
    ///
    /// Ceiling division, so every pixel is covered even when the image
    /// dimensions are not multiples of the workgroup size. The shader
    /// guards against the resulting out-of-bounds invocation ids:
    /// ```wgsl
    /// if gid.x >= width || gid.y >= height { return; }
    /// ```
    pub fn dispatch_size(&self, img_w: u32, img_h: u32) -> (u32, u32) {
        let dx = (img_w + self.workgroup_size.x - 1) / self.workgroup_size.x;
        let dy = (img_h + self.workgroup_size.y - 1) / self.workgroup_size.y;
        (dx, dy)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, workgroup: {} }}",
            self.adapter_info, self.workgroup_size
        )
    }
}

/// Selection rank: higher is better.
fn adapter_rank(adapter: &wgpu::Adapter) -> u8 {
    match adapter.get_info().device_type {
        wgpu::DeviceType::DiscreteGpu => 4,
        wgpu::DeviceType::IntegratedGpu => 3,
        wgpu::DeviceType::VirtualGpu => 2,
        wgpu::DeviceType::Other => 1,
        wgpu::DeviceType::Cpu => 0,
    }
}

// ============================================================
// Error type
// ============================================================

/// Errors from GPU device initialization and execution.
#[derive(Debug)]
pub enum GpuError {
    /// No adapter found — the accelerated backend is unavailable on this
    /// machine. The caller decides whether to fail or fall back to the
    /// CPU backend.
    NoSuitableAdapter,
    /// wgpu device request failed (driver issue, unsupported limits).
    DeviceRequest(wgpu::RequestDeviceError),
    /// Requested workgroup size exceeds the invocation limit.
    WorkgroupTooLarge { total: u32, max: u32 },
    /// Result readback failed (buffer map error or lost device).
    Readback(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoSuitableAdapter => {
                write!(f, "no usable GPU adapter found; accelerated backend unavailable")
            }
            GpuError::DeviceRequest(e) => write!(f, "device request failed: {e}"),
            GpuError::WorkgroupTooLarge { total, max } => write!(
                f,
                "workgroup size {total} exceeds the {max}-invocation limit"
            ),
            GpuError::Readback(msg) => write!(f, "result readback failed: {msg}"),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceRequest(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests that need an actual GPU are behind `#[ignore]` so the suite
    // passes on machines without one. Run with `-- --include-ignored`.

    #[test]
    fn test_default_workgroup_size() {
        let ws = WorkgroupSize::default();
        assert_eq!(ws.total(), 256);
        let max = wgpu::Limits::default().max_compute_invocations_per_workgroup;
        assert!(ws.total() <= max);
    }

    #[test]
    fn test_dispatch_size_math() {
        // dispatch_size is a pure function of the workgroup config; use a
        // stub so the test runs without a device.
        struct Stub {
            workgroup_size: WorkgroupSize,
        }
        impl Stub {
            fn dispatch_size(&self, w: u32, h: u32) -> (u32, u32) {
                let dx = (w + self.workgroup_size.x - 1) / self.workgroup_size.x;
                let dy = (h + self.workgroup_size.y - 1) / self.workgroup_size.y;
                (dx, dy)
            }
        }
        let stub = Stub { workgroup_size: WorkgroupSize::default() };

        // Exact multiples.
        assert_eq!(stub.dispatch_size(640, 480), (40, 30));
        // Non-multiples round up; the shader discards the overshoot.
        assert_eq!(stub.dispatch_size(100, 100), (7, 7));
        assert_eq!(stub.dispatch_size(1, 1), (1, 1));
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_device_init() {
        let gpu = GpuDevice::new().expect("should initialize a device");
        println!("{gpu}");
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_set_workgroup_size_validation() {
        let mut gpu = GpuDevice::new().unwrap();
        gpu.set_workgroup_size(8, 8).expect("64 invocations is always valid");
        assert_eq!(gpu.workgroup_size, WorkgroupSize { x: 8, y: 8 });
        let err = gpu.set_workgroup_size(64, 64).unwrap_err();
        assert!(matches!(err, GpuError::WorkgroupTooLarge { .. }));
    }
}
