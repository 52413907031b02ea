// blur — apply an image-derived blur kernel to a BMP file.
//
// Usage:
//   blur <filter.bmp> <input.bmp> <output.bmp> [--cpu | --gpu] [--fallback]
//
// The filter image must be square; its pixel intensities become the
// convolution weights. Backend defaults to --gpu. Without --fallback a
// missing GPU is a hard error; with it, the run degrades to the CPU
// reference implementation and says so.
//
// Prints per-stage wall-clock timing (input / processing / output) so the
// two backends can be compared on real files.

use std::env;
use std::process::ExitCode;
use std::time::Instant;

use bmpblur::convolution::{Backend, CpuBackend};
use bmpblur::gpu::GpuBackend;
use bmpblur::{bmp, Kernel};

enum BackendChoice {
    Cpu,
    Gpu,
}

struct Args {
    filter_path: String,
    input_path: String,
    output_path: String,
    backend: BackendChoice,
    fallback: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut paths = Vec::new();
    let mut backend = BackendChoice::Gpu;
    let mut fallback = false;

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--cpu" => backend = BackendChoice::Cpu,
            "--gpu" => backend = BackendChoice::Gpu,
            "--fallback" => fallback = true,
            flag if flag.starts_with("--") => {
                return Err(format!("unknown flag: {flag}"));
            }
            path => paths.push(path.to_string()),
        }
    }

    if paths.len() != 3 {
        return Err(format!("expected 3 paths, got {}", paths.len()));
    }
    let mut it = paths.into_iter();
    Ok(Args {
        filter_path: it.next().unwrap(),
        input_path: it.next().unwrap(),
        output_path: it.next().unwrap(),
        backend,
        fallback,
    })
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let t0 = Instant::now();

    // Build and normalize the kernel from the filter image.
    let filter = bmp::load(&args.filter_path)?;
    eprintln!(
        "[bmpblur] filter: {} ({}×{})",
        args.filter_path,
        filter.image.width(),
        filter.image.height()
    );
    let mut kernel = Kernel::from_image(&filter.image)?;
    kernel.normalize()?;

    let mut target = bmp::load(&args.input_path)?;
    eprintln!(
        "[bmpblur] input: {} ({}×{})",
        args.input_path,
        target.image.width(),
        target.image.height()
    );
    let t1 = Instant::now();

    // Select the backend. GPU acquisition can fail; --fallback turns that
    // into a CPU run instead of an error.
    let backend: Box<dyn Backend> = match args.backend {
        BackendChoice::Cpu => Box::new(CpuBackend),
        BackendChoice::Gpu => match GpuBackend::new() {
            Ok(gpu) => {
                eprintln!("[bmpblur] accelerated backend on {}", gpu.adapter_name());
                Box::new(gpu)
            }
            Err(e) if args.fallback => {
                eprintln!("[bmpblur] GPU unavailable ({e}); falling back to CPU");
                Box::new(CpuBackend)
            }
            Err(e) => return Err(Box::new(e)),
        },
    };

    backend.apply(&kernel, &mut target.image)?;
    let t2 = Instant::now();

    bmp::save(&args.output_path, &target)?;
    let t3 = Instant::now();

    println!("backend                 : {}", backend.name());
    println!("Initial data input time : {:.6} seconds", (t1 - t0).as_secs_f64());
    println!("Image processing time   : {:.6} seconds", (t2 - t1).as_secs_f64());
    println!("Data saving/output time : {:.6} seconds", (t3 - t2).as_secs_f64());
    Ok(())
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!("usage: blur <filter.bmp> <input.bmp> <output.bmp> [--cpu | --gpu] [--fallback]");
            return ExitCode::from(2);
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
