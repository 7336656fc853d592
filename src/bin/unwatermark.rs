use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use unwatermark::{
    default_output_path, MaskBucket, MaskSet, ProcessOptions, ProcessReport, Strategy,
    WatermarkRemover,
};

/// Mask assets shipped alongside the binary: (footprint, margin, file name).
const MASK_FILES: &[(u32, u32, &str)] = &[(96, 64, "mask_96.png"), (48, 32, "mask_48.png")];

#[derive(Parser)]
#[command(
    name = "unwatermark",
    about = "Detect and remove fixed-position semi-transparent watermarks via reverse alpha blending",
    version,
    after_help = "Simple usage: unwatermark <image>  (auto-detect and write <image>_restored)\n\n\
                  The watermark is only removed where its opacity is below 1.0;\n\
                  fully saturated pixels cannot be recovered and pass through unchanged."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Output file or directory (default: {name}_restored.{ext})
    #[arg(short, long)]
    output: Option<String>,

    /// Directory containing the mask bitmaps (mask_48.png, mask_96.png)
    #[arg(long, default_value = "assets")]
    masks: String,

    /// Skip detection, unblend unconditionally
    #[arg(short, long)]
    force: bool,

    /// Brightness difference threshold for detection (8-bit luminance units)
    #[arg(short, long, default_value = "10.0")]
    threshold: f32,

    /// Report the detection verdict without writing any file
    #[arg(long)]
    detect_only: bool,

    /// Force the small (48x48) footprint
    #[arg(long)]
    force_small: bool,

    /// Force the large (96x96) footprint
    #[arg(long)]
    force_large: bool,

    /// Run on the calling thread instead of offloading to a worker thread
    #[arg(long)]
    direct: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "warn" }),
    )
    .init();

    if cli.force_small && cli.force_large {
        eprintln!("Error: Cannot specify both --force-small and --force-large");
        process::exit(1);
    }

    let force_size = if cli.force_small {
        Some(MaskBucket::Small)
    } else if cli.force_large {
        Some(MaskBucket::Large)
    } else {
        None
    };

    let opts = ProcessOptions {
        force: cli.force,
        threshold: cli.threshold,
        force_size,
        detect_only: cli.detect_only,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let masks = load_masks(Path::new(&cli.masks));
    if masks.is_empty() {
        eprintln!("Fatal: No usable mask bitmaps in {}", cli.masks);
        process::exit(1);
    }

    let strategy = if cli.direct {
        Strategy::Direct
    } else {
        Strategy::Auto
    };

    let engine = match WatermarkRemover::with_strategy(masks, strategy) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize engine: {e}");
            process::exit(1);
        }
    };

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    if !opts.quiet && opts.force {
        eprintln!("WARNING: Force mode - processing ALL images without detection!");
        eprintln!();
    }

    let results = if input_path.is_dir() {
        let output_dir = match &cli.output {
            Some(o) => PathBuf::from(o),
            None if opts.detect_only => input_path.to_path_buf(),
            None => {
                eprintln!("Error: Output directory is required for batch processing");
                eprintln!("Usage: unwatermark <input_dir> -o <output_dir>");
                process::exit(1);
            }
        };
        engine.process_directory(input_path, &output_dir, &opts)
    } else {
        let output_path = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path),
        };
        vec![engine.process_file(input_path, &output_path, &opts)]
    };

    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, &opts);
        if r.skipped {
            skip_count += 1;
        } else if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !opts.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if skip_count > 0 {
            eprint!(", Skipped: {skip_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

/// Load every configured mask bitmap found in `dir`.
///
/// A missing or undecodable bitmap makes only that footprint size
/// unavailable; the engine fails per-image when it would be needed.
fn load_masks(dir: &Path) -> MaskSet {
    let mut masks = MaskSet::new();
    for &(size, margin, name) in MASK_FILES {
        let path = dir.join(name);
        if let Err(e) = masks.load_file(&path, margin) {
            eprintln!(
                "Warning: {size}x{size} mask unavailable ({}): {e}",
                path.display()
            );
        }
    }
    masks
}

fn print_result(result: &ProcessReport, opts: &ProcessOptions) {
    if opts.quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if opts.detect_only {
        if result.success {
            let verdict = if result.skipped { "CLEAN" } else { "DETECTED" };
            eprintln!("[{verdict}] {filename}: {}", result.message);
        } else {
            eprintln!("[FAIL] {filename}: {}", result.message);
        }
        return;
    }

    if result.skipped {
        if !opts.quiet {
            eprintln!("[SKIP] {filename}: {}", result.message);
        }
    } else if result.success {
        if !opts.quiet {
            if result.diff > 0.0 {
                eprintln!("[OK] {filename} (diff {:.1})", result.diff);
            } else {
                eprintln!("[OK] {filename}");
            }
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if opts.verbose && !result.message.is_empty() {
        eprintln!("  -> {}", result.message);
    }
}
