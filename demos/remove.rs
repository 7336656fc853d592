//! Remove the watermark from a single image.
//!
//! Usage:
//! ```sh
//! cargo run --example remove -- assets input.png output.png
//! ```

use std::env;
use std::process;

use unwatermark::{MaskSet, ProcessOptions, WatermarkRemover};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <masks_dir> <input> <output>", args[0]);
        process::exit(1);
    }

    let mut masks = MaskSet::new();
    for (name, margin) in [("mask_96.png", 64), ("mask_48.png", 32)] {
        if let Err(e) = masks.load_file(std::path::Path::new(&args[1]).join(name).as_path(), margin)
        {
            eprintln!("Warning: {name}: {e}");
        }
    }

    let engine = WatermarkRemover::new(masks).expect("failed to initialize engine");
    let report = engine.process_file(
        args[2].as_ref(),
        args[3].as_ref(),
        &ProcessOptions::default(),
    );

    if report.skipped {
        println!("Skipped: {}", report.message);
    } else if report.success {
        println!("Done: {}", report.message);
    } else {
        eprintln!("Error: {}", report.message);
        process::exit(1);
    }
}
