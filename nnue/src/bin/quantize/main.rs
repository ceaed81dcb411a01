mod args;

use args::Args;
use clap::Parser;
use log::LevelFilter;
use nnue::quantizer::{log_piece_values, piece_values};
use nnue::{codec, quantize, Parameters, FORMAT_VERSION};
use simplelog::{Config, SimpleLogger};
use std::error::Error;
use std::path::{Path, PathBuf};

const CHECKPOINT_EXTENSION: &str = "safetensors";
const NETWORK_EXTENSION: &str = "nnue";

fn main() -> Result<(), Box<dyn Error>> {
    let args = init()?;

    let input = Path::new(&args.checkpoint);
    let Some(output) = output_path(input) else {
        log::info!(
            "{} is not a .{} checkpoint, nothing to do",
            input.display(),
            CHECKPOINT_EXTENSION
        );
        return Ok(());
    };

    let arch = args.architecture();
    log::info!("Loading {}", input.display());
    let params = Parameters::load(input, &arch)?;

    if let Some(values) = piece_values(&params, &arch) {
        log_piece_values(&values);
    }

    log::info!("Quantizing with format version {}", FORMAT_VERSION);
    let network = match quantize(&params, &arch) {
        Ok(network) => network,
        Err(e) => {
            log::error!("Quantization failed: {}", e);
            return Err(e.into());
        }
    };

    codec::write(&output, &network, &arch)?;
    log::info!("Wrote {} ({} bytes)", output.display(), arch.file_size());

    if args.verify {
        let written = codec::read(&output, &arch)?;
        if written != network {
            return Err(format!("{} does not read back identically", output.display()).into());
        }
        log::info!("Verified {}", output.display());
    }

    Ok(())
}

/// `<name>.safetensors` becomes `<name>.nnue`; anything else is rejected.
fn output_path(input: &Path) -> Option<PathBuf> {
    let is_checkpoint = input
        .extension()
        .is_some_and(|ext| ext == CHECKPOINT_EXTENSION);
    is_checkpoint.then(|| input.with_extension(NETWORK_EXTENSION))
}

fn init() -> Result<Args, Box<dyn Error>> {
    let args = Args::parse();

    SimpleLogger::init(LevelFilter::Info, Config::default())?;

    Ok(args)
}
