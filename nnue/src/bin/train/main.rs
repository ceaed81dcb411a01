mod args;
mod dataset;

mod training {
    pub mod evaluation;
    pub mod metrics;
    pub mod progress;
    pub mod trainer;
}

mod utils {
    pub mod device;
    pub mod loss;
}

use args::Args;
use clap::Parser;
use dataset::Dataset;
use log::LevelFilter;
use simplelog::{Config, SimpleLogger};
use std::error::Error;
use training::trainer::Trainer;

fn main() -> Result<(), Box<dyn Error>> {
    let args = init()?;

    let arch = args.architecture();
    arch.validate()?;
    log::info!(
        "Network: {}x2 -> {} -> {} -> 1, psqt {}",
        arch.k_half_dimensions,
        arch.hidden_dims,
        arch.hidden_dims,
        if arch.psqt { "on" } else { "off" }
    );

    let dataset = Dataset::load(&args, &arch)?;

    let mut trainer = Trainer::new(&args, &arch)?;
    trainer.train(&dataset)?;

    log::info!("Done!");
    Ok(())
}

fn init() -> Result<Args, Box<dyn Error>> {
    let args = Args::parse();
    SimpleLogger::init(LevelFilter::Info, Config::default())?;

    Ok(args)
}
