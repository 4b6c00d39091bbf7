use std::env;
use std::error::Error;

use mzreduce::isotopic_model::{Averagine, AveragineModel, IsotopeAbundanceEstimator};
use mzreduce::peaks::singly_charged_mz;

/// Print the averagine composition and isotope abundances for an ion.
///
/// Usage: `mz-abundance <m/z> [charge] [model]`
fn main() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    let mz = args
        .next()
        .inspect(|s| eprintln!("m/z: {s}"))
        .ok_or("Expected a floating point m/z")?
        .parse::<f64>()?;
    let charge = match args.next() {
        Some(s) => {
            eprintln!("z: {s}");
            s.parse::<u32>()?
        }
        None => 1,
    };
    if charge == 0 {
        return Err("The charge must be at least 1".into());
    }
    let averagine: Averagine = match args.next() {
        Some(s) => s.parse()?,
        None => Averagine::default(),
    };

    let mut model: AveragineModel = averagine.into();
    let mass = singly_charged_mz(mz, charge);
    println!("{:?} @ {mass:.4}: {}", averagine, model.scale(mass));
    for (i, abundance) in model.abundances(mass).into_iter().enumerate() {
        println!("{i}\t{abundance:.5}");
    }
    Ok(())
}
