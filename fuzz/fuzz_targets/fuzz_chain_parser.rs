#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

use sumstats_lift::ChainMap;
use sumstats_lift::record::{Chromosome, Coordinate};

fuzz_target!(|data: &[u8]| {
    let Ok(chain) = ChainMap::from_reader(Cursor::new(data)) else {
        return;
    };
    for position in [1, 1_000, 1_000_000, u64::MAX] {
        let _ = chain.lift_coordinate(&Coordinate::new(Chromosome::autosome(1), position));
    }
});
