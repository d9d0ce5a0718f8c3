#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

use sumstats_lift::Hg38;
use sumstats_lift::record::columns;

fuzz_target!(|data: &[u8]| {
    // Reading and cleaning should never panic, whatever the bytes.
    let Ok(raw) = sumstats_lift::sumstats::parse_table(Cursor::new(data)) else {
        return;
    };
    let critical: Vec<String> = columns::CRITICAL.iter().map(|s| s.to_string()).collect();
    if let Ok(cleaned) = sumstats_lift::clean::clean::<Hg38>(raw, &critical) {
        for record in cleaned.table.rows() {
            let _ = format!("{}", record.coordinate);
        }
    }
});
