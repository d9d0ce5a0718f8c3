use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

/// Nested compression deeper than this is treated as payload.
const MAX_LAYERS: usize = 4;

/// Opens a file and transparently peels off gzip/BGZF layers, so plain and
/// compressed summary statistics or chain files read the same way.
pub fn open_input(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    peel(Box::new(BufReader::new(file)))
}

/// Wraps `reader` in gzip decoders for as long as it starts with the gzip magic.
pub fn peel(mut reader: Box<dyn BufRead + Send>) -> io::Result<Box<dyn BufRead + Send>> {
    for _ in 0..MAX_LAYERS {
        if !is_gzip(reader.fill_buf()?) {
            break;
        }
        tracing::debug!("detected gzip layer");
        // MultiGzDecoder also handles BGZF and concatenated members.
        reader = Box::new(BufReader::new(MultiGzDecoder::new(reader)));
    }
    Ok(reader)
}

fn is_gzip(buf: &[u8]) -> bool {
    buf.len() >= 2 && buf[0] == 0x1f && buf[1] == 0x8b
}
