use crate::atomic::atomic_write;
use crate::error::Result;
use crate::stats::Bucket;
use csv::WriterBuilder;
use std::path::Path;

/// Writes the buckets as a `Key,Count` CSV, in sequence order.
///
/// The whole table is rendered in memory first, so a failed export never
/// leaves a truncated file behind.
pub fn export_buckets_csv<P: AsRef<Path>>(buckets: &[Bucket], path: P) -> Result<()> {
    #[allow(unused_mut)]
    let mut builder = WriterBuilder::new();
    #[cfg(windows)]
    {
        use csv::Terminator;
        builder = builder.terminator(Terminator::CRLF);
    }

    let mut wtr = builder.from_writer(Vec::new());
    wtr.write_record(["Key", "Count"])?;
    for bucket in buckets {
        let count_s = bucket.count.to_string();
        wtr.write_record([bucket.key.as_str(), count_s.as_str()])?;
    }
    let data = wtr.into_inner().map_err(|e| e.into_error())?;

    atomic_write(path.as_ref(), &data)
}
