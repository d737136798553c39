/// Images below this many megabytes get their allocation doubled.
const SMALL_IMAGE_MB: u64 = 7;

/// Estimates the size in MB of the Singularity image needed to hold a Docker
/// image whose `docker inspect` size is `source_bytes`.
///
/// All arithmetic is integer (floor) division so that the result matches the
/// historical shell heuristic exactly:
/// - `mb = bytes / 1_000_000 + 1`
/// - `mb < 7` → `mb * 2`
/// - otherwise → `mb + mb * 7 / 10`
pub fn estimate_size_mb(source_bytes: u64) -> u64 {
    let mb = source_bytes / 1_000_000 + 1;

    if mb < SMALL_IMAGE_MB {
        mb * 2
    } else {
        mb + mb * 7 / 10
    }
}
