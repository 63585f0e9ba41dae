//! Byte-count rendering and compression-ratio math shared by the summary
//! output and the progress formatter.

/// Unit ladder, 1024-based. Order kept from the legacy tool.
const UNITS: &[&str] = &["b", "kb", "mb", "gb", "zb", "pb"];

/// Render a byte count in the smallest unit that keeps the value under 1024,
/// or in `unit` if given (values are never promoted past an explicit unit).
/// Counts below 1024 print as whole bytes with no decimals.
pub fn format_bytes(bytes: u64, precision: usize, unit: Option<&str>) -> String {
    if bytes < 1024 {
        return format!("{} b", bytes);
    }
    let mut value = bytes as f64;
    let mut idx = 0usize;
    while value >= 1024.0 && idx + 1 < UNITS.len() {
        value /= 1024.0;
        idx += 1;
        if unit == Some(UNITS[idx]) {
            break;
        }
    }
    let scale = 10f64.powi(precision as i32);
    let rounded = (value * scale).round() / scale;
    format!("{:.*} {}", precision, rounded, UNITS[idx])
}

/// Percentage saved by compression, rounded to two decimals.
/// `None` when nothing was archived (no division fault on 0/0).
pub fn compress_ratio(uncompressed: u64, compressed: u64) -> Option<f64> {
    if uncompressed == 0 {
        return None;
    }
    let saved = (uncompressed as f64 - compressed as f64) * 100.0 / uncompressed as f64;
    Some((saved * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_below_threshold_stay_raw() {
        assert_eq!(format_bytes(0, 2, None), "0 b");
        assert_eq!(format_bytes(1023, 2, None), "1023 b");
    }

    #[test]
    fn kilobyte_boundary() {
        assert_eq!(format_bytes(1024, 2, None), "1.00 kb");
        assert_eq!(format_bytes(1536, 2, None), "1.50 kb");
        assert_eq!(format_bytes(1536, 0, None), "2 kb");
    }

    #[test]
    fn larger_units() {
        assert_eq!(format_bytes(1024 * 1024, 2, None), "1.00 mb");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024, 1, None), "5.0 gb");
    }

    #[test]
    fn explicit_unit_caps_promotion() {
        // 1 GiB asked for in kb stays in kb
        assert_eq!(format_bytes(1024 * 1024 * 1024, 2, Some("kb")), "1048576.00 kb");
        assert_eq!(format_bytes(1024 * 1024, 2, Some("mb")), "1.00 mb");
    }

    #[test]
    fn ratio_half() {
        assert_eq!(compress_ratio(1000, 500), Some(50.0));
    }

    #[test]
    fn ratio_rounds_to_two_decimals() {
        assert_eq!(compress_ratio(3, 1), Some(66.67));
    }

    #[test]
    fn ratio_of_nothing_is_none() {
        assert_eq!(compress_ratio(0, 0), None);
        assert_eq!(compress_ratio(0, 10), None);
    }
}
