/// Human-readable size, e.g. "10MB", "1.5MB", "512KB" or "300 bytes"
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    let scaled = |unit: u64, suffix: &str| {
        if bytes % unit == 0 {
            format!("{}{}", bytes / unit, suffix)
        } else {
            format!("{:.1}{}", bytes as f64 / unit as f64, suffix)
        }
    };

    if bytes >= MB {
        scaled(MB, "MB")
    } else if bytes >= KB {
        scaled(KB, "KB")
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(10 * 1024 * 1024), "10MB");
        assert_eq!(format_bytes(1536 * 1024), "1.5MB");
        assert_eq!(format_bytes(512 * 1024), "512KB");
        assert_eq!(format_bytes(300), "300 bytes");
    }
}
