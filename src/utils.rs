use tracing::debug;

const BYTES_PER_MB: f64 = 1_048_576.0;

/// Resident set size of this process in bytes, if the host exposes it.
#[cfg(target_os = "linux")]
pub fn resident_memory_bytes() -> Option<u64> {
    // statm: size resident shared text lib data dt (in pages)
    let statm = match std::fs::read_to_string("/proc/self/statm") {
        Ok(statm) => statm,
        Err(e) => {
            debug!("Failed to read /proc/self/statm: {}", e);
            return None;
        }
    };
    let pages = parse_statm_resident(&statm)?;
    Some(pages * page_size::get() as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn resident_memory_bytes() -> Option<u64> {
    debug!("Resident memory not available on this platform");
    None
}

/// Resident memory in MB
pub fn resident_memory_mb() -> Option<f64> {
    resident_memory_bytes().map(|bytes| bytes as f64 / BYTES_PER_MB)
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_statm_resident(statm: &str) -> Option<u64> {
    statm.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statm_resident_field_is_second() {
        assert_eq!(parse_statm_resident("5123 812 300 10 0 700 0\n"), Some(812));
        assert_eq!(parse_statm_resident("5123"), None);
        assert_eq!(parse_statm_resident("a b"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn own_process_has_resident_memory() {
        let mb = resident_memory_mb().unwrap();
        assert!(mb > 0.0);
    }
}
