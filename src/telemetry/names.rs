//! Hardware name normalization

use once_cell::sync::Lazy;
use regex::Regex;

/// Marketing noise removed anywhere in the name
static NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(R\)|\(TM\)|Corporation|CPU|Processor|Graphics|Video Controller")
        .expect("noise pattern is valid")
});

/// Clock speed suffix such as `@ 3.60GHz`
static CLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"@.*").expect("clock pattern is valid"));

/// Vendor and brand prefixes
static VENDOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)NVIDIA\s*GeForce\s*|AMD\s*Radeon\s*|Intel\s*").expect("vendor pattern is valid")
});

/// Shorten a CPU or GPU name for display.
///
/// `"Intel(R) Core(TM) i7-9700K CPU @ 3.60GHz"` becomes `"Core i7-9700K"`.
/// Anything that normalizes to nothing is reported as `"Unknown"`.
pub fn normalize_name(raw: &str) -> String {
    let name = NOISE.replace_all(raw, "");
    let name = CLOCK.replace(&name, "");
    let name = VENDOR.replace_all(&name, "");

    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        "Unknown".to_string()
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_cpu_names() {
        assert_eq!(normalize_name("Intel(R) Core(TM) i7-9700K CPU @ 3.60GHz"), "Core i7-9700K");
        assert_eq!(
            normalize_name("AMD Ryzen 7 5800X 8-Core Processor"),
            "AMD Ryzen 7 5800X 8-Core"
        );
        assert_eq!(normalize_name("intel(r) xeon(r) cpu"), "xeon");
    }

    #[test]
    fn test_normalize_gpu_names() {
        assert_eq!(normalize_name("NVIDIA GeForce RTX 3080"), "RTX 3080");
        assert_eq!(normalize_name("NVIDIA Corporation GA102"), "NVIDIA GA102");
        assert_eq!(normalize_name("AMD Radeon RX 6800 XT"), "RX 6800 XT");
        assert_eq!(normalize_name("Intel(R) UHD Graphics 630"), "UHD 630");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_name(""), "Unknown");
        assert_eq!(normalize_name("   "), "Unknown");
        assert_eq!(normalize_name("AMD Radeon(TM) Graphics"), "Unknown");
    }
}
