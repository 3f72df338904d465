//! Utility functions for file naming and human-readable output

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Binary magnitude units used by [`format_bytes`]
const BYTE_UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];

/// Suffix appended to in-progress downloads
pub const PARTIAL_SUFFIX: &str = "part";

/// Extract the file name (last path segment) from a download URL
///
/// The query string and fragment are ignored and percent-encoding is decoded,
/// so `https://cdn.example.com/s101_hd.mov?dl=1` yields `s101_hd.mov`.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if the URL does not parse or has no usable
/// final segment.
///
/// # Examples
///
/// ```
/// use wwdc_dl::utils::file_name_from_url;
///
/// let name = file_name_from_url("https://cdn.example.com/videos/s101_hd.mov?dl=1").unwrap();
/// assert_eq!(name, "s101_hd.mov");
/// ```
pub fn file_name_from_url(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    // A decoded segment must still be a single plain file name
    if decoded.is_empty()
        || decoded == "."
        || decoded == ".."
        || decoded.contains('/')
        || decoded.contains('\\')
    {
        return Err(Error::InvalidUrl {
            url: url.to_string(),
            reason: "URL has no file name".to_string(),
        });
    }

    Ok(decoded)
}

/// Path of the in-progress file for a final destination
///
/// Next to the final file the partial file is `.<name>.part`. A shared
/// `temp_dir` holds partial files of every destination directory, so there
/// the name also carries a digest of the whole final path:
/// `.<name>.<digest>.part`. Distinct final paths never share a partial file.
pub fn partial_path(final_path: &Path, temp_dir: Option<&Path>) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());

    match (temp_dir, final_path.parent()) {
        (Some(dir), _) => dir.join(format!(
            ".{}.{:016x}.{}",
            name,
            path_digest(final_path),
            PARTIAL_SUFFIX
        )),
        (None, Some(parent)) => parent.join(format!(".{}.{}", name, PARTIAL_SUFFIX)),
        (None, None) => PathBuf::from(format!(".{}.{}", name, PARTIAL_SUFFIX)),
    }
}

/// Stable digest of a path (fixed-key SipHash, identical across runs)
fn path_digest(path: &Path) -> u64 {
    use std::hash::{DefaultHasher, Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

/// Format a byte count using binary magnitudes
///
/// The unit is chosen as `floor(log1024(bytes))`, clamped to terabytes.
///
/// # Examples
///
/// ```
/// use wwdc_dl::utils::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.5 kB");
/// assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    // floor(log1024(n)) == floor(log2(n)) / 10
    let exponent = ((63 - bytes.leading_zeros()) / 10) as usize;
    let exponent = exponent.min(BYTE_UNITS.len() - 1);

    if exponent == 0 {
        return format!("{} B", bytes);
    }

    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    format!("{:.1} {}", value, BYTE_UNITS[exponent])
}

/// Format a percentage with one decimal
pub fn format_percent(percent: f64) -> String {
    format!("{:.1}%", percent)
}
