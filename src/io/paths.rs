//! Path helpers shared by every stage

use crate::types::{PipelineError, PipelineResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Base name of a file up to its first dot (`C:/test/dtm_5m.tif` -> `dtm_5m`)
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .and_then(|name| name.split('.').next().map(str::to_string))
        .unwrap_or_default()
}

/// File name including extension, or an empty string for paths without one
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// List files in `folder` whose name ends with `extension` (e.g. `.las`), sorted by path
pub fn list_files_with_extension(folder: &Path, extension: &str) -> PipelineResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() && file_name(&path).ends_with(extension) {
            files.push(path);
        }
    }
    files.sort();
    log::debug!("Found {} '{}' files in {}", files.len(), extension, folder.display());
    Ok(files)
}

/// Create `folder` and its parents if missing
pub fn ensure_folder(folder: &Path) -> PipelineResult<()> {
    if !folder.exists() {
        log::debug!("Creating folder {}", folder.display());
        std::fs::create_dir_all(folder)?;
    }
    Ok(())
}

fn digit_run() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"[0-9]+").expect("static regex"))
}

/// First run of ASCII digits in `text`
pub fn first_number(text: &str) -> Option<&str> {
    digit_run().find(text).map(|m| m.as_str())
}

/// Resolution encoded in a raster file name (`DTM_bilinear_5m.tif` -> 5)
pub fn resolution_from_name(path: &Path) -> PipelineResult<u32> {
    let name = file_name(path);
    let digits = first_number(&name).ok_or_else(|| {
        PipelineError::InvalidFormat(format!("No resolution digits in file name '{}'", name))
    })?;
    digits
        .parse()
        .map_err(|e| PipelineError::InvalidFormat(format!("Resolution '{}' in '{}': {}", digits, name, e)))
}

/// Render a float the way Python's `str(float)` does.
///
/// FUSION command lines and the downstream modelling scripts expect `90.0`
/// rather than `90`, and exponent notation outside `[1e-4, 1e16)`.
pub fn python_float_str(value: f64) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".to_string()
        } else if value > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }

    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{:e}", value);
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(rest) => ('-', rest),
            None => ('+', exponent),
        };
        return format!("{}e{}{:0>2}", mantissa, sign, digits);
    }

    let formatted = format!("{}", value);
    if formatted.contains('.') {
        formatted
    } else {
        format!("{}.0", formatted)
    }
}
