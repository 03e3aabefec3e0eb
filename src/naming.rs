//! Mapping plot identifiers to file names.
//!
//! Identifiers (usually the name of the plotted source file) may contain
//! anything, including path separators. They are stored base64url-encoded,
//! which keeps the mapping reversible and the names safe on every filesystem.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

pub const PLOT_EXTENSION: &str = "plot";

/// Longest file name common filesystems accept, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// File name of the plot with the given identifier.
///
/// The name is about 4/3 as long as the identifier and may exceed
/// [MAX_FILE_NAME_LEN].
pub fn plot_file_name(identifier: &str) -> String {
    format!(
        "{}.{PLOT_EXTENSION}",
        URL_SAFE_NO_PAD.encode(identifier.as_bytes())
    )
}

/// The identifier a plot file name was made from, if it is one.
pub fn plot_identifier(file_name: &str) -> Option<String> {
    let encoded = file_name.strip_suffix(PLOT_EXTENSION)?.strip_suffix('.')?;
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}
