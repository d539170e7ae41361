use sanitize_filename::sanitize;
use std::path::{Path, PathBuf};

/// Generate a filename for a registration JSON file
/// Format: registration_userid.json
pub fn registration_filename(user_id: &str) -> String {
    format!("registration_{user_id}.json")
}

/// Whether a file name looks like one produced by [`registration_filename`]
pub fn is_registration_filename(filename: &str) -> bool {
    filename.starts_with("registration_") && filename.ends_with(".json")
}

/// Sanitize and create full file path
pub fn sanitized_file_path(output_dir: &Path, filename: &str) -> PathBuf {
    let sanitized_filename = sanitize(filename);
    output_dir.join(sanitized_filename)
}
