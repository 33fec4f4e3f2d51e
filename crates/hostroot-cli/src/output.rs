//! Rendering of inspection results for stdout.

use hostroot_runtime::inspect::Inspection;

/// Renders the mount path alone, or the whole inspection as JSON.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render(inspection: &Inspection, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(inspection)?);
    }
    Ok(inspection.mount_path.display().to_string())
}
