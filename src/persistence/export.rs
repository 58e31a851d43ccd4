//! Plain-text export of the validated device list.

use std::path::Path;

use crate::validation::ValidatedDevice;

use super::device_store::StoreError;

/// One export line per device, pt-BR localized timestamp as the operators
/// expect it.
pub fn export_line(device: &ValidatedDevice) -> String {
    format!(
        "{} - Validado em: {}",
        device.id,
        device.validated_at().format("%d/%m/%Y, %H:%M:%S")
    )
}

/// Writes the export file, one line per validated device.
pub async fn export_validated(path: &Path, devices: &[ValidatedDevice]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let content = devices
        .iter()
        .map(export_line)
        .collect::<Vec<_>>()
        .join("\n");
    tokio::fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::device_registry::DeviceState;
    use chrono::{Local, TimeZone};
    use tempfile::TempDir;

    fn snapshot_at(id: &str, y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> ValidatedDevice {
        let when = Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap();
        ValidatedDevice::from_state(&DeviceState::new(id, when), when)
    }

    #[test]
    fn line_format_matches_operator_expectation() {
        let device = snapshot_at("ESP-01", 2026, 8, 28, 14, 5, 9);
        assert_eq!(export_line(&device), "ESP-01 - Validado em: 28/08/2026, 14:05:09");
    }

    #[tokio::test]
    async fn export_writes_one_line_per_device() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dispositivos_validados.txt");

        let devices = vec![
            snapshot_at("ESP-01", 2026, 1, 2, 3, 4, 5),
            snapshot_at("ESP-02", 2026, 1, 2, 3, 4, 6),
        ];
        export_validated(&path, &devices).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ESP-01 - Validado em: "));
        assert!(lines[1].starts_with("ESP-02 - Validado em: "));
    }
}
