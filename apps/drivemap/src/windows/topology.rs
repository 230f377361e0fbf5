//! Topology resolver backed by the Windows Storage cmdlets.
//!
//! One script walks disks → partitions → volumes and returns a row per partition that has a
//! volume. A disk is tied to its EBS volume only through the volume ID the storage driver
//! reports as the disk serial number (`vol0123…`, sometimes with a `_n` suffix). Disks whose
//! serial doesn't carry one are never tagged.

use super::powershell::PowerShell;
use letter_remap::{DriveLetter, ResolveError, Topology, TopologyResolver, Volume, VolumeRole};
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashSet;

const ENUMERATE_SCRIPT: &str = r#"
$ErrorActionPreference = 'Stop'
$rows = foreach ($disk in Get-Disk) {
    foreach ($partition in Get-Partition -DiskNumber $disk.Number -ErrorAction SilentlyContinue) {
        $volume = $partition | Get-Volume -ErrorAction SilentlyContinue
        if (-not $volume) { continue }
        $letter = $null
        if ([int][char]$partition.DriveLetter -ne 0) { $letter = [string]$partition.DriveLetter }
        [pscustomobject]@{
            DiskNumber      = $disk.Number
            PartitionNumber = $partition.PartitionNumber
            SerialNumber    = $disk.SerialNumber
            IsBoot          = [bool]$disk.IsBoot
            IsSystem        = [bool]$disk.IsSystem
            DriveLetter     = $letter
            Label           = $volume.FileSystemLabel
            Path            = $volume.Path
        }
    }
}
ConvertTo-Json -InputObject @($rows) -Compress
"#;

/// One partition with a volume, as reported by the enumeration script.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PartitionRow {
    pub disk_number: u32,
    pub partition_number: u32,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub is_boot: bool,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub drive_letter: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Extracts an EBS volume ID (`vol-0123…`) from a disk serial number.
pub fn ebs_volume_id(serial: &str) -> Option<String> {
    let serial = serial.trim();
    let base = serial.split('_').next().unwrap_or(serial);
    let hex = base.strip_prefix("vol-").or_else(|| base.strip_prefix("vol"))?;
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("vol-{}", hex.to_ascii_lowercase()))
}

/// Builds volumes from script rows, ordered by disk and partition number.
///
/// Only the first volume on an EBS disk is a candidate and carries the EBS ID; any further
/// partitions on the same disk are unmanaged.
pub(crate) fn volumes_from_rows(mut rows: Vec<PartitionRow>) -> Vec<Volume> {
    rows.sort_by_key(|r| (r.disk_number, r.partition_number));

    let mut claimed = HashSet::new();
    let mut volumes = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(path) = row.path.filter(|p| !p.trim().is_empty()) else {
            debug!("Disk {} partition {} has no volume path, skipping", row.disk_number, row.partition_number);
            continue;
        };

        let ebs_id = row.serial_number.as_deref().and_then(ebs_volume_id);
        let fallback_id = format!("disk{}-part{}", row.disk_number, row.partition_number);
        let (id, role) = if row.is_boot || row.is_system {
            (fallback_id, VolumeRole::Boot)
        } else {
            match ebs_id {
                Some(ebs) if claimed.insert(ebs.clone()) => (ebs, VolumeRole::Candidate),
                Some(ebs) => (format!("{}-part{}", ebs, row.partition_number), VolumeRole::Unmanaged),
                None => (fallback_id, VolumeRole::Unmanaged),
            }
        };

        let mut volume = Volume::new(id, role).with_device_path(path);
        volume.letter = row.drive_letter.as_deref().and_then(|l| DriveLetter::parse(l).ok());
        volume.label = row.label.filter(|l| !l.is_empty());
        volumes.push(volume);
    }

    volumes
}

pub struct WindowsTopology {
    shell: PowerShell,
}

impl WindowsTopology {
    pub fn new(shell: PowerShell) -> Self {
        Self { shell }
    }
}

impl TopologyResolver for WindowsTopology {
    fn resolve(&self) -> Result<Topology, ResolveError> {
        let rows: Vec<PartitionRow> = self
            .shell
            .run_json(ENUMERATE_SCRIPT)
            .map_err(|e| ResolveError::EnumerationFailure(e.to_string()))?;
        let topology = Topology::new(volumes_from_rows(rows));
        info!(
            "Found {} volume(s), {} of them EBS candidates",
            topology.len(),
            topology.candidates().count()
        );
        Ok(topology)
    }
}
