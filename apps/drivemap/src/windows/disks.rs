//! Bringing attached disks online.
//!
//! Newly attached EBS disks may come up offline or read-only depending on the SAN policy.
//! Their volumes aren't visible to the resolver until they're online and writable.

use super::powershell::{PowerShell, PowerShellError};
use log::{info, warn};

const LIST_OFFLINE_SCRIPT: &str = "$ErrorActionPreference = 'Stop'; \
    $numbers = @(Get-Disk \
    | Where-Object { -not $_.IsBoot -and -not $_.IsSystem -and ($_.IsOffline -or $_.IsReadOnly) } \
    | ForEach-Object { $_.Number }); ConvertTo-Json -InputObject $numbers -Compress";

fn online_script(disk_number: u32) -> String {
    format!(
        "$ErrorActionPreference = 'Stop'; Set-Disk -Number {n} -IsOffline $false; \
         Set-Disk -Number {n} -IsReadOnly $false",
        n = disk_number
    )
}

/// Brings every offline or read-only non-boot disk online and writable.
///
/// Returns how many disks were changed. Failing to list disks is an error; failing to
/// change one disk is logged and the rest are still tried.
pub fn online_disks(shell: &PowerShell) -> Result<usize, PowerShellError> {
    let numbers: Vec<u32> = shell.run_json(LIST_OFFLINE_SCRIPT)?;
    let mut changed = 0;
    for number in numbers {
        match shell.run(&online_script(number)) {
            Ok(_) => {
                info!("Disk {} is online and writable", number);
                changed += 1;
            }
            Err(e) => warn!("Couldn't bring disk {} online: {}", number, e),
        }
    }
    Ok(changed)
}
