//! Letter and label changes through `Set-Partition` / `Set-Volume`.

use super::powershell::{PowerShell, quote};
use letter_remap::{DriveLetter, StorageError, StorageManager, Volume};

pub struct WindowsStorage {
    shell: PowerShell,
}

impl WindowsStorage {
    pub fn new(shell: PowerShell) -> Self {
        Self { shell }
    }
}

fn set_letter_script(volume: &Volume, letter: DriveLetter) -> String {
    format!(
        "$ErrorActionPreference = 'Stop'; Get-Volume -Path {} | Get-Partition | Set-Partition -NewDriveLetter {}",
        quote(&volume.device_path),
        letter.as_char()
    )
}

fn set_label_script(volume: &Volume, label: &str) -> String {
    format!(
        "$ErrorActionPreference = 'Stop'; Set-Volume -Path {} -NewFileSystemLabel {}",
        quote(&volume.device_path),
        quote(label)
    )
}

impl StorageManager for WindowsStorage {
    fn set_letter(&self, volume: &Volume, letter: DriveLetter) -> Result<(), StorageError> {
        self.shell
            .run(&set_letter_script(volume, letter))
            .map(|_| ())
            .map_err(|e| StorageError::Rejected(e.to_string()))
    }

    fn set_label(&self, volume: &Volume, label: &str) -> Result<(), StorageError> {
        self.shell
            .run(&set_label_script(volume, label))
            .map(|_| ())
            .map_err(|e| StorageError::Rejected(e.to_string()))
    }
}
