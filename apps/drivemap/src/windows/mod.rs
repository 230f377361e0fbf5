//! Windows storage backend.

mod disks;
mod powershell;
mod storage;
mod topology;


pub use disks::online_disks;
pub use powershell::{PowerShell, PowerShellError};
pub use storage::WindowsStorage;
pub use topology::{WindowsTopology, ebs_volume_id};
