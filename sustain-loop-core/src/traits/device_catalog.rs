use crate::models::driver::DeviceDescriptor;
use crate::models::error::CaptureError;
use crate::traits::capture_backend::CaptureBackend;

/// Device enumeration collaborator.
pub trait DeviceCatalog {
    type Backend: CaptureBackend;

    /// Input devices currently present.
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError>;

    /// Open exclusive access to `device`.
    fn open(&self, device: &DeviceDescriptor) -> Result<Self::Backend, CaptureError>;
}
