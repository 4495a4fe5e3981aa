use crate::models::config::{CaptureConfiguration, EngineConfiguration};
use crate::models::driver::{DeviceDescriptor, DriverClassifier};
use crate::models::error::CaptureError;
use crate::models::waveform::WaveformBuffer;
use crate::session::capture_session::CaptureSession;
use crate::traits::device_catalog::DeviceCatalog;
use crate::traits::note_dispatcher::NoteDispatcher;

/// Picks a device, resolves its driver class once and runs the capture with
/// the matching threading strategy.
#[derive(Debug, Clone, Default)]
pub struct CaptureScheduler {
    classifier: DriverClassifier,
}

impl CaptureScheduler {
    pub fn new(classifier: DriverClassifier) -> Self {
        Self { classifier }
    }

    /// Default classification table with the configured host-API overrides.
    pub fn from_configuration(config: &EngineConfiguration) -> Self {
        Self::new(DriverClassifier::default().with_overrides(&config.drivers))
    }

    pub fn classifier(&self) -> &DriverClassifier {
        &self.classifier
    }

    /// The configured device, or the first one with enough input channels.
    pub fn select_device<C: DeviceCatalog>(
        &self,
        catalog: &C,
        config: &CaptureConfiguration,
    ) -> Result<DeviceDescriptor, CaptureError> {
        let devices = catalog.list_devices()?;
        let needed = config.channel_end();

        let device = match &config.device_id {
            Some(id) => devices
                .into_iter()
                .find(|d| &d.id == id)
                .ok_or_else(|| CaptureError::DeviceNotAvailable(id.clone()))?,
            None => devices
                .into_iter()
                .find(|d| d.max_input_channels >= needed)
                .ok_or_else(|| {
                    CaptureError::DeviceNotAvailable(format!("no input device with {} channels", needed))
                })?,
        };

        if device.max_input_channels < needed {
            return Err(CaptureError::ChannelsUnavailable {
                device_id: device.id,
                requested_end: needed,
                available: device.max_input_channels,
            });
        }
        Ok(device)
    }

    /// Open an owned session on the selected device. The calling thread
    /// becomes the session owner.
    pub fn open_session<C: DeviceCatalog>(
        &self,
        catalog: &C,
        config: &CaptureConfiguration,
    ) -> Result<CaptureSession<C::Backend>, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        let device = self.select_device(catalog, config)?;
        let driver_class = self.classifier.classify_device(&device);
        let backend = catalog.open(&device)?;
        CaptureSession::new(backend, config.clone(), driver_class)
    }

    /// Capture one note into a buffer, then tear the session down.
    pub fn capture<C: DeviceCatalog>(
        &self,
        catalog: &C,
        config: &CaptureConfiguration,
        notes: &mut dyn NoteDispatcher,
    ) -> Result<WaveformBuffer, CaptureError> {
        let mut session = self.open_session(catalog, config)?;
        let captured = session.capture(notes);
        let closed = session.close();
        let buffer = captured?;
        closed?;
        Ok(buffer)
    }
}
