use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Threading requirement of an audio driver for stream initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverClass {
    /// Stream start, stop and note-off must all happen on the thread that
    /// owns the session.
    RequiresCallerThread,
    /// Capture may run on a dedicated worker thread.
    ThreadSafe,
}

impl DriverClass {
    pub fn requires_caller_thread(self) -> bool {
        matches!(self, Self::RequiresCallerThread)
    }
}

/// An input device as reported by the device-enumeration collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
    pub host_api_name: String,
    pub max_input_channels: u16,
}

/// Host-API names as reported by common enumeration layers.
const THREAD_SAFE_HOST_APIS: &[&str] = &[
    "Windows WASAPI",
    "WASAPI",
    "MME",
    "Windows DirectSound",
    "DirectSound",
    "Windows WDM-KS",
    "Core Audio",
    "CoreAudio",
    "ALSA",
    "JACK Audio Connection Kit",
    "JACK",
    "PulseAudio",
];

/// Maps a device's host-API identity to its [`DriverClass`].
///
/// Lookup is an exact match on the trimmed, case-folded host-API name.
/// Names missing from the table get `fallback`.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverClassifier {
    table: HashMap<String, DriverClass>,
    fallback: DriverClass,
}

impl DriverClassifier {
    /// An empty table: every host API resolves to `fallback`.
    pub fn empty(fallback: DriverClass) -> Self {
        Self {
            table: HashMap::new(),
            fallback,
        }
    }

    /// Add or replace the class for one host API.
    pub fn with_entry(mut self, host_api_name: &str, class: DriverClass) -> Self {
        self.insert(host_api_name, class);
        self
    }

    /// Apply overrides, typically from configuration.
    pub fn with_overrides<'a>(mut self, overrides: impl IntoIterator<Item = (&'a String, &'a DriverClass)>) -> Self {
        for (name, class) in overrides {
            self.insert(name, *class);
        }
        self
    }

    pub fn insert(&mut self, host_api_name: &str, class: DriverClass) {
        self.table.insert(normalize(host_api_name), class);
    }

    pub fn fallback(&self) -> DriverClass {
        self.fallback
    }

    pub fn classify(&self, host_api_name: &str) -> DriverClass {
        match self.table.get(&normalize(host_api_name)) {
            Some(class) => *class,
            None => {
                log::warn!(
                    "Unknown host API '{}', assuming {:?}",
                    host_api_name,
                    self.fallback
                );
                self.fallback
            }
        }
    }

    pub fn classify_device(&self, device: &DeviceDescriptor) -> DriverClass {
        self.classify(&device.host_api_name)
    }
}

impl Default for DriverClassifier {
    /// ASIO requires caller-thread capture; known host APIs are thread-safe;
    /// unknown ones use caller-thread capture, which every driver tolerates.
    fn default() -> Self {
        let mut classifier = Self::empty(DriverClass::RequiresCallerThread);
        classifier.insert("ASIO", DriverClass::RequiresCallerThread);
        for name in THREAD_SAFE_HOST_APIS {
            classifier.insert(name, DriverClass::ThreadSafe);
        }
        classifier
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asio_requires_caller_thread() {
        let classifier = DriverClassifier::default();
        assert_eq!(classifier.classify("ASIO"), DriverClass::RequiresCallerThread);
        assert_eq!(classifier.classify("  asio "), DriverClass::RequiresCallerThread);
    }

    #[test]
    fn common_host_apis_are_thread_safe() {
        let classifier = DriverClassifier::default();
        for name in ["Windows WASAPI", "MME", "Core Audio", "ALSA", "JACK Audio Connection Kit"] {
            assert_eq!(classifier.classify(name), DriverClass::ThreadSafe, "{name}");
        }
    }

    #[test]
    fn lookup_is_exact_not_substring() {
        let classifier =
            DriverClassifier::empty(DriverClass::ThreadSafe).with_entry("ASIO", DriverClass::RequiresCallerThread);
        // Contains "asio" but is not ASIO.
        assert_eq!(classifier.classify("Fantasio Bridge"), DriverClass::ThreadSafe);
        assert_eq!(classifier.classify("ASIO4ALL"), DriverClass::ThreadSafe);
        assert_eq!(classifier.classify("asio"), DriverClass::RequiresCallerThread);
    }

    #[test]
    fn unknown_uses_fallback() {
        assert_eq!(
            DriverClassifier::default().classify("Mystery API"),
            DriverClass::RequiresCallerThread
        );
        assert_eq!(
            DriverClassifier::empty(DriverClass::ThreadSafe).classify("ASIO"),
            DriverClass::ThreadSafe
        );
    }

    #[test]
    fn overrides_replace_defaults() {
        let overrides = HashMap::from([("MME".to_string(), DriverClass::RequiresCallerThread)]);
        let classifier = DriverClassifier::default().with_overrides(&overrides);
        assert_eq!(classifier.classify("MME"), DriverClass::RequiresCallerThread);
        assert_eq!(classifier.classify("ALSA"), DriverClass::ThreadSafe);
    }

    #[test]
    fn classify_device_uses_host_api() {
        let device = DeviceDescriptor {
            id: "3".into(),
            name: "Fireface UFX".into(),
            host_api_name: "ASIO".into(),
            max_input_channels: 12,
        };
        assert!(DriverClassifier::default().classify_device(&device).requires_caller_thread());
    }
}
