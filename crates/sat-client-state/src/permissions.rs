//! Media device discovery and permission model.
//!
//! The host platform is reached through [`MediaProbe`]; this module only
//! shapes what the probe reports into a [`DeviceReport`].
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Label prefix of the synthetic duplicate "default" device some hosts list.
const DEFAULT_DEVICE_PREFIX: &str = "Default - ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    Audio,
    Video,
}

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("media probe unavailable: {0}")]
    Unavailable(String),

    #[error("{kind:?} permission denied")]
    Denied { kind: PermissionKind },
}

/// Device as enumerated by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDevice {
    pub label: String,
    pub device_id: String,
}

impl RawDevice {
    pub fn new(label: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            device_id: device_id.into(),
        }
    }
}

/// Device as offered to the user for selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub text: String,
    pub value: String,
}

/// Unfiltered view of the host media environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaEnvironment {
    pub has_webcam: bool,
    pub has_microphone: bool,
    pub has_speakers: bool,
    pub browser: String,
    pub webcam_permission: bool,
    pub microphone_permission: bool,
    pub audio_in: Vec<RawDevice>,
    pub audio_out: Vec<RawDevice>,
    pub video_in: Vec<RawDevice>,
}

/// Host media access.
#[async_trait::async_trait]
pub trait MediaProbe: Send + Sync {
    /// Snapshot of the devices and the permissions granted so far.
    async fn probe(&self) -> Result<MediaEnvironment, PermissionError>;

    /// Ask the user for `kind`. `Ok(false)` means the user declined.
    async fn request(&self, kind: PermissionKind) -> Result<bool, PermissionError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub webcam: bool,
    pub microphone: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLists {
    pub audio_in: Vec<Device>,
    pub audio_out: Vec<Device>,
    pub video_in: Vec<Device>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocked {
    pub audio: bool,
    pub video: bool,
}

/// What the client knows about local media.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceReport {
    pub has_webcam: bool,
    pub has_microphone: bool,
    pub has_speakers: bool,
    pub browser: String,
    pub permissions: Permissions,
    pub devices: DeviceLists,
    pub blocked: Blocked,
}

impl DeviceReport {
    pub fn is_blocked(&self, kind: PermissionKind) -> bool {
        match kind {
            PermissionKind::Audio => self.blocked.audio,
            PermissionKind::Video => self.blocked.video,
        }
    }
}

/// Selection entries for `devices`, without the duplicate default entries.
pub fn format_devices(devices: &[RawDevice]) -> Vec<Device> {
    devices
        .iter()
        .filter(|d| !d.label.contains(DEFAULT_DEVICE_PREFIX))
        .map(|d| Device {
            text: d.label.clone(),
            value: d.device_id.clone(),
        })
        .collect()
}

/// Probe the host and build a report.
///
/// Device lists stay empty until the matching permission is granted:
/// audio in/out need the microphone, video in needs the webcam.
pub async fn device_report(probe: &dyn MediaProbe) -> Result<DeviceReport, PermissionError> {
    let env = probe.probe().await?;
    let mut report = DeviceReport {
        has_webcam: env.has_webcam,
        has_microphone: env.has_microphone,
        has_speakers: env.has_speakers,
        browser: env.browser,
        ..Default::default()
    };

    if env.webcam_permission {
        report.permissions.webcam = true;
        report.devices.video_in = format_devices(&env.video_in);
    }
    if env.microphone_permission {
        report.permissions.microphone = true;
        report.devices.audio_in = format_devices(&env.audio_in);
        report.devices.audio_out = format_devices(&env.audio_out);
    }

    debug!(
        webcam = report.permissions.webcam,
        microphone = report.permissions.microphone,
        "media devices probed"
    );
    Ok(report)
}

/// Ask for `kind` and fold the answer into `report`.
///
/// A refusal marks the kind as blocked and returns [`PermissionError::Denied`];
/// a grant re-probes so the device lists fill in. `blocked` survives the
/// re-probe.
pub async fn request_permission(
    probe: &dyn MediaProbe,
    report: &mut DeviceReport,
    kind: PermissionKind,
) -> Result<(), PermissionError> {
    if !probe.request(kind).await? {
        warn!(?kind, "media permission denied");
        match kind {
            PermissionKind::Audio => report.blocked.audio = true,
            PermissionKind::Video => report.blocked.video = true,
        }
        return Err(PermissionError::Denied { kind });
    }

    let blocked = Blocked {
        audio: report.blocked.audio && kind != PermissionKind::Audio,
        video: report.blocked.video && kind != PermissionKind::Video,
    };
    *report = device_report(probe).await?;
    report.blocked = blocked;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_duplicates_are_dropped() {
        let raw = vec![
            RawDevice::new("Default - Built-in Microphone", "default"),
            RawDevice::new("Built-in Microphone", "mic-1"),
            RawDevice::new("USB Headset", "mic-2"),
        ];
        let formatted = format_devices(&raw);
        assert_eq!(
            formatted,
            vec![
                Device { text: "Built-in Microphone".into(), value: "mic-1".into() },
                Device { text: "USB Headset".into(), value: "mic-2".into() },
            ]
        );
    }

    #[test]
    fn report_json_is_camel_case() {
        let report = DeviceReport {
            has_webcam: true,
            browser: "Firefox".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["hasWebcam"], true);
        assert_eq!(json["hasSpeakers"], false);
        assert_eq!(json["permissions"]["microphone"], false);
        assert!(json["devices"]["audioIn"].as_array().unwrap().is_empty());
        assert!(json["devices"]["videoIn"].as_array().unwrap().is_empty());
        assert_eq!(json["blocked"]["video"], false);
    }
}
