use std::sync::Mutex;

use sat_client_state::{
    device_report, request_permission, MediaEnvironment, MediaProbe, PermissionError,
    PermissionKind, RawDevice,
};

/// Host stub: grants whatever `allow` lists and flips the matching
/// permission in later probes.
struct FakeHost {
    env: Mutex<MediaEnvironment>,
    allow: Vec<PermissionKind>,
}

impl FakeHost {
    fn new(allow: Vec<PermissionKind>) -> Self {
        let env = MediaEnvironment {
            has_webcam: true,
            has_microphone: true,
            has_speakers: true,
            browser: "Chrome".into(),
            audio_in: vec![
                RawDevice::new("Default - Headset", "default"),
                RawDevice::new("Headset", "in-1"),
            ],
            audio_out: vec![RawDevice::new("Speakers", "out-1")],
            video_in: vec![RawDevice::new("FaceTime HD", "cam-1")],
            ..Default::default()
        };
        Self {
            env: Mutex::new(env),
            allow,
        }
    }
}

#[async_trait::async_trait]
impl MediaProbe for FakeHost {
    async fn probe(&self) -> Result<MediaEnvironment, PermissionError> {
        Ok(self.env.lock().unwrap().clone())
    }

    async fn request(&self, kind: PermissionKind) -> Result<bool, PermissionError> {
        if !self.allow.contains(&kind) {
            return Ok(false);
        }
        let mut env = self.env.lock().unwrap();
        match kind {
            PermissionKind::Audio => env.microphone_permission = true,
            PermissionKind::Video => env.webcam_permission = true,
        }
        Ok(true)
    }
}

struct BrokenHost;

#[async_trait::async_trait]
impl MediaProbe for BrokenHost {
    async fn probe(&self) -> Result<MediaEnvironment, PermissionError> {
        Err(PermissionError::Unavailable("no media devices api".into()))
    }

    async fn request(&self, _kind: PermissionKind) -> Result<bool, PermissionError> {
        Err(PermissionError::Unavailable("no media devices api".into()))
    }
}

#[tokio::test]
async fn lists_stay_empty_without_permission() {
    let host = FakeHost::new(vec![]);
    let report = device_report(&host).await.unwrap();

    assert!(report.has_webcam && report.has_microphone && report.has_speakers);
    assert_eq!(report.browser, "Chrome");
    assert!(!report.permissions.webcam && !report.permissions.microphone);
    assert!(report.devices.audio_in.is_empty());
    assert!(report.devices.audio_out.is_empty());
    assert!(report.devices.video_in.is_empty());
}

#[tokio::test]
async fn microphone_grant_fills_audio_lists_only() {
    let host = FakeHost::new(vec![PermissionKind::Audio]);
    let mut report = device_report(&host).await.unwrap();

    request_permission(&host, &mut report, PermissionKind::Audio)
        .await
        .unwrap();

    assert!(report.permissions.microphone);
    assert_eq!(report.devices.audio_in.len(), 1);
    assert_eq!(report.devices.audio_in[0].value, "in-1");
    assert_eq!(report.devices.audio_out.len(), 1);
    assert!(report.devices.video_in.is_empty());
    assert!(!report.blocked.audio);
}

#[tokio::test]
async fn refusal_marks_blocked_and_survives_other_grants() {
    let host = FakeHost::new(vec![PermissionKind::Audio]);
    let mut report = device_report(&host).await.unwrap();

    let err = request_permission(&host, &mut report, PermissionKind::Video)
        .await
        .unwrap_err();
    assert!(matches!(err, PermissionError::Denied { kind: PermissionKind::Video }));
    assert!(report.is_blocked(PermissionKind::Video));

    request_permission(&host, &mut report, PermissionKind::Audio)
        .await
        .unwrap();
    assert!(report.is_blocked(PermissionKind::Video));
    assert!(!report.is_blocked(PermissionKind::Audio));
}

#[tokio::test]
async fn probe_failure_propagates() {
    let err = device_report(&BrokenHost).await.unwrap_err();
    assert!(matches!(err, PermissionError::Unavailable(_)));
}
