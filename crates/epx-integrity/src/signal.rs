//! Signal taxonomy: the closed set of detectable conditions, their weights,
//! and the wire envelope producers send.

use serde::{Deserialize, Serialize};

use crate::{IntegrityError, InvalidSignalReason};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

// ---------------------------------------------------------------------------
// SignalKind
// ---------------------------------------------------------------------------

/// Every condition a producer can report. Closed: anything else is rejected
/// at the envelope boundary.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    TabHidden,
    FullscreenExit,
    RestrictedKeyCombo,
    ContextMenu,
    NoFaceDetected,
    MultipleFacesDetected,
    GazeAway,
    CameraSuspiciousActivity,
    #[serde(rename = "ai_content_high_likelihood")]
    AIContentHighLikelihood,
    #[serde(rename = "ai_content_moderate_likelihood")]
    AIContentModerateLikelihood,
    #[serde(rename = "ai_content_low_likelihood")]
    AIContentLowLikelihood,
    ConnectionLost,
}

impl SignalKind {
    pub const ALL: [SignalKind; 12] = [
        SignalKind::TabHidden,
        SignalKind::FullscreenExit,
        SignalKind::RestrictedKeyCombo,
        SignalKind::ContextMenu,
        SignalKind::NoFaceDetected,
        SignalKind::MultipleFacesDetected,
        SignalKind::GazeAway,
        SignalKind::CameraSuspiciousActivity,
        SignalKind::AIContentHighLikelihood,
        SignalKind::AIContentModerateLikelihood,
        SignalKind::AIContentLowLikelihood,
        SignalKind::ConnectionLost,
    ];

    /// Stable wire name (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::TabHidden => "tab_hidden",
            SignalKind::FullscreenExit => "fullscreen_exit",
            SignalKind::RestrictedKeyCombo => "restricted_key_combo",
            SignalKind::ContextMenu => "context_menu",
            SignalKind::NoFaceDetected => "no_face_detected",
            SignalKind::MultipleFacesDetected => "multiple_faces_detected",
            SignalKind::GazeAway => "gaze_away",
            SignalKind::CameraSuspiciousActivity => "camera_suspicious_activity",
            SignalKind::AIContentHighLikelihood => "ai_content_high_likelihood",
            SignalKind::AIContentModerateLikelihood => "ai_content_moderate_likelihood",
            SignalKind::AIContentLowLikelihood => "ai_content_low_likelihood",
            SignalKind::ConnectionLost => "connection_lost",
        }
    }

    /// Parse a wire name. Accepts the snake_case wire form and the
    /// PascalCase variant name.
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == t || format!("{k:?}") == t)
    }

    pub fn severity(&self) -> Severity {
        match self {
            SignalKind::RestrictedKeyCombo
            | SignalKind::ContextMenu
            | SignalKind::AIContentLowLikelihood => Severity::Low,
            SignalKind::TabHidden
            | SignalKind::GazeAway
            | SignalKind::CameraSuspiciousActivity
            | SignalKind::AIContentModerateLikelihood
            | SignalKind::ConnectionLost => Severity::Medium,
            SignalKind::FullscreenExit
            | SignalKind::NoFaceDetected
            | SignalKind::MultipleFacesDetected
            | SignalKind::AIContentHighLikelihood => Severity::High,
        }
    }

    /// Score delta applied once per accepted signal (always <= 0).
    pub fn score_delta(&self) -> i32 {
        match self {
            SignalKind::TabHidden => -5,
            SignalKind::FullscreenExit => -10,
            SignalKind::RestrictedKeyCombo => -2,
            SignalKind::ContextMenu => -1,
            SignalKind::NoFaceDetected => -10,
            SignalKind::MultipleFacesDetected => -10,
            SignalKind::GazeAway => -5,
            SignalKind::CameraSuspiciousActivity => -10,
            SignalKind::AIContentHighLikelihood => -15,
            SignalKind::AIContentModerateLikelihood => -8,
            SignalKind::AIContentLowLikelihood => -3,
            SignalKind::ConnectionLost => -5,
        }
    }

    pub fn is_ai_content(&self) -> bool {
        matches!(
            self,
            SignalKind::AIContentHighLikelihood
                | SignalKind::AIContentModerateLikelihood
                | SignalKind::AIContentLowLikelihood
        )
    }

    /// AI-content results arrive already debounced by the classifier, so the
    /// engine never rate-limits them.
    pub fn is_rate_limited(&self) -> bool {
        !self.is_ai_content()
    }

    /// Kinds whose producer attaches the camera sample that drove them.
    pub fn carries_camera_sample(&self) -> bool {
        matches!(
            self,
            SignalKind::GazeAway | SignalKind::NoFaceDetected | SignalKind::MultipleFacesDetected
        )
    }

    /// Violation text used when the producer sends no detail.
    pub fn default_detail(&self) -> &'static str {
        match self {
            SignalKind::TabHidden => "Tab switching detected",
            SignalKind::FullscreenExit => "Exited fullscreen mode",
            SignalKind::RestrictedKeyCombo => "Attempted restricted action",
            SignalKind::ContextMenu => "Right-click attempted",
            SignalKind::NoFaceDetected => "No face detected in camera",
            SignalKind::MultipleFacesDetected => "Multiple faces detected",
            SignalKind::GazeAway => "Student looking away from screen",
            SignalKind::CameraSuspiciousActivity => "Suspicious activity detected on camera",
            SignalKind::AIContentHighLikelihood => "High AI likelihood detected",
            SignalKind::AIContentModerateLikelihood => "Moderate AI likelihood detected",
            SignalKind::AIContentLowLikelihood => "Low AI likelihood detected",
            SignalKind::ConnectionLost => "Connection to proctoring server lost",
        }
    }
}

// ---------------------------------------------------------------------------
// AI likelihood bands
// ---------------------------------------------------------------------------

/// Banding of a classifier's AI-likelihood percentage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiBand {
    High,
    Moderate,
    Low,
    Minimal,
}

impl AiBand {
    /// `>= 80` high, `>= 60` moderate, `>= 40` low, otherwise minimal.
    pub fn from_likelihood(pct: f64) -> Self {
        if pct >= 80.0 {
            AiBand::High
        } else if pct >= 60.0 {
            AiBand::Moderate
        } else if pct >= 40.0 {
            AiBand::Low
        } else {
            AiBand::Minimal
        }
    }

    /// Signal kind for this band; `Minimal` produces no signal.
    pub fn signal_kind(&self) -> Option<SignalKind> {
        match self {
            AiBand::High => Some(SignalKind::AIContentHighLikelihood),
            AiBand::Moderate => Some(SignalKind::AIContentModerateLikelihood),
            AiBand::Low => Some(SignalKind::AIContentLowLikelihood),
            AiBand::Minimal => None,
        }
    }
}

/// Output contract of an AI-content classifier for one answer.
///
/// Missing numeric fields decode as zero so a partial or degraded classifier
/// response scores as "no AI content".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiDetection {
    #[serde(default)]
    pub ai_likelihood: f64,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl AiDetection {
    /// Neutral result used when the classifier is unavailable.
    pub fn neutral() -> Self {
        Self {
            explanation: "AI detection unavailable".to_string(),
            ..Self::default()
        }
    }

    pub fn band(&self) -> AiBand {
        AiBand::from_likelihood(self.ai_likelihood)
    }

    /// Signal for this result, if its likelihood reaches the low band.
    pub fn to_signal(&self, ts_millis: i64) -> Option<Signal> {
        Signal::ai_content(self.ai_likelihood.clamp(0.0, 100.0), ts_millis)
    }
}

// ---------------------------------------------------------------------------
// Camera sample
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gaze {
    Center,
    Left,
    Right,
    Up,
    Down,
    Away,
}

/// One analysed camera frame, as delivered by an external vision component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSample {
    pub face_count: u32,
    pub gaze: Gaze,
    #[serde(default)]
    pub suspicious_activity: Vec<String>,
}

impl CameraSample {
    /// Signals a producer should emit for this frame, in emission order:
    /// face condition, then gaze, then one per suspicious-activity flag.
    pub fn violation_signals(&self, ts_millis: i64) -> Vec<Signal> {
        let mut out = Vec::new();

        if self.face_count == 0 {
            out.push(Signal::new(SignalKind::NoFaceDetected, ts_millis).with_camera(self.clone()));
        } else if self.face_count > 1 {
            out.push(
                Signal::new(SignalKind::MultipleFacesDetected, ts_millis)
                    .with_camera(self.clone()),
            );
        }

        if self.gaze == Gaze::Away {
            out.push(Signal::new(SignalKind::GazeAway, ts_millis).with_camera(self.clone()));
        }

        for activity in &self.suspicious_activity {
            out.push(
                Signal::new(SignalKind::CameraSuspiciousActivity, ts_millis)
                    .with_detail(activity.clone()),
            );
        }

        out
    }
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalOrigin {
    Trusted,
    Untrusted,
}

/// Replace the table delta for one signal (operator tooling only).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaOverride {
    pub delta: i32,
    pub origin: SignalOrigin,
}

/// A validated, timestamped detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    /// Detection instant in epoch milliseconds (producer clock).
    pub ts_millis: i64,
    pub detail: String,
    /// Classifier percentage this AI-content signal was banded from.
    pub ai_likelihood: Option<f64>,
    /// Camera frame that produced a face/gaze signal.
    pub camera: Option<CameraSample>,
    pub delta_override: Option<DeltaOverride>,
}

impl Signal {
    pub fn new(kind: SignalKind, ts_millis: i64) -> Self {
        Self {
            kind,
            ts_millis,
            detail: kind.default_detail().to_string(),
            ai_likelihood: None,
            camera: None,
            delta_override: None,
        }
    }

    /// Band an AI-likelihood percentage into the matching signal.
    /// Returns `None` below the low band (nothing to report).
    pub fn ai_content(likelihood: f64, ts_millis: i64) -> Option<Self> {
        let kind = AiBand::from_likelihood(likelihood).signal_kind()?;
        let mut s = Self::new(kind, ts_millis);
        s.detail = format!("{} ({}%)", kind.default_detail(), likelihood.round() as i64);
        s.ai_likelihood = Some(likelihood);
        Some(s)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_camera(mut self, sample: CameraSample) -> Self {
        self.camera = Some(sample);
        self
    }

    pub fn with_override(mut self, delta: i32, origin: SignalOrigin) -> Self {
        self.delta_override = Some(DeltaOverride { delta, origin });
        self
    }

    /// Effective delta after validating any override.
    pub(crate) fn effective_delta(&self) -> Result<i32, InvalidSignalReason> {
        match self.delta_override {
            None => Ok(self.kind.score_delta()),
            Some(DeltaOverride {
                origin: SignalOrigin::Untrusted,
                ..
            }) => Err(InvalidSignalReason::UntrustedDeltaOverride),
            Some(DeltaOverride { delta, .. }) if delta > 0 => {
                Err(InvalidSignalReason::PositiveDeltaOverride(delta))
            }
            Some(DeltaOverride { delta, .. }) => Ok(delta),
        }
    }

    /// AI-content kinds must agree with the likelihood they were banded from.
    pub(crate) fn check_ai_band(&self) -> Result<(), InvalidSignalReason> {
        if !self.kind.is_ai_content() {
            return Ok(());
        }
        let pct = self
            .ai_likelihood
            .ok_or(InvalidSignalReason::MissingAiLikelihood)?;
        if !(0.0..=100.0).contains(&pct) {
            return Err(InvalidSignalReason::LikelihoodOutOfRange(pct));
        }
        if AiBand::from_likelihood(pct).signal_kind() != Some(self.kind) {
            return Err(InvalidSignalReason::AiBandMismatch {
                kind: self.kind,
                likelihood: pct,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// Untyped form of a signal as received from a producer (HTTP body, JSONL
/// replay line). `kind` may also be `"ai_content"`, in which case the band is
/// chosen from `ai_likelihood`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub kind: String,
    pub ts_millis: i64,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub ai_likelihood: Option<f64>,
    #[serde(default)]
    pub camera: Option<CameraSample>,
    #[serde(default)]
    pub score_delta: Option<i32>,
    #[serde(default)]
    pub trusted: bool,
}

impl SignalEnvelope {
    /// Validate into a [`Signal`].
    ///
    /// `Ok(None)` means the envelope was well formed but reports nothing
    /// (an `"ai_content"` likelihood in the minimal band).
    pub fn into_signal(self) -> Result<Option<Signal>, IntegrityError> {
        let mut signal = if self.kind.trim() == "ai_content" {
            let pct = self
                .ai_likelihood
                .ok_or(InvalidSignalReason::MissingAiLikelihood)?;
            if !(0.0..=100.0).contains(&pct) {
                return Err(InvalidSignalReason::LikelihoodOutOfRange(pct).into());
            }
            match Signal::ai_content(pct, self.ts_millis) {
                Some(s) => s,
                None => return Ok(None),
            }
        } else {
            let kind = SignalKind::parse(&self.kind)
                .ok_or_else(|| InvalidSignalReason::UnknownKind(self.kind.clone()))?;
            let mut s = Signal::new(kind, self.ts_millis);
            s.ai_likelihood = self.ai_likelihood;
            s
        };

        if let Some(detail) = self.detail.filter(|d| !d.trim().is_empty()) {
            signal.detail = detail;
        }
        signal.camera = self.camera;
        if let Some(delta) = self.score_delta {
            let origin = if self.trusted {
                SignalOrigin::Trusted
            } else {
                SignalOrigin::Untrusted
            };
            signal.delta_override = Some(DeltaOverride { delta, origin });
        }

        signal.effective_delta()?;
        signal.check_ai_band()?;
        Ok(Some(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_delta_is_non_positive() {
        for k in SignalKind::ALL {
            assert!(k.score_delta() <= 0, "{k:?}");
        }
    }

    #[test]
    fn wire_names_round_trip_through_parse() {
        for k in SignalKind::ALL {
            assert_eq!(SignalKind::parse(k.as_str()), Some(k));
            assert_eq!(SignalKind::parse(&format!("{k:?}")), Some(k));
        }
        assert_eq!(SignalKind::parse("printer_on_fire"), None);
    }

    #[test]
    fn ai_bands_follow_thresholds() {
        assert_eq!(AiBand::from_likelihood(80.0), AiBand::High);
        assert_eq!(AiBand::from_likelihood(79.9), AiBand::Moderate);
        assert_eq!(AiBand::from_likelihood(60.0), AiBand::Moderate);
        assert_eq!(AiBand::from_likelihood(40.0), AiBand::Low);
        assert_eq!(AiBand::from_likelihood(39.0), AiBand::Minimal);
        assert!(Signal::ai_content(12.0, 0).is_none());
    }

    #[test]
    fn camera_sample_emits_face_then_gaze_then_activity() {
        let sample = CameraSample {
            face_count: 0,
            gaze: Gaze::Away,
            suspicious_activity: vec!["Object detected near face".into()],
        };
        let kinds: Vec<_> = sample
            .violation_signals(5)
            .into_iter()
            .map(|s| s.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                SignalKind::NoFaceDetected,
                SignalKind::GazeAway,
                SignalKind::CameraSuspiciousActivity
            ]
        );
    }

    #[test]
    fn envelope_rejects_unknown_kind() {
        let env = SignalEnvelope {
            kind: "screen_share".into(),
            ts_millis: 1,
            detail: None,
            ai_likelihood: None,
            camera: None,
            score_delta: None,
            trusted: false,
        };
        assert_eq!(
            env.into_signal(),
            Err(IntegrityError::InvalidSignal(
                InvalidSignalReason::UnknownKind("screen_share".into())
            ))
        );
    }

    #[test]
    fn envelope_ai_content_bands_and_skips_minimal() {
        let mut env: SignalEnvelope =
            serde_json::from_str(r#"{"kind":"ai_content","ts_millis":10,"ai_likelihood":65}"#)
                .unwrap();
        let s = env.clone().into_signal().unwrap().unwrap();
        assert_eq!(s.kind, SignalKind::AIContentModerateLikelihood);
        assert_eq!(s.detail, "Moderate AI likelihood detected (65%)");

        env.ai_likelihood = Some(10.0);
        assert_eq!(env.into_signal(), Ok(None));
    }
}
