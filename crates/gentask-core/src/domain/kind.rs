//! TaskKind - 生成タスクの種類
//!
//! kind ごとに「必須フィールド」「status の読み方」「artifact の取り出し方」が変わる。
//! テーブル本体は `app::envelope` / `app::extractor` 側にあり、ここは識別子だけ。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::UnknownKind;

/// The kind of generation job a creation screen submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Image,
    Video,
    StyleTransfer,
    TextToSpeech,
    VoiceClone,
    CustomAvatar,
    #[serde(rename = "model3d")]
    Model3D,
}

impl TaskKind {
    pub const ALL: [TaskKind; 7] = [
        TaskKind::Image,
        TaskKind::Video,
        TaskKind::StyleTransfer,
        TaskKind::TextToSpeech,
        TaskKind::VoiceClone,
        TaskKind::CustomAvatar,
        TaskKind::Model3D,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Image => "image",
            TaskKind::Video => "video",
            TaskKind::StyleTransfer => "style_transfer",
            TaskKind::TextToSpeech => "text_to_speech",
            TaskKind::VoiceClone => "voice_clone",
            TaskKind::CustomAvatar => "custom_avatar",
            TaskKind::Model3D => "model3d",
        }
    }

    /// Payload fields that must be present and non-empty before submission.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            TaskKind::Image => &["prompt"],
            TaskKind::Video => &["image", "prompt"],
            TaskKind::StyleTransfer => &["image", "style"],
            TaskKind::TextToSpeech => &["text", "voice"],
            TaskKind::VoiceClone => &["audio"],
            TaskKind::CustomAvatar => &["image"],
            TaskKind::Model3D => &["image"],
        }
    }

    /// Name used in environment variable keys (`GENTASK_<KIND>_...`).
    pub fn env_key(self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("video", TaskKind::Video)]
    #[case::upper("IMAGE", TaskKind::Image)]
    #[case::dashed("text-to-speech", TaskKind::TextToSpeech)]
    #[case::model("model3d", TaskKind::Model3D)]
    fn parses_kind_names(#[case] input: &str, #[case] expected: TaskKind) {
        assert_eq!(input.parse::<TaskKind>().unwrap(), expected);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "hologram".parse::<TaskKind>().unwrap_err();
        assert!(err.to_string().contains("hologram"));
    }

    #[test]
    fn serde_name_matches_display() {
        for kind in TaskKind::ALL {
            let s = serde_json::to_string(&kind).unwrap();
            assert_eq!(s, format!("\"{kind}\""));
        }
    }

    #[test]
    fn every_kind_requires_something() {
        for kind in TaskKind::ALL {
            assert!(!kind.required_fields().is_empty(), "{kind}");
        }
    }
}
