//! ResultExtractor - 成功レスポンスから `Artifact` を取り出す純粋関数
//!
//! kind ごとに候補フィールドの順序付きリストを持ち、最初に空でない値が見つかった候補で止まる。
//! 候補は JSON Pointer で書く（`serde_json::Value::pointer`）。

use serde_json::Value;

use super::envelope::non_empty_str;
use crate::domain::{Artifact, ArtifactType, TaskKind};

/// One place an artifact URL may live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// A single URL at a JSON pointer.
    At(&'static str, ArtifactType),

    /// Every element of the array at `array`, reading `item` relative to the
    /// element (`""` is the element itself).
    Each {
        array: &'static str,
        item: &'static str,
        artifact: ArtifactType,
    },
}

/// Extraction rules for one `TaskKind`.
#[derive(Debug)]
pub struct KindRules {
    pub candidates: &'static [Candidate],

    /// Cover image pointers, first non-empty wins.
    pub cover: &'static [&'static str],

    /// `(meta key, pointers)`; first non-null value per key is copied into `Artifact::meta`.
    pub meta: &'static [(&'static str, &'static [&'static str])],
}

use ArtifactType::{Archive, Audio, Image, Model3d, Video};
use Candidate::{At, Each};

static VIDEO: KindRules = KindRules {
    candidates: &[
        At("/videoUrl", Video),
        At("/video_url", Video),
        At("/content/video_url", Video),
        At("/videos/0/originVideo/filePath", Video),
        At("/videos/0/url", Video),
    ],
    cover: &["/coverUrl", "/cover_url", "/content/cover_url", "/videos/0/coverUrl"],
    meta: &[("duration", &["/duration", "/content/duration"])],
};

static IMAGE: KindRules = KindRules {
    candidates: &[
        Each { array: "/data", item: "/url", artifact: Image },
        Each { array: "/data", item: "/image_urls/0", artifact: Image },
        Each { array: "/image_urls", item: "", artifact: Image },
        At("/imageUrl", Image),
        At("/image_url", Image),
    ],
    cover: &[],
    meta: &[],
};

static STYLE_TRANSFER: KindRules = KindRules {
    candidates: &[
        At("/imageUrl", Image),
        At("/image_url", Image),
        At("/content/image_url", Image),
        Each { array: "/data", item: "/url", artifact: Image },
    ],
    cover: &[],
    meta: &[("style", &["/style"])],
};

static TEXT_TO_SPEECH: KindRules = KindRules {
    candidates: &[
        At("/audioUrl", Audio),
        At("/audio_url", Audio),
        At("/content/audio_url", Audio),
        At("/data/audio", Audio),
    ],
    cover: &[],
    meta: &[("duration", &["/duration", "/content/duration"])],
};

static VOICE_CLONE: KindRules = KindRules {
    candidates: &[
        At("/demoAudioUrl", Audio),
        At("/demo_audio_url", Audio),
        At("/audioUrl", Audio),
        At("/audio_url", Audio),
        At("/content/audio_url", Audio),
    ],
    cover: &[],
    meta: &[("voice_id", &["/voiceId", "/voice_id"])],
};

static CUSTOM_AVATAR: KindRules = KindRules {
    candidates: &[
        At("/content/fileUrl", Archive),
        At("/fileUrl", Archive),
        At("/file_url", Archive),
        At("/videoUrl", Video),
        At("/video_url", Video),
    ],
    cover: &["/coverUrl", "/cover_url", "/content/cover_url"],
    meta: &[],
};

static MODEL_3D: KindRules = KindRules {
    candidates: &[
        At("/modelUrl", Model3d),
        At("/model_url", Model3d),
        At("/content/model_url", Model3d),
        At("/content/fileUrl", Archive),
        At("/fileUrl", Archive),
    ],
    cover: &["/previewUrl", "/preview_url", "/content/preview_url"],
    meta: &[("format", &["/format", "/content/format"])],
};

pub fn rules(kind: TaskKind) -> &'static KindRules {
    match kind {
        TaskKind::Image => &IMAGE,
        TaskKind::Video => &VIDEO,
        TaskKind::StyleTransfer => &STYLE_TRANSFER,
        TaskKind::TextToSpeech => &TEXT_TO_SPEECH,
        TaskKind::VoiceClone => &VOICE_CLONE,
        TaskKind::CustomAvatar => &CUSTOM_AVATAR,
        TaskKind::Model3D => &MODEL_3D,
    }
}

/// Artifacts from the first candidate that yields at least one non-empty URL.
pub fn extract(kind: TaskKind, payload: &Value) -> Vec<Artifact> {
    let rules = rules(kind);
    let artifacts = rules
        .candidates
        .iter()
        .map(|c| resolve(c, payload))
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    decorate(rules, payload, artifacts)
}

/// `extract` on the unwrapped payload, then on the full response.
///
/// Some backends put the status inside `data` but the URL next to it.
pub fn extract_with_fallback(kind: TaskKind, payload: &Value, raw_response: &Value) -> Vec<Artifact> {
    let artifacts = extract(kind, payload);
    if artifacts.is_empty() && payload != raw_response {
        return extract(kind, raw_response);
    }
    artifacts
}

fn resolve(candidate: &Candidate, payload: &Value) -> Vec<Artifact> {
    match *candidate {
        At(ptr, artifact) => payload
            .pointer(ptr)
            .and_then(non_empty_str)
            .map(|url| vec![Artifact::new(artifact, url)])
            .unwrap_or_default(),
        Each {
            array,
            item,
            artifact,
        } => payload
            .pointer(array)
            .and_then(Value::as_array)
            .map(|elements| {
                elements
                    .iter()
                    .filter_map(|el| el.pointer(item))
                    .filter_map(non_empty_str)
                    .map(|url| Artifact::new(artifact, url))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn decorate(rules: &KindRules, payload: &Value, mut artifacts: Vec<Artifact>) -> Vec<Artifact> {
    if artifacts.is_empty() {
        return artifacts;
    }

    let cover = rules
        .cover
        .iter()
        .filter_map(|ptr| payload.pointer(ptr))
        .find_map(non_empty_str);

    let meta: Vec<(&str, &Value)> = rules
        .meta
        .iter()
        .filter_map(|(key, ptrs)| {
            ptrs.iter()
                .filter_map(|ptr| payload.pointer(ptr))
                .find(|v| !v.is_null())
                .map(|v| (*key, v))
        })
        .collect();

    for artifact in &mut artifacts {
        if let Some(cover) = cover {
            artifact.cover_url = Some(cover.to_string());
        }
        if !meta.is_empty() {
            let map = artifact.meta.get_or_insert_with(serde_json::Map::new);
            for (key, value) in &meta {
                map.insert((*key).to_string(), (*value).clone());
            }
        }
    }
    artifacts
}
