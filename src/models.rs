use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const IMAGE_MODELS: &[&str] = &["Qwen/Qwen-Image", "Tongyi-MAI/Z-Image-Turbo"];

pub const CHAT_MODELS: &[&str] = &[
    "deepseek-ai/DeepSeek-V3.2",
    "Qwen/Qwen3-235B-A22B-Instruct-2507",
];

pub const DEFAULT_RESOLUTION: &str = "1024x1024 (1:1)";

/// Resolution presets shown in the picker, grouped by quality tier.
pub const RESOLUTION_GROUPS: &[(&str, &[&str])] = &[
    (
        "Standard (SD)",
        &[
            "512x512 (1:1)",
            "768x1024 (3:4)",
            "640x480 (4:3)",
            "640x360 (16:9)",
            "360x640 (9:16)",
            "720x480 (3:2)",
            "480x720 (2:3)",
            "840x360 (21:9)",
        ],
    ),
    (
        "High Definition (HD)",
        &[
            "1024x1024 (1:1)",
            "1152x1536 (3:4)",
            "1280x960 (4:3)",
            "1600x900 (16:9)",
            "900x1600 (9:16)",
            "1536x1024 (3:2)",
            "1024x1536 (2:3)",
            "1680x720 (21:9)",
        ],
    ),
    (
        "Ultra HD (2K/4K)",
        &[
            "2048x2048 (1:1)",
            "1536x2048 (3:4)",
            "2048x1536 (4:3)",
            "2048x1152 (16:9)",
            "1152x2048 (9:16)",
            "2048x1365 (3:2)",
            "1365x2048 (2:3)",
            "2048x876 (21:9)",
        ],
    ),
];

/// Flat list of every resolution label, in picker order.
pub fn resolution_labels() -> impl Iterator<Item = &'static str> {
    RESOLUTION_GROUPS
        .iter()
        .flat_map(|(_, labels)| labels.iter().copied())
}

/// Extract the `WxH` size from a resolution label.
///
/// The size is the first whitespace-separated token, with `*` accepted as the
/// separator. Returns `None` for group headers or anything that isn't two
/// positive integers.
pub fn resolution_size(label: &str) -> Option<String> {
    let token = label.split_whitespace().next()?.replace('*', "x");
    let (w, h) = token.split_once('x')?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some(format!("{w}x{h}"))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    #[default]
    Image,
    Chat,
}

impl ModelCategory {
    pub const fn models(self) -> &'static [&'static str] {
        match self {
            Self::Image => IMAGE_MODELS,
            Self::Chat => CHAT_MODELS,
        }
    }

    pub const fn toggled(self) -> Self {
        match self {
            Self::Image => Self::Chat,
            Self::Chat => Self::Image,
        }
    }
}

/// The single persisted record of user choices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub model_category: ModelCategory,
    pub resolution: String,
    pub prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: IMAGE_MODELS[0].to_string(),
            model_category: ModelCategory::Image,
            resolution: DEFAULT_RESOLUTION.to_string(),
            prompt: String::new(),
        }
    }
}

impl Settings {
    /// Switch between image and chat mode, picking the first model of the new
    /// category.
    pub fn toggle_category(&mut self) {
        self.model_category = self.model_category.toggled();
        self.model = self.model_category.models()[0].to_string();
    }

    pub fn cycle_model(&mut self) {
        self.model = next_in(self.model_category.models(), &self.model).to_string();
    }

    pub fn cycle_resolution(&mut self) {
        let labels: Vec<&str> = resolution_labels().collect();
        self.resolution = next_in(&labels, &self.resolution).to_string();
    }
}

/// Item after `current` in `items`, wrapping around; the first item when
/// `current` is not in the list.
fn next_in<'a>(items: &[&'a str], current: &str) -> &'a str {
    items
        .iter()
        .position(|item| *item == current)
        .map_or(items[0], |pos| items[(pos + 1) % items.len()])
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Sidecar record written next to every generated image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub filename: String,
    pub file_path: String,
    pub prompt: String,
    pub model: String,
    pub resolution: String,
    pub timestamp: String,
}

/// What the caller knows about an image before it has a place on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDetails {
    pub prompt: String,
    pub model: String,
    pub resolution: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub metadata: ArtifactMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Image,
    Chat,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("Image"),
            Self::Chat => f.write_str("Chat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    pub api_key: String,
    pub model: String,
    pub prompt: String,
    /// Normalized `WxH` size.
    pub resolution: String,
}

impl ImageJob {
    pub fn details(&self) -> ArtifactDetails {
        ArtifactDetails {
            prompt: self.prompt.clone(),
            model: self.model.clone(),
            resolution: self.resolution.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatJob {
    pub api_key: String,
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub streaming: bool,
}

/// Runtime knobs read from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: u64,
    #[serde(default = "default_stream_chat")]
    pub stream_chat: bool,
    #[serde(default = "default_max_tokens")]
    pub chat_max_tokens: Option<u32>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Overrides the platform data directory for generated images.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

const fn default_timeout() -> u64 {
    600
}

const fn default_poll_interval() -> u64 {
    2
}

const fn default_poll_timeout() -> u64 {
    600
}

const fn default_stream_chat() -> bool {
    true
}

#[allow(clippy::unnecessary_wraps)]
const fn default_max_tokens() -> Option<u32> {
    Some(1024)
}

fn default_system_prompt() -> String {
    "Keep answers short and to the point. You are J.A.R.V.I.S., Iron Man's assistant."
        .to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-inference.modelscope.cn/v1".to_string(),
            request_timeout: default_timeout(),
            poll_interval: default_poll_interval(),
            poll_timeout: default_poll_timeout(),
            stream_chat: default_stream_chat(),
            chat_max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
            output_dir: None,
        }
    }
}
