use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The closed set of content types a submission can carry. Wire tags are the
/// lowercase variant names; audio submissions use the `music` tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Website,
    Text,
    Email,
    Phone,
    Sms,
    Vcard,
    Wifi,
    Location,
    Pdf,
    Image,
    Video,
    Music,
}

impl ContentKind {
    pub const ALL: [ContentKind; 12] = [
        ContentKind::Website,
        ContentKind::Text,
        ContentKind::Email,
        ContentKind::Phone,
        ContentKind::Sms,
        ContentKind::Vcard,
        ContentKind::Wifi,
        ContentKind::Location,
        ContentKind::Pdf,
        ContentKind::Image,
        ContentKind::Video,
        ContentKind::Music,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Website => "website",
            ContentKind::Text => "text",
            ContentKind::Email => "email",
            ContentKind::Phone => "phone",
            ContentKind::Sms => "sms",
            ContentKind::Vcard => "vcard",
            ContentKind::Wifi => "wifi",
            ContentKind::Location => "location",
            ContentKind::Pdf => "pdf",
            ContentKind::Image => "image",
            ContentKind::Video => "video",
            ContentKind::Music => "music",
        }
    }

    pub fn parse(tag: &str) -> Option<ContentKind> {
        Self::ALL.iter().copied().find(|k| k.as_str() == tag)
    }
}

/// WiFi security mode for the `WIFI:` payload. `nopass` means an open
/// network; the `T:` segment carries these tags verbatim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WifiSecurity {
    Wpa,
    Wep,
    NoPass,
}

impl WifiSecurity {
    pub fn as_str(&self) -> &'static str {
        match self {
            WifiSecurity::Wpa => "WPA",
            WifiSecurity::Wep => "WEP",
            WifiSecurity::NoPass => "nopass",
        }
    }

    pub fn parse(tag: &str) -> Option<WifiSecurity> {
        match tag {
            "WPA" => Some(WifiSecurity::Wpa),
            "WEP" => Some(WifiSecurity::Wep),
            "nopass" => Some(WifiSecurity::NoPass),
            _ => None,
        }
    }
}

/// Cosmetic frame drawn around the rendered code. Never affects the payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FrameStyle {
    ScanMe,
    Border,
    Card,
}

impl FrameStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameStyle::ScanMe => "scan-me",
            FrameStyle::Border => "border",
            FrameStyle::Card => "card",
        }
    }

    pub fn parse(tag: &str) -> Option<FrameStyle> {
        match tag {
            "scan-me" => Some(FrameStyle::ScanMe),
            "border" => Some(FrameStyle::Border),
            "card" => Some(FrameStyle::Card),
            _ => None,
        }
    }
}

/// Module shape of the rendered code. Cosmetic only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ShapeStyle {
    Square,
    Rounded,
    Circle,
}

impl ShapeStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeStyle::Square => "square",
            ShapeStyle::Rounded => "rounded",
            ShapeStyle::Circle => "circle",
        }
    }

    pub fn parse(tag: &str) -> Option<ShapeStyle> {
        match tag {
            "square" => Some(ShapeStyle::Square),
            "rounded" => Some(ShapeStyle::Rounded),
            "circle" => Some(ShapeStyle::Circle),
            _ => None,
        }
    }
}

/// Presentation options shared by every content kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StylingOptions {
    /// `#RRGGBB` foreground color; the leading `#` is stripped before it
    /// reaches the render API.
    pub color: String,
    /// Edge length in pixels, 50–1000.
    pub size: u32,
    pub frame: Option<FrameStyle>,
    pub shape: Option<ShapeStyle>,
    pub logo_url: Option<String>,
}

impl Default for StylingOptions {
    fn default() -> Self {
        StylingOptions {
            color: "#000000".to_string(),
            size: 250,
            frame: None,
            shape: None,
            logo_url: None,
        }
    }
}

/// Metadata for a file already handed to the external upload service.
/// Only the reference travels through the resolver; bytes never do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub url: String,
}

/// One form submission: a flat field-name → raw-string map plus an optional
/// uploaded-file reference. Built per request and discarded after resolution.
#[derive(Debug, Clone, Default)]
pub struct RawSubmission {
    fields: HashMap<String, String>,
    file: Option<UploadedFile>,
}

impl RawSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(fields: HashMap<String, String>, file: Option<UploadedFile>) -> Self {
        RawSubmission { fields, file }
    }

    pub fn set(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.file = Some(file);
        self
    }

    /// Raw value of a field, if the submission carried it at all.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Field value treated as absent when missing or empty, which is how
    /// optional form inputs arrive.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.field(name).filter(|v| !v.is_empty())
    }

    pub fn file(&self) -> Option<&UploadedFile> {
        self.file.as_ref()
    }
}

/// A validated submission: the exact text to encode plus what to show the
/// user. The payload is never empty on success; immutable once produced.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedContent {
    pub kind: ContentKind,
    pub payload: String,
    pub display_text: String,
    pub styling: StylingOptions,
}
