//! The Content Resolver: a pure validate-and-format step from a raw form
//! submission to the canonical text a QR code should encode.
//!
//! `resolve` performs no I/O and holds no state; callers sequence session
//! lookup, rendering, and persistence around it. Validation failures come
//! back field-keyed so the UI can attach messages to inputs; an unknown
//! kind tag is a distinct, non-recoverable error since the tag set is
//! closed and the UI only ever submits known tags.

use crate::model::{
    ContentKind, FrameStyle, RawSubmission, ResolvedContent, ShapeStyle, StylingOptions,
    WifiSecurity,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use url::{form_urlencoded, Url};

static COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("color regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

/// Field-keyed validation messages. Ordered by field name so error output
/// is deterministic.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn into_map(self) -> BTreeMap<String, Vec<String>> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The kind tag is not one of the known enumeration values. This is a
    /// caller bug, not user input to correct.
    #[error("unsupported content kind: {0}")]
    UnsupportedKind(String),
    #[error("invalid submission: {0}")]
    Invalid(ValidationErrors),
}

/// Resolve a submission against the rules for `kind_tag`.
///
/// Succeeds only when every required field for the kind passes its rule and
/// the shared styling fields are valid; on success the payload is never
/// empty. Deterministic and side-effect-free: identical input yields
/// identical output.
pub fn resolve(kind_tag: &str, raw: &RawSubmission) -> Result<ResolvedContent, ResolveError> {
    let kind = ContentKind::parse(kind_tag)
        .ok_or_else(|| ResolveError::UnsupportedKind(kind_tag.to_string()))?;
    resolve_kind(kind, raw)
}

/// Typed entry point; dispatch is an exhaustive match so adding a kind
/// without rules is a compile error.
pub fn resolve_kind(kind: ContentKind, raw: &RawSubmission) -> Result<ResolvedContent, ResolveError> {
    let mut errors = ValidationErrors::default();
    let styling = validate_styling(raw, &mut errors);

    let formatted = match kind {
        ContentKind::Website => website(raw, &mut errors),
        ContentKind::Text => text(raw, &mut errors),
        ContentKind::Email => email(raw, &mut errors),
        ContentKind::Phone => phone(raw, &mut errors),
        ContentKind::Sms => sms(raw, &mut errors),
        ContentKind::Vcard => vcard(raw, &mut errors),
        ContentKind::Wifi => wifi(raw, &mut errors),
        ContentKind::Location => location(raw, &mut errors),
        ContentKind::Pdf => media(raw, &mut errors, "pdfUrl", "PDF File", "PDF Document"),
        ContentKind::Image => media(raw, &mut errors, "imageUrl", "Image File", "Image"),
        ContentKind::Video => media(raw, &mut errors, "videoUrl", "Video File", "Video"),
        ContentKind::Music => media(raw, &mut errors, "musicUrl", "Music File", "Music"),
    };

    match formatted {
        Some((payload, display_text)) if errors.is_empty() => Ok(ResolvedContent {
            kind,
            payload,
            display_text,
            styling,
        }),
        _ => Err(ResolveError::Invalid(errors)),
    }
}

/// Validate the styling fields shared by all kinds, falling back to the
/// defaults for absent inputs. Invalid values record a field error; the
/// returned struct is only meaningful when no error was recorded.
fn validate_styling(raw: &RawSubmission, errors: &mut ValidationErrors) -> StylingOptions {
    let mut styling = StylingOptions::default();

    if let Some(color) = raw.non_empty("color") {
        if COLOR_RE.is_match(color) {
            styling.color = color.to_string();
        } else {
            errors.add("color", "Invalid color format.");
        }
    }

    if let Some(size) = raw.non_empty("size") {
        match size.parse::<u32>() {
            Ok(px) if (50..=1000).contains(&px) => styling.size = px,
            _ => errors.add("size", "Size must be an integer between 50 and 1000."),
        }
    }

    if let Some(frame) = raw.non_empty("frame") {
        match FrameStyle::parse(frame) {
            Some(style) => styling.frame = Some(style),
            None => errors.add("frame", "Unknown frame style."),
        }
    }

    if let Some(shape) = raw.non_empty("shape") {
        match ShapeStyle::parse(shape) {
            Some(style) => styling.shape = Some(style),
            None => errors.add("shape", "Shape must be square, rounded, or circle."),
        }
    }

    if let Some(logo) = raw.non_empty("logoUrl") {
        if is_absolute_url(logo) {
            styling.logo_url = Some(logo.to_string());
        } else {
            errors.add("logoUrl", "Invalid logo URL.");
        }
    }

    styling
}

fn is_absolute_url(value: &str) -> bool {
    Url::parse(value).is_ok()
}

pub(crate) fn is_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

fn required<'a>(
    raw: &'a RawSubmission,
    field: &str,
    message: &str,
    errors: &mut ValidationErrors,
) -> Option<&'a str> {
    match raw.non_empty(field) {
        Some(value) => Some(value),
        None => {
            errors.add(field, message);
            None
        }
    }
}

fn website(raw: &RawSubmission, errors: &mut ValidationErrors) -> Option<(String, String)> {
    let url = required(raw, "text", "Please enter a valid URL.", errors)?;
    if !is_absolute_url(url) {
        errors.add("text", "Please enter a valid URL.");
        return None;
    }
    Some((url.to_string(), url.to_string()))
}

fn text(raw: &RawSubmission, errors: &mut ValidationErrors) -> Option<(String, String)> {
    let content = required(raw, "text", "Text cannot be empty.", errors)?;
    Some((content.to_string(), content.to_string()))
}

fn email(raw: &RawSubmission, errors: &mut ValidationErrors) -> Option<(String, String)> {
    let to = required(raw, "to", "Invalid email address.", errors)?;
    if !is_email(to) {
        errors.add("to", "Invalid email address.");
        return None;
    }
    // mailto always carries the `?`, even with no parameters.
    let mut query = form_urlencoded::Serializer::new(String::new());
    if let Some(subject) = raw.non_empty("subject") {
        query.append_pair("subject", subject);
    }
    if let Some(body) = raw.non_empty("body") {
        query.append_pair("body", body);
    }
    Some((format!("mailto:{}?{}", to, query.finish()), to.to_string()))
}

fn phone(raw: &RawSubmission, errors: &mut ValidationErrors) -> Option<(String, String)> {
    let number = required(raw, "phone", "Phone number cannot be empty.", errors)?;
    Some((format!("tel:{}", number), number.to_string()))
}

fn sms(raw: &RawSubmission, errors: &mut ValidationErrors) -> Option<(String, String)> {
    let number = required(raw, "phone", "Phone number cannot be empty.", errors)?;
    let message = raw.non_empty("message").unwrap_or("");
    Some((format!("smsto:{}:{}", number, message), number.to_string()))
}

fn vcard(raw: &RawSubmission, errors: &mut ValidationErrors) -> Option<(String, String)> {
    let first = required(raw, "firstName", "First name is required.", errors);
    let last = required(raw, "lastName", "Last name is required.", errors);

    if let Some(mail) = raw.non_empty("email") {
        if !is_email(mail) {
            errors.add("email", "Invalid email for vCard.");
        }
    }
    if let Some(site) = raw.non_empty("website") {
        if !is_absolute_url(site) {
            errors.add("website", "Invalid website URL.");
        }
    }

    let (first, last) = (first?, last?);
    if !errors.is_empty() {
        return None;
    }

    // vCard 3.0 with a fixed line order; absent optional fields contribute
    // no line at all.
    let mut lines = vec![
        "BEGIN:VCARD".to_string(),
        "VERSION:3.0".to_string(),
        format!("N:{};{}", last, first),
        format!("FN:{} {}", first, last),
    ];
    if let Some(org) = raw.non_empty("organization") {
        lines.push(format!("ORG:{}", org));
    }
    if let Some(title) = raw.non_empty("title") {
        lines.push(format!("TITLE:{}", title));
    }
    if let Some(tel) = raw.non_empty("phone") {
        lines.push(format!("TEL;TYPE=WORK,VOICE:{}", tel));
    }
    if let Some(mail) = raw.non_empty("email") {
        lines.push(format!("EMAIL:{}", mail));
    }
    if let Some(site) = raw.non_empty("website") {
        lines.push(format!("URL:{}", site));
    }
    if let Some(address) = raw.non_empty("address") {
        lines.push(format!("ADR;TYPE=WORK:;;{}", address));
    }
    lines.push("END:VCARD".to_string());

    Some((lines.join("\n"), format!("{} {}", first, last)))
}

fn wifi(raw: &RawSubmission, errors: &mut ValidationErrors) -> Option<(String, String)> {
    let ssid = required(raw, "ssid", "Network name is required.", errors)?;
    // Absent security falls back to WPA; a present but unknown tag is
    // still rejected.
    let security = match raw.non_empty("security") {
        Some(tag) => match WifiSecurity::parse(tag) {
            Some(security) => security,
            None => {
                errors.add("security", "Security must be one of WPA, WEP, or nopass.");
                return None;
            }
        },
        None => WifiSecurity::Wpa,
    };
    let password = raw.non_empty("password").unwrap_or("");
    Some((
        format!("WIFI:T:{};S:{};P:{};;", security.as_str(), ssid, password),
        ssid.to_string(),
    ))
}

fn location(raw: &RawSubmission, errors: &mut ValidationErrors) -> Option<(String, String)> {
    let lat = parse_coordinate(raw, "latitude", "Latitude must be a number.", errors);
    let lng = parse_coordinate(raw, "longitude", "Longitude must be a number.", errors);
    let (lat, lng) = (lat?, lng?);
    Some((
        format!("geo:{},{}", lat, lng),
        format!("Location ({}, {})", lat, lng),
    ))
}

fn parse_coordinate(
    raw: &RawSubmission,
    field: &str,
    message: &str,
    errors: &mut ValidationErrors,
) -> Option<f64> {
    match raw.non_empty(field).map(str::parse::<f64>) {
        Some(Ok(value)) if value.is_finite() => Some(value),
        _ => {
            errors.add(field, message);
            None
        }
    }
}

/// Shared branch for the four media kinds: a URL field wins; with only an
/// uploaded file the payload is a fixed placeholder label rather than the
/// stored asset's URL (see DESIGN.md).
fn media(
    raw: &RawSubmission,
    errors: &mut ValidationErrors,
    url_field: &str,
    placeholder: &str,
    display: &str,
) -> Option<(String, String)> {
    if let Some(url) = raw.non_empty(url_field) {
        if !is_absolute_url(url) {
            errors.add(url_field, "Please enter a valid URL.");
            return None;
        }
        return Some((url.to_string(), display.to_string()));
    }
    if raw.file().is_some() {
        return Some((placeholder.to_string(), display.to_string()));
    }
    errors.add(url_field, "Either a URL or an uploaded file is required.");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UploadedFile;

    fn errors_of(result: Result<ResolvedContent, ResolveError>) -> ValidationErrors {
        match result {
            Err(ResolveError::Invalid(errors)) => errors,
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    fn sample_file() -> UploadedFile {
        UploadedFile {
            name: "clip.mp4".into(),
            size: 1024,
            content_type: "video/mp4".into(),
            url: "https://uploads.example.com/clip.mp4".into(),
        }
    }

    #[test]
    fn every_kind_resolves_a_minimal_submission() {
        let cases: Vec<(ContentKind, RawSubmission)> = vec![
            (
                ContentKind::Website,
                RawSubmission::new().set("text", "https://example.com"),
            ),
            (ContentKind::Text, RawSubmission::new().set("text", "hello")),
            (
                ContentKind::Email,
                RawSubmission::new().set("to", "a@example.com"),
            ),
            (ContentKind::Phone, RawSubmission::new().set("phone", "+123")),
            (ContentKind::Sms, RawSubmission::new().set("phone", "+123")),
            (
                ContentKind::Vcard,
                RawSubmission::new()
                    .set("firstName", "John")
                    .set("lastName", "Doe"),
            ),
            (ContentKind::Wifi, RawSubmission::new().set("ssid", "Home")),
            (
                ContentKind::Location,
                RawSubmission::new()
                    .set("latitude", "1.5")
                    .set("longitude", "2.5"),
            ),
            (
                ContentKind::Pdf,
                RawSubmission::new().set("pdfUrl", "https://example.com/a.pdf"),
            ),
            (
                ContentKind::Image,
                RawSubmission::new().with_file(sample_file()),
            ),
            (
                ContentKind::Video,
                RawSubmission::new().with_file(sample_file()),
            ),
            (
                ContentKind::Music,
                RawSubmission::new().set("musicUrl", "https://example.com/a.mp3"),
            ),
        ];

        for (kind, raw) in cases {
            let resolved = resolve_kind(kind, &raw)
                .unwrap_or_else(|err| panic!("{:?} failed: {}", kind, err));
            assert!(!resolved.payload.is_empty(), "{:?} payload empty", kind);
            assert!(!resolved.display_text.is_empty(), "{:?} display empty", kind);
            assert_eq!(resolved.kind, kind);
        }
    }

    #[test]
    fn resolve_is_deterministic() {
        let raw = RawSubmission::new()
            .set("ssid", "Home")
            .set("password", "secret")
            .set("security", "WPA");
        let a = resolve("wifi", &raw).unwrap();
        let b = resolve("wifi", &raw).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_kind_is_not_a_field_error() {
        let err = resolve("carrier-pigeon", &RawSubmission::new()).unwrap_err();
        assert!(matches!(err, ResolveError::UnsupportedKind(tag) if tag == "carrier-pigeon"));
    }

    #[test]
    fn website_rejects_non_urls() {
        let errors = errors_of(resolve(
            "website",
            &RawSubmission::new().set("text", "not a url"),
        ));
        assert!(errors.contains("text"));

        let resolved = resolve(
            "website",
            &RawSubmission::new().set("text", "https://example.com"),
        )
        .unwrap();
        assert_eq!(resolved.payload, "https://example.com");
        assert_eq!(resolved.display_text, "https://example.com");
    }

    #[test]
    fn email_payload_keeps_query_separator() {
        let resolved = resolve(
            "email",
            &RawSubmission::new().set("to", "a@example.com"),
        )
        .unwrap();
        assert_eq!(resolved.payload, "mailto:a@example.com?");
        assert_eq!(resolved.display_text, "a@example.com");

        let resolved = resolve(
            "email",
            &RawSubmission::new()
                .set("to", "a@example.com")
                .set("subject", "Hi there")
                .set("body", "line one"),
        )
        .unwrap();
        assert_eq!(
            resolved.payload,
            "mailto:a@example.com?subject=Hi+there&body=line+one"
        );
    }

    #[test]
    fn sms_message_is_optional() {
        let resolved = resolve(
            "sms",
            &RawSubmission::new().set("phone", "+123").set("message", "on my way"),
        )
        .unwrap();
        assert_eq!(resolved.payload, "smsto:+123:on my way");

        let resolved = resolve("sms", &RawSubmission::new().set("phone", "+123")).unwrap();
        assert_eq!(resolved.payload, "smsto:+123:");
        assert_eq!(resolved.display_text, "+123");
    }

    #[test]
    fn wifi_payload_format() {
        let resolved = resolve(
            "wifi",
            &RawSubmission::new()
                .set("ssid", "Home")
                .set("password", "secret")
                .set("security", "WPA"),
        )
        .unwrap();
        assert_eq!(resolved.payload, "WIFI:T:WPA;S:Home;P:secret;;");
        assert_eq!(resolved.display_text, "Home");
    }

    #[test]
    fn wifi_defaults_to_wpa_and_rejects_unknown_security() {
        let resolved = resolve("wifi", &RawSubmission::new().set("ssid", "Home")).unwrap();
        assert_eq!(resolved.payload, "WIFI:T:WPA;S:Home;P:;;");

        let errors = errors_of(resolve(
            "wifi",
            &RawSubmission::new().set("ssid", "Home").set("security", "WPA3"),
        ));
        assert!(errors.contains("security"));
    }

    #[test]
    fn location_formats_shortest_float_form() {
        let resolved = resolve(
            "location",
            &RawSubmission::new()
                .set("latitude", "40.7128")
                .set("longitude", "-74.0060"),
        )
        .unwrap();
        assert_eq!(resolved.payload, "geo:40.7128,-74.006");
        assert_eq!(resolved.display_text, "Location (40.7128, -74.006)");
    }

    #[test]
    fn location_rejects_non_numbers() {
        let errors = errors_of(resolve(
            "location",
            &RawSubmission::new()
                .set("latitude", "north")
                .set("longitude", "-74"),
        ));
        assert!(errors.contains("latitude"));
        assert!(!errors.contains("longitude"));
    }

    #[test]
    fn vcard_minimal_has_no_optional_lines() {
        let resolved = resolve(
            "vcard",
            &RawSubmission::new().set("firstName", "John").set("lastName", "Doe"),
        )
        .unwrap();
        assert!(resolved
            .payload
            .starts_with("BEGIN:VCARD\nVERSION:3.0\nN:Doe;John\nFN:John Doe\n"));
        assert!(resolved.payload.ends_with("END:VCARD"));
        assert!(!resolved.payload.contains("ORG:"));
        assert!(!resolved.payload.contains("TITLE:"));
        assert_eq!(resolved.display_text, "John Doe");
    }

    #[test]
    fn vcard_optional_lines_follow_fixed_order() {
        let resolved = resolve(
            "vcard",
            &RawSubmission::new()
                .set("firstName", "John")
                .set("lastName", "Doe")
                .set("organization", "Acme")
                .set("title", "Engineer")
                .set("phone", "+123")
                .set("email", "john@example.com")
                .set("website", "https://example.com")
                .set("address", "1 Main St"),
        )
        .unwrap();
        assert_eq!(
            resolved.payload,
            "BEGIN:VCARD\nVERSION:3.0\nN:Doe;John\nFN:John Doe\n\
             ORG:Acme\nTITLE:Engineer\nTEL;TYPE=WORK,VOICE:+123\n\
             EMAIL:john@example.com\nURL:https://example.com\n\
             ADR;TYPE=WORK:;;1 Main St\nEND:VCARD"
        );
    }

    #[test]
    fn vcard_validates_optional_email_and_website() {
        let errors = errors_of(resolve(
            "vcard",
            &RawSubmission::new()
                .set("firstName", "John")
                .set("lastName", "Doe")
                .set("email", "not-an-email")
                .set("website", "not a url"),
        ));
        assert!(errors.contains("email"));
        assert!(errors.contains("website"));
    }

    #[test]
    fn media_url_wins_over_file() {
        let resolved = resolve(
            "video",
            &RawSubmission::new()
                .set("videoUrl", "https://example.com/v.mp4")
                .with_file(sample_file()),
        )
        .unwrap();
        assert_eq!(resolved.payload, "https://example.com/v.mp4");
        assert_eq!(resolved.display_text, "Video");
    }

    #[test]
    fn media_file_only_yields_placeholder_payload() {
        let resolved = resolve("video", &RawSubmission::new().with_file(sample_file())).unwrap();
        assert_eq!(resolved.payload, "Video File");

        let resolved = resolve("pdf", &RawSubmission::new().with_file(sample_file())).unwrap();
        assert_eq!(resolved.payload, "PDF File");
        assert_eq!(resolved.display_text, "PDF Document");
    }

    #[test]
    fn media_requires_url_or_file() {
        let errors = errors_of(resolve("music", &RawSubmission::new()));
        assert!(errors.contains("musicUrl"));
    }

    #[test]
    fn color_must_carry_hash_prefix() {
        let errors = errors_of(resolve(
            "text",
            &RawSubmission::new().set("text", "hi").set("color", "ff0000"),
        ));
        assert!(errors.contains("color"));

        let resolved = resolve(
            "text",
            &RawSubmission::new().set("text", "hi").set("color", "#FF0000"),
        )
        .unwrap();
        assert_eq!(resolved.styling.color, "#FF0000");
    }

    #[test]
    fn size_bounds_are_enforced() {
        for bad in ["49", "1001", "abc", "-5"] {
            let errors = errors_of(resolve(
                "text",
                &RawSubmission::new().set("text", "hi").set("size", bad),
            ));
            assert!(errors.contains("size"), "size {:?} accepted", bad);
        }

        let resolved = resolve(
            "text",
            &RawSubmission::new().set("text", "hi").set("size", "500"),
        )
        .unwrap();
        assert_eq!(resolved.styling.size, 500);
    }

    #[test]
    fn styling_errors_accumulate_with_field_errors() {
        let errors = errors_of(resolve(
            "website",
            &RawSubmission::new()
                .set("text", "not a url")
                .set("color", "red")
                .set("shape", "triangle"),
        ));
        assert!(errors.contains("text"));
        assert!(errors.contains("color"));
        assert!(errors.contains("shape"));
    }

    #[test]
    fn styling_tags_are_parsed() {
        let resolved = resolve(
            "text",
            &RawSubmission::new()
                .set("text", "hi")
                .set("frame", "scan-me")
                .set("shape", "rounded")
                .set("logoUrl", "https://cdn.example.com/logo.png"),
        )
        .unwrap();
        assert_eq!(resolved.styling.frame, Some(FrameStyle::ScanMe));
        assert_eq!(resolved.styling.shape, Some(ShapeStyle::Rounded));
        assert_eq!(
            resolved.styling.logo_url.as_deref(),
            Some("https://cdn.example.com/logo.png")
        );
    }
}
