//! Sniffs uploaded media and derives the tags the metadata backfill reads.
//!
//! Detection order: image signatures via the `image` crate, container brands
//! for video, then the signed content type, then the extension's MIME type.
//! Dimensions are read from the image header only; nothing is decoded.

use image::{ImageFormat, ImageReader};
use std::{collections::HashMap, io::Cursor};

const MP4_BRANDS: [&[u8; 4]; 6] = [b"mp42", b"isom", b"MSNV", b"M4V ", b"mp41", b"qt  "];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    pub media_type: Option<String>,
    pub format: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ProbeResult {
    fn new(media_type: &str, format: &str) -> Self {
        Self {
            media_type: Some(media_type.to_string()),
            format: Some(format.to_string()),
            ..Self::default()
        }
    }

    fn with_dimensions(mut self, dims: Option<(u32, u32)>) -> Self {
        if let Some((width, height)) = dims {
            self.width = Some(width);
            self.height = Some(height);
        }
        self
    }

    /// Object tags for this result. Absent values are left out.
    pub fn into_tags(self, file_size: i64) -> HashMap<String, String> {
        let mut tags = HashMap::new();
        tags.insert("fileSize".to_string(), file_size.to_string());
        if let Some(media_type) = self.media_type {
            tags.insert("mediaType".to_string(), media_type);
        }
        if let Some(format) = self.format.filter(|f| !f.is_empty()) {
            tags.insert("format".to_string(), format);
        }
        if let Some(width) = self.width {
            tags.insert("width".to_string(), width.to_string());
        }
        if let Some(height) = self.height {
            tags.insert("height".to_string(), height.to_string());
        }
        tags
    }
}

pub fn probe(head: &[u8], content_type: Option<&str>, key: &str) -> ProbeResult {
    if let Ok(format) = image::guess_format(head) {
        return ProbeResult::new("image", format_name(format)).with_dimensions(dimensions(head));
    }
    if let Some(format) = video_container(head) {
        return ProbeResult::new("video", format);
    }

    if let Some(content_type) = content_type.filter(|ct| !ct.is_empty()) {
        if let Some((kind, subtype)) = content_type.split_once('/') {
            if kind == "image" || kind == "video" {
                return ProbeResult::new(kind, subtype);
            }
        }
    }

    if let Some(mime) = mime_guess::from_path(key).first() {
        let kind = mime.type_();
        if kind == mime_guess::mime::IMAGE || kind == mime_guess::mime::VIDEO {
            let ext = key
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .unwrap_or_default();
            return ProbeResult::new(kind.as_str(), &ext);
        }
    }

    ProbeResult::new("unknown", "")
}

/// `jpeg`, `png`, `webp`... taken from the format's MIME subtype.
fn format_name(format: ImageFormat) -> &'static str {
    let mime = format.to_mime_type();
    mime.split_once('/').map_or(mime, |(_, subtype)| subtype)
}

fn dimensions(head: &[u8]) -> Option<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(head))
        .with_guessed_format()
        .ok()?;
    match reader.into_dimensions() {
        Ok(dims) => Some(dims),
        Err(err) => {
            tracing::debug!(error = %err, "image header unreadable");
            None
        }
    }
}

/// ISO-BMFF brands and RIFF/AVI, which `image` does not know about.
fn video_container(head: &[u8]) -> Option<&'static str> {
    if head.len() < 12 {
        return None;
    }
    if &head[4..8] == b"ftyp" {
        let brand = &head[8..12];
        if MP4_BRANDS.iter().any(|b| b.as_slice() == brand) {
            return Some(if brand == b"qt  " { "mov" } else { "mp4" });
        }
    }
    if &head[0..4] == b"RIFF" && &head[8..12] == b"AVI " {
        return Some("avi");
    }
    None
}
