//! Media references, kinds and fetch requests.
//!
//! A reference is whatever the command layer extracted from user input: a
//! full `watch?v=` link, a `youtu.be/` short link, or a bare identifier.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::download::error::DownloadError;

/// Shortest identifier accepted by the pipeline.
pub const MIN_IDENTIFIER_LEN: usize = 3;

const WATCH_URL_BASE: &str = "https://www.youtube.com/watch?v=";

/// Extracts the identifier from a link.
///
/// - `...watch?v=<id>&...` → text after the last `v=` up to `&`
/// - `https://youtu.be/<id>?...` → text after `youtu.be/` up to `?` or `/`
/// - anything else is used verbatim (trimmed)
pub fn extract_identifier(link: &str) -> &str {
    let link = link.trim();

    if let Some(pos) = link.rfind("v=") {
        let rest = &link[pos + 2..];
        return rest.split(['&', '#']).next().unwrap_or_default();
    }

    if let Some(pos) = link.rfind("youtu.be/") {
        let rest = &link[pos + "youtu.be/".len()..];
        return rest.split(['?', '&', '/', '#']).next().unwrap_or_default();
    }

    link
}

/// An identifier plus the link it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    identifier: String,
    link: String,
}

impl MediaReference {
    /// Parses a link or bare identifier.
    ///
    /// Fails with `InvalidReference` when the identifier is shorter than
    /// [`MIN_IDENTIFIER_LEN`]. Links the extractor does not recognize (shorts,
    /// embeds) are kept whole and left to yt-dlp.
    pub fn parse(link: &str) -> Result<Self, DownloadError> {
        let identifier = extract_identifier(link);

        if identifier.chars().count() < MIN_IDENTIFIER_LEN {
            return Err(DownloadError::InvalidReference(link.to_string()));
        }

        Ok(Self {
            identifier: identifier.to_string(),
            link: link.trim().to_string(),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    /// True when the identifier looks like a platform id (`[A-Za-z0-9_-]`),
    /// which is all the primary API accepts.
    pub fn is_plain_id(&self) -> bool {
        self.identifier.chars().all(is_stem_char)
    }

    /// Identifier made safe for a file name inside the download directory.
    pub fn file_stem(&self) -> String {
        self.identifier
            .chars()
            .map(|c| if is_stem_char(c) { c } else { '_' })
            .collect()
    }

    /// Link handed to yt-dlp: the original URL, or a watch URL for bare ids.
    pub fn watch_url(&self) -> String {
        if self.link.starts_with("http://") || self.link.starts_with("https://") {
            self.link.clone()
        } else {
            format!("{}{}", WATCH_URL_BASE, self.identifier)
        }
    }
}

fn is_stem_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl fmt::Display for MediaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier)
    }
}

/// What the caller wants out of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Container served by the primary API.
    pub fn primary_extension(self) -> &'static str {
        match self {
            MediaKind::Audio => "webm",
            MediaKind::Video => "mp4",
        }
    }

    /// Container produced by the yt-dlp fallback.
    pub fn fallback_extension(self) -> &'static str {
        match self {
            MediaKind::Audio => "mp3",
            MediaKind::Video => "mp4",
        }
    }

    /// Content-Type family expected from the primary API.
    pub fn content_type_family(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Audio => "AUDIO",
            MediaKind::Video => "VIDEO",
        }
    }
}

/// A single resolution request: which media, which kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub reference: MediaReference,
    pub kind: MediaKind,
}

impl FetchRequest {
    pub fn new(reference: MediaReference, kind: MediaKind) -> Self {
        Self { reference, kind }
    }

    pub fn identifier(&self) -> &str {
        self.reference.identifier()
    }

    pub fn file_stem(&self) -> String {
        self.reference.file_stem()
    }

    /// `<stem>.<ext>` for the primary API download.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.file_stem(), self.kind.primary_extension())
    }

    pub fn target_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    /// Where yt-dlp leaves the finished file.
    pub fn fallback_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.file_stem(), self.kind.fallback_extension()))
    }
}

/// Which source produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOrigin {
    PrimaryApi,
    YtDlp,
}

/// A downloaded file that passed post-download verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub kind: MediaKind,
    pub origin: ArtifactOrigin,
}

impl CachedArtifact {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}
