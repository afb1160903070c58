use std::fmt;
use std::path::Path;

// @module: Release/version hints from filenames, advisory only

/// Where a release was sourced from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseSource {
    BluRay,
    WebDl,
    WebRip,
    Web,
    Hdtv,
    DvdRip,
    Dvd,
    HdCam,
    Cam,
}

impl ReleaseSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::BluRay => "BluRay",
            Self::WebDl => "WEB-DL",
            Self::WebRip => "WEBRip",
            Self::Web => "WEB",
            Self::Hdtv => "HDTV",
            Self::DvdRip => "DVDRip",
            Self::Dvd => "DVD",
            Self::HdCam => "HDCAM",
            Self::Cam => "CAM",
        }
    }
}

impl fmt::Display for ReleaseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// @const: Source tags in priority order, first match wins
const SOURCE_PATTERNS: &[(ReleaseSource, &[&str])] = &[
    (ReleaseSource::BluRay, &["BLURAY", "BLU-RAY", "BDRIP", "BRRIP", "BDREMUX", "BD"]),
    (ReleaseSource::WebDl, &["WEB-DL", "WEBDL"]),
    (ReleaseSource::WebRip, &["WEBRIP", "WEB-RIP"]),
    (ReleaseSource::Web, &["WEB"]),
    (ReleaseSource::Hdtv, &["HDTV", "HD-TV", "PDTV"]),
    (ReleaseSource::DvdRip, &["DVDRIP", "DVD-RIP"]),
    (ReleaseSource::Dvd, &["DVD", "DVD5", "DVD9"]),
    (ReleaseSource::HdCam, &["HDCAM", "HD-CAM"]),
    (ReleaseSource::Cam, &["CAM", "CAMRIP", "HDTS", "TELESYNC", "TS"]),
];

// @const: Resolution tokens and their display form
const RESOLUTIONS: &[(&str, &str)] = &[
    ("2160P", "2160p"),
    ("4K", "4K"),
    ("1080P", "1080p"),
    ("1080I", "1080i"),
    ("720P", "720p"),
    ("576P", "576p"),
    ("480P", "480p"),
];

const CODEC_PATTERNS: &[(&str, &[&str])] = &[
    ("HEVC", &["HEVC", "H.265", "H265", "X265"]),
    ("H.264", &["H.264", "H264", "X264", "AVC"]),
    ("VP9", &["VP9"]),
    ("AV1", &["AV1"]),
];

const YEAR_RANGE: std::ops::RangeInclusive<u16> = 1900..=2030;

/// Version hints parsed from one filename
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub source: Option<ReleaseSource>,
    pub resolution: Option<String>,
    pub codec: Option<String>,
    pub release_group: Option<String>,
    pub year: Option<u16>,
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |value: Option<String>| value.unwrap_or_else(|| "?".to_string());
        write!(
            f,
            "source={} resolution={} codec={} group={} year={}",
            show(self.source.map(|s| s.to_string())),
            show(self.resolution.clone()),
            show(self.codec.clone()),
            show(self.release_group.clone()),
            show(self.year.map(|y| y.to_string())),
        )
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '_' | '-' | ' ' | '(' | ')' | '[' | ']')
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(is_separator)
        .filter(|token| !token.is_empty())
        .map(|token| token.to_uppercase())
        .collect()
}

/// Whether `pattern` occurs as whole tokens in `tokens`
fn contains_pattern(tokens: &[String], pattern: &str) -> bool {
    let needle = tokenize(pattern);
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens.windows(needle.len()).any(|window| window == needle.as_slice())
}

/// Drop the file extension (".srt", ".mkv", ...) when it looks like one
fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty()
            && (1..=4).contains(&ext.len())
            && ext.chars().all(|c| c.is_ascii_alphanumeric())
            && !ext.chars().all(|c| c.is_ascii_digit()) => stem,
        _ => name,
    }
}

fn detect_release_group(stem: &str) -> Option<String> {
    let (head, tail) = stem.rsplit_once('-')?;
    let group: String = tail.chars().take_while(|c| c.is_ascii_alphanumeric()).collect();
    if group.is_empty() {
        return None;
    }

    // "WEB-DL", "BLU-RAY" and friends are tags, not groups
    let previous = head.rsplit(is_separator).next().unwrap_or_default();
    let joined = format!("{}-{}", previous, group).to_uppercase();
    let is_tag = SOURCE_PATTERNS.iter()
        .flat_map(|(_, patterns)| patterns.iter())
        .any(|pattern| *pattern == joined);

    if is_tag { None } else { Some(group) }
}

/// Parse version hints from a filename
pub fn detect_version_info(filename: &str) -> VersionInfo {
    let name = Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());
    let stem = strip_extension(&name);
    let tokens = tokenize(stem);

    let source = SOURCE_PATTERNS.iter()
        .find(|(_, patterns)| patterns.iter().any(|pattern| contains_pattern(&tokens, pattern)))
        .map(|(source, _)| *source);

    let resolution = RESOLUTIONS.iter()
        .find(|(token, _)| tokens.iter().any(|t| t == token))
        .map(|(_, display)| display.to_string());

    let codec = CODEC_PATTERNS.iter()
        .find(|(_, patterns)| patterns.iter().any(|pattern| contains_pattern(&tokens, pattern)))
        .map(|(name, _)| name.to_string());

    // Last year-like token, so titles such as "2001" lose to the release year
    let year = tokens.iter()
        .filter(|token| token.len() == 4 && token.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|token| token.parse::<u16>().ok())
        .filter(|year| YEAR_RANGE.contains(year))
        .last();

    VersionInfo {
        source,
        resolution,
        codec,
        release_group: detect_release_group(stem),
        year,
    }
}

/// Advisory notes explaining why a video and subtitle may not line up
pub fn compare_versions(video: &VersionInfo, subtitle: &VersionInfo) -> Vec<String> {
    let mut advisories = Vec::new();

    if let (Some(video_source), Some(subtitle_source)) = (video.source, subtitle.source) {
        if video_source != subtitle_source {
            advisories.push(format!(
                "Source mismatch: video is {} but subtitle was made for {}; cuts and timing often differ between sources",
                video_source, subtitle_source
            ));
        }
    }

    if let (Some(video_group), Some(subtitle_group)) = (&video.release_group, &subtitle.release_group) {
        if !video_group.eq_ignore_ascii_case(subtitle_group) {
            advisories.push(format!(
                "Release group mismatch: video is from {} but subtitle is from {}; look for a subtitle matching the video release",
                video_group, subtitle_group
            ));
        }
    }

    advisories
}
