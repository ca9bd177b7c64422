//! Raw upstream response shapes and their conversion into [`crate::models`].
//!
//! Fields are decoded leniently: anything missing or `null` becomes an empty
//! default, and values that some providers send as numbers and others as
//! strings are accepted either way. Nested lists are decoded entry by entry
//! so one malformed entry is skipped rather than failing the response.

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;

use crate::models::{
    AdaptiveStream, ChannelInfo, ChannelSummary, ChannelVideosPage, Comment, DetailSource,
    PlaylistInfo, PlaylistSummary, SearchResult, VideoDetail, VideoSummary,
};

const THUMBNAIL_HOST: &str = "https://i.ytimg.com";
const MAX_RELATED: usize = 20;
pub const MAX_TRENDING: usize = 24;
const PRIMARY_ITAG: &str = "18";

/// Scalar that arrives as either a JSON string or a JSON number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TextOrNumber {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl TextOrNumber {
    pub fn into_text(self) -> String {
        match self {
            Self::Text(value) => value,
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
        }
    }
}

fn text(value: Option<TextOrNumber>) -> String {
    value.map(TextOrNumber::into_text).unwrap_or_default()
}

/// Decodes a JSON array one entry at a time, dropping entries that do not
/// fit `T` instead of rejecting the whole document.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(raw.map(|items| {
        items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()
    }))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnail {
    pub url: Option<String>,
}

/// Listing entry shared by search, playlists, channels and recommendations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorVideoItem {
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub author_id: Option<String>,
    pub published_text: Option<String>,
    pub view_count_text: Option<String>,
    pub length_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorChannelItem {
    pub author_id: Option<String>,
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub author_thumbnails: Option<Vec<Thumbnail>>,
    pub sub_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorPlaylistItem {
    pub playlist_id: Option<String>,
    pub title: Option<String>,
    pub playlist_thumbnail: Option<String>,
    pub video_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum MirrorSearchItem {
    #[serde(rename = "video")]
    Video(MirrorVideoItem),
    #[serde(rename = "channel")]
    Channel(MirrorChannelItem),
    #[serde(rename = "playlist")]
    Playlist(MirrorPlaylistItem),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
struct PopularItem {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(flatten)]
    video: MirrorVideoItem,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveFormat {
    pub url: Option<String>,
    pub container: Option<String>,
    pub resolution: Option<String>,
    pub audio_quality: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatStream {
    pub url: Option<String>,
}

/// Video detail as served by the mirrored API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorVideo {
    pub title: Option<String>,
    pub description_html: Option<String>,
    pub author: Option<String>,
    pub author_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub author_thumbnails: Option<Vec<Thumbnail>>,
    pub view_count: Option<TextOrNumber>,
    pub like_count: Option<TextOrNumber>,
    pub sub_count_text: Option<String>,
    pub published_text: Option<String>,
    pub length_seconds: Option<i64>,
    #[serde(alias = "recommendedvideo")]
    #[serde(default, deserialize_with = "lenient_list")]
    pub recommended_videos: Option<Vec<MirrorVideoItem>>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub adaptive_formats: Option<Vec<AdaptiveFormat>>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub format_streams: Option<Vec<FormatStream>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EduDescription {
    pub formatted: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EduAuthor {
    pub name: Option<String>,
    pub id: Option<String>,
    pub thumbnail: Option<String>,
    pub subscribers: Option<TextOrNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EduRelated {
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub channel_id: Option<String>,
    pub views: Option<TextOrNumber>,
}

/// Video detail as served by the secondary API: nested author and
/// description objects, no stream URLs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EduVideo {
    pub title: Option<String>,
    pub description: Option<EduDescription>,
    pub author: Option<EduAuthor>,
    pub views: Option<TextOrNumber>,
    pub likes: Option<TextOrNumber>,
    pub relative_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub related: Option<Vec<EduRelated>>,
}

/// A video detail payload from whichever provider answered.
#[derive(Debug, Clone)]
pub enum RawVideoDetail {
    Mirror(MirrorVideo),
    Education(EduVideo),
}

impl RawVideoDetail {
    pub fn into_detail(self) -> VideoDetail {
        match self {
            Self::Mirror(raw) => mirror_detail(raw),
            Self::Education(raw) => education_detail(raw),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorPlaylist {
    pub title: Option<String>,
    pub author: Option<String>,
    pub author_id: Option<String>,
    pub description: Option<String>,
    pub video_count: Option<i64>,
    pub view_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub videos: Option<Vec<MirrorVideoItem>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorChannel {
    pub author: Option<String>,
    pub author_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub author_thumbnails: Option<Vec<Thumbnail>>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub author_banners: Option<Vec<Thumbnail>>,
    pub description_html: Option<String>,
    pub sub_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tags: Option<Vec<String>>,
    pub video_count: Option<i64>,
    #[serde(alias = "latestvideo")]
    #[serde(default, deserialize_with = "lenient_list")]
    pub latest_videos: Option<Vec<MirrorVideoItem>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MirrorChannelPage {
    #[serde(default, deserialize_with = "lenient_list")]
    pub videos: Option<Vec<MirrorVideoItem>>,
    pub continuation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorComment {
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub author_thumbnails: Option<Vec<Thumbnail>>,
    pub author_id: Option<String>,
    pub content_html: Option<String>,
    pub like_count: Option<i64>,
    pub published_text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MirrorComments {
    #[serde(default, deserialize_with = "lenient_list")]
    pub comments: Option<Vec<MirrorComment>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataApiId {
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataApiSnippet {
    pub title: Option<String>,
    pub channel_title: Option<String>,
    pub channel_id: Option<String>,
    pub published_at: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataApiItem {
    pub id: Option<DataApiId>,
    pub snippet: Option<DataApiSnippet>,
}

/// Response of the keyed search API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataApiSearch {
    #[serde(default, deserialize_with = "lenient_list")]
    pub items: Option<Vec<DataApiItem>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressiveFormat {
    pub itag: Option<TextOrNumber>,
    pub url: Option<String>,
    pub vcodec: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressiveFormats {
    #[serde(default, deserialize_with = "lenient_list")]
    pub formats: Option<Vec<ProgressiveFormat>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HlsFormat {
    pub resolution: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HlsFormats {
    #[serde(default, deserialize_with = "lenient_list")]
    pub m3u8_formats: Option<Vec<HlsFormat>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbedConfig {
    pub params: Option<String>,
}

pub fn thumbnail_url(video_id: &str, size: &str) -> String {
    format!("{THUMBNAIL_HOST}/vi/{video_id}/{size}.jpg")
}

/// `H:MM:SS`, hours unbounded.
pub fn clock_text(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Like [`clock_text`] but empty for unknown or zero lengths.
pub fn length_text(seconds: Option<i64>) -> String {
    match seconds {
        Some(value) if value > 0 => clock_text(value),
        _ => String::new(),
    }
}

fn last_thumbnail(thumbnails: Option<Vec<Thumbnail>>) -> String {
    thumbnails
        .and_then(|mut list| list.pop())
        .and_then(|thumb| thumb.url)
        .unwrap_or_default()
}

fn https_upgrade(url: String) -> String {
    if url.is_empty() || url.starts_with("https") {
        url
    } else {
        format!("https:{url}")
    }
}

fn html_newlines(value: Option<String>) -> String {
    value.unwrap_or_default().replace('\n', "<br>")
}

/// Percent-escapes everything except alphanumerics and `-_.~/:`.
pub fn escape_banner_url(url: &str) -> String {
    let mut escaped = String::with_capacity(url.len());
    for ch in url.chars() {
        if ch.is_ascii_alphanumeric() || "-_.~/:".contains(ch) {
            escaped.push(ch);
        } else {
            let mut buf = [0u8; 4];
            escaped.push_str(&urlencoding::encode(ch.encode_utf8(&mut buf)));
        }
    }
    escaped
}

fn summary(item: MirrorVideoItem, thumbnail_size: &str) -> VideoSummary {
    let id = item.video_id.unwrap_or_default();
    VideoSummary {
        thumbnail: thumbnail_url(&id, thumbnail_size),
        id,
        title: item.title.unwrap_or_default(),
        author: item.author.unwrap_or_default(),
        author_id: item.author_id.unwrap_or_default(),
        published: item.published_text.unwrap_or_default(),
        views: item.view_count_text.unwrap_or_default(),
        length: length_text(item.length_seconds),
        description: String::new(),
    }
}

fn summaries(items: Option<Vec<MirrorVideoItem>>) -> Vec<VideoSummary> {
    items
        .unwrap_or_default()
        .into_iter()
        .map(|item| summary(item, "hqdefault"))
        .collect()
}

/// Maps a mirror search response, skipping unknown or malformed entries.
pub fn mirror_search_results(items: Vec<Value>) -> Vec<SearchResult> {
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<MirrorSearchItem>(item).ok())
        .filter_map(|item| match item {
            MirrorSearchItem::Video(video) => Some(SearchResult::Video(summary(video, "hqdefault"))),
            MirrorSearchItem::Channel(channel) => Some(SearchResult::Channel(ChannelSummary {
                id: channel.author_id.unwrap_or_default(),
                author: channel.author.unwrap_or_default(),
                thumbnail: https_upgrade(last_thumbnail(channel.author_thumbnails)),
                subscribers: channel.sub_count.unwrap_or_default(),
            })),
            MirrorSearchItem::Playlist(playlist) => Some(SearchResult::Playlist(PlaylistSummary {
                id: playlist.playlist_id.unwrap_or_default(),
                title: playlist.title.unwrap_or_default(),
                thumbnail: playlist.playlist_thumbnail.unwrap_or_default(),
                count: playlist.video_count.unwrap_or_default(),
            })),
            MirrorSearchItem::Other => None,
        })
        .collect()
}

/// Keyed search API results; always video entries.
pub fn data_api_results(response: DataApiSearch) -> Vec<SearchResult> {
    response
        .items
        .unwrap_or_default()
        .into_iter()
        .map(|item| {
            let id = item.id.and_then(|id| id.video_id).unwrap_or_default();
            let snippet = item.snippet.unwrap_or_default();
            SearchResult::Video(VideoSummary {
                thumbnail: thumbnail_url(&id, "hqdefault"),
                id,
                title: snippet.title.unwrap_or_default(),
                author: snippet.channel_title.unwrap_or_default(),
                author_id: snippet.channel_id.unwrap_or_default(),
                published: snippet.published_at.unwrap_or_default(),
                description: snippet.description.unwrap_or_default(),
                views: String::new(),
                length: String::new(),
            })
        })
        .collect()
}

/// Keeps the video and short entries among the first [`MAX_TRENDING`] items.
pub fn popular_videos(items: Vec<Value>) -> Vec<VideoSummary> {
    items
        .into_iter()
        .take(MAX_TRENDING)
        .filter_map(|item| serde_json::from_value::<PopularItem>(item).ok())
        .filter(|item| matches!(item.kind.as_deref(), Some("video" | "shortVideo")))
        .map(|item| summary(item.video, "hqdefault"))
        .collect()
}

fn mirror_detail(raw: MirrorVideo) -> VideoDetail {
    let related = raw
        .recommended_videos
        .unwrap_or_default()
        .into_iter()
        .take(MAX_RELATED)
        .map(|item| summary(item, "mqdefault"))
        .collect();

    let adaptive = raw.adaptive_formats.unwrap_or_default();
    let stream_urls: Vec<AdaptiveStream> = adaptive
        .iter()
        .filter(|format| format.container.as_deref() == Some("webm"))
        .filter_map(|format| {
            let resolution = format.resolution.as_deref().filter(|res| !res.is_empty())?;
            Some(AdaptiveStream {
                url: format.url.clone().unwrap_or_default(),
                resolution: resolution.to_string(),
            })
        })
        .collect();
    let highstream_url = ["1080p", "720p"].iter().find_map(|wanted| {
        stream_urls
            .iter()
            .find(|stream| stream.resolution == *wanted)
            .map(|stream| stream.url.clone())
    });
    let audio_url = adaptive
        .iter()
        .find(|format| {
            format.container.as_deref() == Some("m4a")
                && format.audio_quality.as_deref() == Some("AUDIO_QUALITY_MEDIUM")
        })
        .and_then(|format| format.url.clone());

    let video_urls = raw
        .format_streams
        .unwrap_or_default()
        .into_iter()
        .rev()
        .take(2)
        .map(|stream| stream.url.unwrap_or_default())
        .collect();

    VideoDetail {
        source: DetailSource::Mirror,
        title: raw.title.unwrap_or_default(),
        description: html_newlines(raw.description_html),
        author: raw.author.unwrap_or_default(),
        author_id: raw.author_id.unwrap_or_default(),
        author_thumbnail: last_thumbnail(raw.author_thumbnails),
        subscribers: raw.sub_count_text.unwrap_or_default(),
        views: text(raw.view_count),
        likes: text(raw.like_count),
        published: raw.published_text.unwrap_or_default(),
        length_text: clock_text(raw.length_seconds.unwrap_or_default()),
        related,
        video_urls,
        stream_urls,
        highstream_url,
        audio_url,
    }
}

fn education_detail(raw: EduVideo) -> VideoDetail {
    let author = raw.author.unwrap_or_default();
    let related = raw
        .related
        .unwrap_or_default()
        .into_iter()
        .take(MAX_RELATED)
        .map(|item| {
            let id = item.video_id.unwrap_or_default();
            VideoSummary {
                thumbnail: thumbnail_url(&id, "mqdefault"),
                id,
                title: item.title.unwrap_or_default(),
                author: item.channel.unwrap_or_default(),
                author_id: item.channel_id.unwrap_or_default(),
                views: text(item.views),
                ..VideoSummary::default()
            }
        })
        .collect();

    VideoDetail {
        source: DetailSource::Education,
        title: raw.title.unwrap_or_default(),
        description: raw
            .description
            .and_then(|description| description.formatted)
            .unwrap_or_default(),
        author: author.name.unwrap_or_default(),
        author_id: author.id.unwrap_or_default(),
        author_thumbnail: author.thumbnail.unwrap_or_default(),
        subscribers: text(author.subscribers),
        views: text(raw.views),
        likes: text(raw.likes),
        published: raw.relative_date.unwrap_or_default(),
        length_text: String::new(),
        related,
        video_urls: Vec::new(),
        stream_urls: Vec::new(),
        highstream_url: None,
        audio_url: None,
    }
}

pub fn playlist_info(raw: MirrorPlaylist) -> PlaylistInfo {
    PlaylistInfo {
        title: raw.title.unwrap_or_default(),
        author: raw.author.unwrap_or_default(),
        author_id: raw.author_id.unwrap_or_default(),
        description: raw.description.unwrap_or_default(),
        video_count: raw.video_count.unwrap_or_default(),
        view_count: raw.view_count.unwrap_or_default(),
        videos: summaries(raw.videos),
    }
}

pub fn channel_info(raw: MirrorChannel) -> ChannelInfo {
    let author = raw.author.unwrap_or_default();
    let author_id = raw.author_id.unwrap_or_default();
    let videos = summaries(raw.latest_videos)
        .into_iter()
        .map(|video| VideoSummary {
            author: author.clone(),
            author_id: author_id.clone(),
            ..video
        })
        .collect();
    let author_banner = raw
        .author_banners
        .and_then(|banners| banners.into_iter().next())
        .and_then(|banner| banner.url)
        .map(|url| escape_banner_url(&url))
        .unwrap_or_default();

    ChannelInfo {
        channel_name: author,
        channel_icon: last_thumbnail(raw.author_thumbnails),
        channel_profile: raw.description_html.unwrap_or_default(),
        author_banner,
        subscribers: raw.sub_count.unwrap_or_default(),
        tags: raw.tags.unwrap_or_default(),
        video_count: raw.video_count.unwrap_or_default(),
        videos,
    }
}

pub fn channel_page(raw: MirrorChannelPage) -> ChannelVideosPage {
    ChannelVideosPage {
        videos: summaries(raw.videos),
        continuation: raw.continuation.unwrap_or_default(),
    }
}

pub fn comments(raw: MirrorComments) -> Vec<Comment> {
    raw.comments
        .unwrap_or_default()
        .into_iter()
        .map(|comment| Comment {
            author: comment.author.unwrap_or_default(),
            author_thumbnail: last_thumbnail(comment.author_thumbnails),
            author_id: comment.author_id.unwrap_or_default(),
            content: html_newlines(comment.content_html),
            likes: comment.like_count.unwrap_or_default(),
            published: comment.published_text.unwrap_or_default(),
        })
        .collect()
}

/// Picks `(primary, fallback)` from progressive formats. The primary is the
/// itag 18 entry; only when there is none, the fallback is the first entry
/// with a URL and a video codec other than `none`.
pub fn select_progressive(formats: &[ProgressiveFormat]) -> (Option<String>, Option<String>) {
    let primary = formats
        .iter()
        .find(|format| {
            format
                .itag
                .clone()
                .is_some_and(|itag| itag.into_text() == PRIMARY_ITAG)
        })
        .and_then(|format| format.url.clone());
    if primary.is_some() {
        return (primary, None);
    }
    let fallback = formats
        .iter()
        .find(|format| {
            format.url.as_deref().is_some_and(|url| !url.is_empty())
                && format.vcodec.as_deref() != Some("none")
        })
        .and_then(|format| format.url.clone());
    (None, fallback)
}

/// Height component of a `WxH` resolution string; 0 when unparsable.
fn resolution_height(resolution: Option<&str>) -> u64 {
    resolution
        .and_then(|value| value.rsplit('x').next())
        .and_then(|height| height.trim().parse().ok())
        .unwrap_or(0)
}

/// URL of the HLS entry with the tallest resolution; the first one wins ties.
pub fn select_hls(formats: &[HlsFormat]) -> Option<String> {
    let mut best: Option<(u64, &HlsFormat)> = None;
    for format in formats {
        let height = resolution_height(format.resolution.as_deref());
        match best {
            Some((best_height, _)) if height <= best_height => {}
            _ => best = Some((height, format)),
        }
    }
    best.and_then(|(_, format)| format.url.clone())
}

/// Strips a leading `?` and unescapes `&amp;`.
pub fn normalize_embed_params(raw: &str) -> String {
    raw.strip_prefix('?').unwrap_or(raw).replace("&amp;", "&")
}

/// The suggestion endpoint answers `[query, [suggestions...]]`.
pub fn suggestions(value: Value) -> Vec<String> {
    match value {
        Value::Array(mut items) if items.len() > 1 => match items.swap_remove(1) {
            Value::Array(list) => list
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
