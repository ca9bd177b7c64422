//! Uniform records produced by the aggregation layer.
//!
//! Every field is always present. Upstream absence shows up as an empty
//! string, zero, an empty list or `None` for the stream URLs, never as a
//! missing key in the serialized JSON.

use serde::Serialize;

/// One entry of a search, trending, channel or playlist listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    pub id: String,
    pub title: String,
    pub author: String,
    pub author_id: String,
    pub thumbnail: String,
    pub published: String,
    pub views: String,
    /// `H:MM:SS`, empty when unknown.
    pub length: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub id: String,
    pub author: String,
    pub thumbnail: String,
    pub subscribers: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub count: i64,
}

/// Search results mix three kinds of entries, told apart by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchResult {
    Video(VideoSummary),
    Channel(ChannelSummary),
    Playlist(PlaylistSummary),
}

impl SearchResult {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Video(_) => "video",
            Self::Channel(_) => "channel",
            Self::Playlist(_) => "playlist",
        }
    }
}

/// Which provider produced a [`VideoDetail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailSource {
    Mirror,
    Education,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdaptiveStream {
    pub url: String,
    pub resolution: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetail {
    pub source: DetailSource,
    pub title: String,
    /// HTML as supplied by the upstream.
    pub description: String,
    pub author: String,
    pub author_id: String,
    pub author_thumbnail: String,
    pub subscribers: String,
    pub views: String,
    pub likes: String,
    pub published: String,
    pub length_text: String,
    pub related: Vec<VideoSummary>,
    pub video_urls: Vec<String>,
    pub stream_urls: Vec<AdaptiveStream>,
    pub highstream_url: Option<String>,
    pub audio_url: Option<String>,
}

/// Playback URLs resolved for one video. Any resolver may have failed, in
/// which case its field is `None`; the embed URLs are always built locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamUrlSet {
    pub primary: Option<String>,
    pub fallback: Option<String>,
    pub m3u8: Option<String>,
    pub embed: String,
    pub education: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub channel_name: String,
    pub channel_icon: String,
    pub channel_profile: String,
    pub author_banner: String,
    pub subscribers: i64,
    pub tags: Vec<String>,
    pub video_count: i64,
    pub videos: Vec<VideoSummary>,
}

/// One page of a channel's uploads. `continuation` is the upstream's opaque
/// cursor for the next page, empty at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelVideosPage {
    pub videos: Vec<VideoSummary>,
    pub continuation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub title: String,
    pub author: String,
    pub author_id: String,
    pub description: String,
    pub video_count: i64,
    pub view_count: i64,
    pub videos: Vec<VideoSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub author: String,
    pub author_thumbnail: String,
    pub author_id: String,
    pub content: String,
    pub likes: i64,
    pub published: String,
}
