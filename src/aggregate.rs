//! One best-effort entry point per feature.
//!
//! Every method here is blocking and never fails: an upstream problem shows
//! up as `None`, an empty list, or the next fallback tier.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    cache::{CacheStore, ThumbnailImage},
    config::UpstreamEndpoints,
    instances::MirrorPool,
    models::{
        ChannelInfo, ChannelVideosPage, Comment, PlaylistInfo, SearchResult, StreamUrlSet,
        VideoDetail, VideoSummary,
    },
    normalize::{self, RawVideoDetail},
    upstream::{RetryPolicy, Timeouts, UpstreamClient},
};

pub const DEFAULT_EMBED_PARAMS: &str = "autoplay=1&rel=0&modestbranding=1";
const KEYED_SEARCH_RESULTS: u32 = 20;

const MIRROR_TIMEOUTS: Timeouts = Timeouts::secs(2, 5);
const DETAIL_TIMEOUTS: Timeouts = Timeouts::secs(5, 15);
const TRENDING_TIMEOUTS: Timeouts = Timeouts::secs(2, 4);
const EDU_VIDEO_TIMEOUTS: Timeouts = Timeouts::secs(2, 6);
const FORMAT_TIMEOUTS: Timeouts = Timeouts::secs(3, 6);
const EMBED_CONFIG_TIMEOUTS: Timeouts = Timeouts::secs(3, 3);
const KEYED_SEARCH_TIMEOUTS: Timeouts = Timeouts::secs(5, 5);
const SUGGEST_TIMEOUTS: Timeouts = Timeouts::secs(2, 2);
const THUMBNAIL_TIMEOUTS: Timeouts = Timeouts::secs(3, 3);
const DEFAULT_THUMBNAIL_TYPE: &str = "image/jpeg";

/// Shown on the home page when no mirror answers and nothing is cached.
const BUILTIN_TRENDING: [(&str, &str, &str, &str); 8] = [
    ("dQw4w9WgXcQ", "Rick Astley - Never Gonna Give You Up", "Rick Astley", "17億 回視聴"),
    ("kJQP7kiw5Fk", "Luis Fonsi - Despacito ft. Daddy Yankee", "Luis Fonsi", "80億 回視聴"),
    ("JGwWNGJdvx8", "Ed Sheeran - Shape of You", "Ed Sheeran", "64億 回視聴"),
    ("RgKAFK5djSk", "Wiz Khalifa - See You Again ft. Charlie Puth", "Wiz Khalifa", "60億 回視聴"),
    ("OPf0YbXqDm0", "Mark Ronson - Uptown Funk ft. Bruno Mars", "Mark Ronson", "50億 回視聴"),
    ("9bZkp7q19f0", "PSY - Gangnam Style", "PSY", "50億 回視聴"),
    ("XqZsoesa55w", "Baby Shark Dance", "Pinkfong", "150億 回視聴"),
    ("fJ9rUzIMcZQ", "Queen - Bohemian Rhapsody", "Queen Official", "16億 回視聴"),
];

pub fn builtin_trending() -> Vec<VideoSummary> {
    BUILTIN_TRENDING
        .iter()
        .map(|(id, title, author, views)| VideoSummary {
            id: (*id).to_string(),
            title: (*title).to_string(),
            author: (*author).to_string(),
            thumbnail: normalize::thumbnail_url(id, "hqdefault"),
            views: (*views).to_string(),
            ..VideoSummary::default()
        })
        .collect()
}

pub struct Aggregator {
    client: UpstreamClient,
    mirrors: MirrorPool,
    endpoints: UpstreamEndpoints,
    api_key: Option<String>,
    cache: Arc<CacheStore>,
}

impl Aggregator {
    pub fn new(
        client: UpstreamClient,
        endpoints: UpstreamEndpoints,
        api_key: Option<String>,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            client,
            mirrors: MirrorPool::new(endpoints.instances.clone()),
            endpoints,
            api_key,
            cache,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// First-page search: the keyed API when a key is configured, otherwise
    /// (or when it fails) the mirrors.
    pub fn search(&self, query: &str) -> Vec<SearchResult> {
        if let Some(key) = self.api_key.as_deref() {
            let url = format!(
                "{}?part=snippet&type=video&q={}&maxResults={}&key={}",
                self.endpoints.search_api,
                urlencoding::encode(query),
                KEYED_SEARCH_RESULTS,
                urlencoding::encode(key),
            );
            match self.client.get_json::<normalize::DataApiSearch>(
                &url,
                KEYED_SEARCH_TIMEOUTS,
                RetryPolicy::SINGLE_ATTEMPT,
            ) {
                Ok(response) => return normalize::data_api_results(response),
                // The URL carries the key, so it stays out of the log.
                Err(err) => warn!(error = %err, "keyed search failed, using mirrors"),
            }
        }
        self.mirror_search(query, 1)
    }

    pub fn mirror_search(&self, query: &str, page: u32) -> Vec<SearchResult> {
        let path = format!(
            "/search?q={}&page={}&hl=jp",
            urlencoding::encode(query),
            page
        );
        self.mirrors
            .request::<Vec<Value>>(&self.client, &path, MIRROR_TIMEOUTS)
            .map(normalize::mirror_search_results)
            .unwrap_or_default()
    }

    /// Mirror detail first, then the secondary video API.
    pub fn video_info(&self, video_id: &str) -> Option<VideoDetail> {
        let path = format!("/videos/{}", urlencoding::encode(video_id));
        let raw = match self
            .mirrors
            .request(&self.client, &path, DETAIL_TIMEOUTS)
        {
            Some(mirror) => RawVideoDetail::Mirror(mirror),
            None => {
                info!(video_id, "mirrors exhausted, trying secondary video API");
                let url = format!(
                    "{}{}",
                    self.endpoints.edu_video_api,
                    urlencoding::encode(video_id)
                );
                match self
                    .client
                    .get_json(&url, EDU_VIDEO_TIMEOUTS, RetryPolicy::SINGLE_ATTEMPT)
                {
                    Ok(edu) => RawVideoDetail::Education(edu),
                    Err(err) => {
                        warn!(%url, error = %err, "secondary video API failed");
                        return None;
                    }
                }
            }
        };
        Some(raw.into_detail())
    }

    /// Resolves playback URLs. The progressive and HLS lookups are
    /// independent; either failing leaves only its own field empty.
    pub fn stream_urls(&self, video_id: &str) -> StreamUrlSet {
        let encoded = urlencoding::encode(video_id);
        let mut urls = StreamUrlSet {
            embed: format!("{}/embed/{}?autoplay=1", self.endpoints.embed_host, encoded),
            education: format!(
                "{}/embed/{}?{}",
                self.endpoints.education_embed_host,
                encoded,
                self.edu_params()
            ),
            ..StreamUrlSet::default()
        };

        let url = format!("{}{}", self.endpoints.stream_api, encoded);
        match self.client.get_json::<normalize::ProgressiveFormats>(
            &url,
            FORMAT_TIMEOUTS,
            RetryPolicy::SINGLE_ATTEMPT,
        ) {
            Ok(formats) => {
                let (primary, fallback) =
                    normalize::select_progressive(&formats.formats.unwrap_or_default());
                urls.primary = primary;
                urls.fallback = fallback;
            }
            Err(err) => debug!(%url, error = %err, "progressive formats unavailable"),
        }

        let url = format!("{}{}", self.endpoints.m3u8_api, encoded);
        match self.client.get_json::<normalize::HlsFormats>(
            &url,
            FORMAT_TIMEOUTS,
            RetryPolicy::SINGLE_ATTEMPT,
        ) {
            Ok(formats) => {
                urls.m3u8 = normalize::select_hls(&formats.m3u8_formats.unwrap_or_default());
            }
            Err(err) => debug!(%url, error = %err, "HLS formats unavailable"),
        }

        urls
    }

    pub fn playlist_info(&self, playlist_id: &str) -> Option<PlaylistInfo> {
        let path = format!("/playlists/{}", urlencoding::encode(playlist_id));
        self.mirrors
            .request(&self.client, &path, DETAIL_TIMEOUTS)
            .map(normalize::playlist_info)
    }

    pub fn channel_info(&self, channel_id: &str) -> Option<ChannelInfo> {
        let path = format!("/channels/{}", urlencoding::encode(channel_id));
        self.mirrors
            .request(&self.client, &path, DETAIL_TIMEOUTS)
            .map(normalize::channel_info)
    }

    /// One page of uploads. The continuation token is passed through as-is.
    pub fn channel_videos(
        &self,
        channel_id: &str,
        continuation: Option<&str>,
    ) -> Option<ChannelVideosPage> {
        let mut path = format!("/channels/{}/videos", urlencoding::encode(channel_id));
        if let Some(token) = continuation.filter(|token| !token.is_empty()) {
            path.push_str("?continuation=");
            path.push_str(&urlencoding::encode(token));
        }
        self.mirrors
            .request(&self.client, &path, DETAIL_TIMEOUTS)
            .map(normalize::channel_page)
    }

    pub fn comments(&self, video_id: &str) -> Vec<Comment> {
        let path = format!("/comments/{}?hl=jp", urlencoding::encode(video_id));
        self.mirrors
            .request(&self.client, &path, MIRROR_TIMEOUTS)
            .map(normalize::comments)
            .unwrap_or_default()
    }

    /// Cached popular videos; falls back to a built-in list that is never
    /// cached so the next call retries the mirrors.
    pub fn trending(&self) -> Vec<VideoSummary> {
        if let Some(cached) = self.cache.trending() {
            return cached;
        }
        let videos = self
            .mirrors
            .request::<Vec<Value>>(&self.client, "/popular", TRENDING_TIMEOUTS)
            .map(normalize::popular_videos)
            .unwrap_or_default();
        if videos.is_empty() {
            warn!("no trending data from mirrors, serving built-in list");
            return builtin_trending();
        }
        self.cache.store_trending(videos.clone());
        videos
    }

    pub fn suggestions(&self, keyword: &str) -> Vec<String> {
        let url = format!(
            "{}?client=firefox&ds=yt&q={}",
            self.endpoints.suggest_url,
            urlencoding::encode(keyword)
        );
        match self
            .client
            .get_json::<Value>(&url, SUGGEST_TIMEOUTS, RetryPolicy::SINGLE_ATTEMPT)
        {
            Ok(value) => normalize::suggestions(value),
            Err(err) => {
                debug!(%url, error = %err, "suggestions unavailable");
                Vec::new()
            }
        }
    }

    /// Query string for the education embed player.
    pub fn edu_params(&self) -> String {
        if let Some(cached) = self.cache.embed_params() {
            return cached;
        }
        let url = &self.endpoints.edu_config_url;
        match self.client.get_json::<normalize::EmbedConfig>(
            url,
            EMBED_CONFIG_TIMEOUTS,
            RetryPolicy::SINGLE_ATTEMPT,
        ) {
            Ok(config) => {
                let params = normalize::normalize_embed_params(&config.params.unwrap_or_default());
                if !params.is_empty() {
                    self.cache.store_embed_params(params.clone());
                }
                params
            }
            Err(err) => {
                info!(%url, error = %err, "embed config unavailable, using default params");
                DEFAULT_EMBED_PARAMS.to_string()
            }
        }
    }

    /// A video's thumbnail with the host's content type (`image/jpeg` when
    /// absent). Only successful fetches are cached.
    pub fn thumbnail(&self, video_id: &str) -> Option<Arc<ThumbnailImage>> {
        if let Some(image) = self.cache.thumbnail(video_id) {
            return Some(image);
        }
        let url = format!(
            "{}/vi/{}/hqdefault.jpg",
            self.endpoints.thumbnail_host.trim_end_matches('/'),
            urlencoding::encode(video_id)
        );
        match self.client.get_bytes(&url, THUMBNAIL_TIMEOUTS) {
            Ok(response) => {
                let content_type = response
                    .content_type
                    .filter(|value| !value.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_THUMBNAIL_TYPE.to_string());
                let image = Arc::new(ThumbnailImage {
                    content_type,
                    bytes: response.body,
                });
                self.cache.store_thumbnail(video_id, image.clone());
                Some(image)
            }
            Err(err) => {
                debug!(%url, error = %err, "thumbnail fetch failed");
                None
            }
        }
    }
}
