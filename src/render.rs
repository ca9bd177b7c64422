//! Server-side HTML for the browsable pages.
//!
//! Plain text coming from upstreams goes through [`h`]; description and
//! comment bodies are already HTML and are inserted as provided.

use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::{
    models::{
        ChannelInfo, ChannelSummary, Comment, PlaylistInfo, PlaylistSummary, SearchResult,
        StreamUrlSet, VideoDetail, VideoSummary,
    },
    session::Preferences,
};

pub const NO_COMMENTS: &str = r#"<p class="no-comments">コメントはありません</p>"#;

fn h(s: &str) -> String {
    encode_text(s).to_string()
}

fn attr(s: &str) -> String {
    encode_double_quoted_attribute(s).to_string()
}

/// Player variant selected by the watch route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Stream,
    High,
    Embed,
    Education,
}

impl WatchMode {
    pub const ALL: [Self; 4] = [Self::Stream, Self::High, Self::Embed, Self::Education];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::High => "high",
            Self::Embed => "embed",
            Self::Education => "education",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::Stream => "/watch",
            Self::High => "/w",
            Self::Embed => "/ume",
            Self::Education => "/edu",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Stream => "ストリーム",
            Self::High => "高画質",
            Self::Embed => "埋め込み",
            Self::Education => "Education",
        }
    }
}

fn layout(title: &str, prefs: &Preferences, query: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="ja" data-theme="{theme}">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title} - チョコTube</title>
  <link rel="stylesheet" href="/static/style.css">
</head>
<body class="theme-{theme}">
  <header class="site-header">
    <a href="/" class="logo">チョコTube</a>
    <form action="/search" method="get" class="search-form">
      <input type="search" name="q" value="{query}" list="suggestions" autocomplete="off" id="search-input">
      <datalist id="suggestions"></datalist>
      <button type="submit">検索</button>
    </form>
  </header>
  <main>
{body}
  </main>
  <script>
    const input = document.getElementById('search-input');
    const list = document.getElementById('suggestions');
    input.addEventListener('input', async () => {{
      if (!input.value) return;
      const res = await fetch('/suggest?keyword=' + encodeURIComponent(input.value));
      const words = await res.json();
      list.replaceChildren(...words.map((w) => Object.assign(document.createElement('option'), {{ value: w }})));
    }});
  </script>
</body>
</html>
"#,
        theme = attr(&prefs.theme),
        title = h(title),
        query = attr(query),
        body = body,
    )
}

fn thumbnail_src(video_id: &str, upstream: &str, prefs: &Preferences) -> String {
    if prefs.uses_proxy() || upstream.is_empty() {
        format!("/thumbnail?v={}", urlencoding::encode(video_id))
    } else {
        upstream.to_string()
    }
}

fn video_card(video: &VideoSummary, prefs: &Preferences) -> String {
    let watch = format!("/watch?v={}", urlencoding::encode(&video.id));
    let mut meta = Vec::new();
    if !video.views.is_empty() {
        meta.push(h(&video.views));
    }
    if !video.published.is_empty() {
        meta.push(h(&video.published));
    }
    let length = if video.length.is_empty() {
        String::new()
    } else {
        format!(r#"<span class="video-length">{}</span>"#, h(&video.length))
    };
    let author = if video.author_id.is_empty() {
        format!(r#"<span class="video-author">{}</span>"#, h(&video.author))
    } else {
        format!(
            r#"<a href="/channel/{}" class="video-author">{}</a>"#,
            attr(&urlencoding::encode(&video.author_id)),
            h(&video.author)
        )
    };
    format!(
        r#"<div class="video-card">
  <a href="{watch}" class="thumb-wrap"><img src="{thumb}" alt="" loading="lazy">{length}</a>
  <a href="{watch}" class="video-title" title="{title_attr}">{title}</a>
  {author}
  <div class="video-meta">{meta}</div>
</div>
"#,
        watch = attr(&watch),
        thumb = attr(&thumbnail_src(&video.id, &video.thumbnail, prefs)),
        title_attr = attr(&video.title),
        title = h(&video.title),
        meta = meta.join(" ・ "),
    )
}

fn channel_card(channel: &ChannelSummary) -> String {
    format!(
        r#"<div class="channel-card">
  <a href="/channel/{id}"><img src="{thumb}" alt="" class="channel-icon" loading="lazy"></a>
  <a href="/channel/{id}" class="channel-name">{name}</a>
  <div class="channel-meta">登録者 {subs}</div>
</div>
"#,
        id = attr(&urlencoding::encode(&channel.id)),
        thumb = attr(&channel.thumbnail),
        name = h(&channel.author),
        subs = channel.subscribers,
    )
}

fn playlist_card(playlist: &PlaylistSummary) -> String {
    format!(
        r#"<div class="playlist-card">
  <a href="/playlist?list={id}"><img src="{thumb}" alt="" loading="lazy"></a>
  <a href="/playlist?list={id}" class="playlist-title">{title}</a>
  <div class="playlist-meta">{count} 本の動画</div>
</div>
"#,
        id = attr(&urlencoding::encode(&playlist.id)),
        thumb = attr(&playlist.thumbnail),
        title = h(&playlist.title),
        count = playlist.count,
    )
}

fn video_grid(videos: &[VideoSummary], prefs: &Preferences) -> String {
    let mut html = String::from("<div class=\"video-grid\">\n");
    for video in videos {
        html.push_str(&video_card(video, prefs));
    }
    html.push_str("</div>\n");
    html
}

pub fn login_page(error: Option<&str>) -> String {
    let error = error
        .map(|message| format!(r#"<p class="login-error">{}</p>"#, h(message)))
        .unwrap_or_default();
    let body = format!(
        r#"<section class="login">
  <h1>ログイン</h1>
  {error}
  <form action="/login" method="post">
    <input type="password" name="password" placeholder="パスワード" autofocus>
    <button type="submit">ログイン</button>
  </form>
</section>"#
    );
    layout("ログイン", &Preferences::default(), "", &body)
}

pub fn index_page(videos: &[VideoSummary], prefs: &Preferences) -> String {
    let body = format!("<h1>急上昇</h1>\n{}", video_grid(videos, prefs));
    layout("ホーム", prefs, "", &body)
}

/// `next` is the link to the following result page, if any.
pub fn search_page(
    query: &str,
    results: &[SearchResult],
    next: Option<&str>,
    prefs: &Preferences,
) -> String {
    let mut body = format!(
        r#"<h1>「{}」の検索結果</h1>
<div class="search-results vc-{}">
"#,
        h(query),
        attr(&prefs.vc)
    );
    for result in results {
        body.push_str(&match result {
            SearchResult::Video(video) => video_card(video, prefs),
            SearchResult::Channel(channel) => channel_card(channel),
            SearchResult::Playlist(playlist) => playlist_card(playlist),
        });
    }
    if results.is_empty() && !query.is_empty() {
        body.push_str("<p class=\"empty\">結果が見つかりませんでした</p>\n");
    }
    body.push_str("</div>\n");
    if let Some(next) = next {
        let _ = writeln!(
            body,
            r#"<a href="{}" class="next-page">次のページ</a>"#,
            attr(next)
        );
    }
    layout(query, prefs, query, &body)
}

pub fn search_next_link(query: &str, page: u32) -> String {
    format!(
        "/search?q={}&page={}",
        urlencoding::encode(query),
        page.saturating_add(1)
    )
}

fn player(mode: WatchMode, video: Option<&VideoDetail>, streams: &StreamUrlSet) -> String {
    let iframe = |src: &str| {
        format!(
            r#"<iframe src="{}" class="player" allow="autoplay; encrypted-media; fullscreen" allowfullscreen></iframe>"#,
            attr(src)
        )
    };
    let video_tag = |src: &str| {
        format!(
            r#"<video src="{}" class="player" controls autoplay playsinline></video>"#,
            attr(src)
        )
    };

    match mode {
        WatchMode::Embed => iframe(&streams.embed),
        WatchMode::Education => iframe(&streams.education),
        WatchMode::High => {
            let split = video.and_then(|detail| {
                Some((detail.highstream_url.as_deref()?, detail.audio_url.as_deref()?))
            });
            match split {
                Some((video_url, audio_url)) => format!(
                    r#"<video id="high-video" src="{}" class="player" controls autoplay playsinline muted></video>
<audio id="high-audio" src="{}" autoplay></audio>
<script>
  const v = document.getElementById('high-video');
  const a = document.getElementById('high-audio');
  v.addEventListener('play', () => {{ a.currentTime = v.currentTime; a.play(); }});
  v.addEventListener('pause', () => a.pause());
  v.addEventListener('seeked', () => {{ a.currentTime = v.currentTime; }});
</script>"#,
                    attr(video_url),
                    attr(audio_url)
                ),
                None => match streams.m3u8.as_deref() {
                    Some(url) => video_tag(url),
                    None => player(WatchMode::Stream, video, streams),
                },
            }
        }
        WatchMode::Stream => {
            let direct = streams
                .primary
                .as_deref()
                .or(streams.fallback.as_deref())
                .or_else(|| {
                    video.and_then(|detail| detail.video_urls.first().map(String::as_str))
                })
                .or(streams.m3u8.as_deref());
            match direct {
                Some(url) => video_tag(url),
                None => iframe(&streams.embed),
            }
        }
    }
}

fn comment_item(comment: &Comment) -> String {
    format!(
        r#"<div class="comment">
  <img src="{thumb}" alt="{author_attr}" class="comment-avatar" loading="lazy">
  <div class="comment-content">
    <div class="comment-header">
      <a href="/channel/{author_id}" class="comment-author">{author}</a>
      <span class="comment-date">{published}</span>
    </div>
    <div class="comment-text">{content}</div>
    <div class="comment-likes">👍 {likes}</div>
  </div>
</div>
"#,
        thumb = attr(&comment.author_thumbnail),
        author_attr = attr(&comment.author),
        author_id = attr(&urlencoding::encode(&comment.author_id)),
        author = h(&comment.author),
        published = h(&comment.published),
        content = comment.content,
        likes = comment.likes,
    )
}

/// Comment list returned by `/comments`, or a placeholder when empty.
pub fn comments_fragment(comments: &[Comment]) -> String {
    if comments.is_empty() {
        return NO_COMMENTS.to_string();
    }
    comments.iter().map(comment_item).collect()
}

pub struct WatchPage<'a> {
    pub video_id: &'a str,
    pub mode: WatchMode,
    pub video: Option<&'a VideoDetail>,
    pub streams: &'a StreamUrlSet,
    pub comments: &'a [Comment],
    pub prefs: &'a Preferences,
}

pub fn watch_page(page: &WatchPage<'_>) -> String {
    let encoded_id = urlencoding::encode(page.video_id);
    let mut body = String::new();
    let _ = writeln!(
        body,
        r#"<section class="watch mode-{}">"#,
        page.mode.as_str()
    );
    body.push_str(&player(page.mode, page.video, page.streams));
    body.push_str("\n<nav class=\"watch-modes\">");
    for mode in WatchMode::ALL {
        let class = if mode == page.mode { " class=\"active\"" } else { "" };
        let _ = write!(
            body,
            r#"<a href="{}?v={}"{}>{}</a>"#,
            mode.path(),
            attr(&encoded_id),
            class,
            mode.label()
        );
    }
    body.push_str("</nav>\n");

    match page.video {
        Some(video) => {
            let _ = write!(
                body,
                r#"<h1 class="video-title">{title}</h1>
<div class="video-stats">{views} 回視聴 ・ 👍 {likes} ・ {published}{length}</div>
<div class="channel-row">
  <a href="/channel/{author_id}"><img src="{author_thumb}" alt="" class="channel-icon"></a>
  <a href="/channel/{author_id}" class="channel-name">{author}</a>
  <span class="subscribers">{subscribers}</span>
</div>
<div class="video-description">{description}</div>
"#,
                title = h(&video.title),
                views = h(&video.views),
                likes = h(&video.likes),
                published = h(&video.published),
                length = if video.length_text.is_empty() {
                    String::new()
                } else {
                    format!(" ・ {}", h(&video.length_text))
                },
                author_id = attr(&urlencoding::encode(&video.author_id)),
                author_thumb = attr(&video.author_thumbnail),
                author = h(&video.author),
                subscribers = h(&video.subscribers),
                description = video.description,
            );
        }
        None => body.push_str("<p class=\"unavailable\">動画情報を取得できませんでした</p>\n"),
    }

    body.push_str("<section class=\"comments\">\n<h2>コメント</h2>\n");
    body.push_str(&comments_fragment(page.comments));
    body.push_str("</section>\n</section>\n");

    if let Some(video) = page.video
        && !video.related.is_empty()
    {
        body.push_str("<aside class=\"related\">\n<h2>関連動画</h2>\n");
        body.push_str(&video_grid(&video.related, page.prefs));
        body.push_str("</aside>\n");
    }

    let title = page.video.map(|video| video.title.as_str()).unwrap_or(page.video_id);
    layout(title, page.prefs, "", &body)
}

pub fn channel_page(
    channel_id: &str,
    channel: Option<&ChannelInfo>,
    videos: &[VideoSummary],
    continuation: &str,
    prefs: &Preferences,
) -> String {
    let Some(channel) = channel else {
        let body = "<p class=\"unavailable\">チャンネル情報を取得できませんでした</p>";
        return layout(channel_id, prefs, "", body);
    };

    let mut body = String::new();
    if !channel.author_banner.is_empty() {
        let _ = writeln!(
            body,
            r#"<img src="{}" alt="" class="channel-banner">"#,
            attr(&channel.author_banner)
        );
    }
    let tags: String = channel
        .tags
        .iter()
        .map(|tag| format!(r#"<span class="tag">{}</span>"#, h(tag)))
        .collect();
    let _ = write!(
        body,
        r#"<div class="channel-header">
  <img src="{icon}" alt="" class="channel-icon">
  <div>
    <h1>{name}</h1>
    <div class="channel-meta">登録者 {subs} ・ {count} 本の動画</div>
    <div class="channel-tags">{tags}</div>
  </div>
</div>
<div class="channel-profile">{profile}</div>
"#,
        icon = attr(&channel.channel_icon),
        name = h(&channel.channel_name),
        subs = channel.subscribers,
        count = channel.video_count,
        tags = tags,
        profile = channel.channel_profile,
    );
    body.push_str(&format!(
        r#"<div id="channel-videos" class="vc-{}">
{}</div>
"#,
        attr(&prefs.vc),
        video_grid(videos, prefs)
    ));
    if !continuation.is_empty() {
        let _ = write!(
            body,
            r#"<button id="load-more" data-channel="{channel}" data-continuation="{token}">もっと見る</button>
<script>
  const more = document.getElementById('load-more');
  more.addEventListener('click', async () => {{
    const url = '/api/channel/' + encodeURIComponent(more.dataset.channel)
      + '/videos?continuation=' + encodeURIComponent(more.dataset.continuation);
    const page = await (await fetch(url)).json();
    const grid = document.querySelector('#channel-videos .video-grid');
    for (const v of page.videos) {{
      const card = document.createElement('a');
      card.className = 'video-card';
      card.href = '/watch?v=' + encodeURIComponent(v.id);
      card.textContent = v.title;
      grid.appendChild(card);
    }}
    if (page.continuation) {{ more.dataset.continuation = page.continuation; }} else {{ more.remove(); }}
  }});
</script>
"#,
            channel = attr(channel_id),
            token = attr(continuation),
        );
    }
    layout(&channel.channel_name, prefs, "", &body)
}

pub fn playlist_page(playlist: Option<&PlaylistInfo>, prefs: &Preferences) -> String {
    let Some(playlist) = playlist else {
        let body = "<p class=\"unavailable\">プレイリストを取得できませんでした</p>";
        return layout("プレイリスト", prefs, "", body);
    };
    let body = format!(
        r#"<div class="playlist-header">
  <h1>{title}</h1>
  <a href="/channel/{author_id}" class="playlist-author">{author}</a>
  <div class="playlist-meta">{videos} 本の動画 ・ {views} 回視聴</div>
  <p class="playlist-description">{description}</p>
</div>
<div class="vc-{vc}">
{grid}</div>
"#,
        title = h(&playlist.title),
        author_id = attr(&urlencoding::encode(&playlist.author_id)),
        author = h(&playlist.author),
        videos = playlist.video_count,
        views = playlist.view_count,
        description = h(&playlist.description),
        vc = attr(&prefs.vc),
        grid = video_grid(&playlist.videos, prefs),
    );
    layout(&playlist.title, prefs, "", &body)
}
