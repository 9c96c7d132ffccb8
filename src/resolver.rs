//! Resolving a video identifier into playlist variants and segments

use url::Url;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::playlist;
use crate::types::{PlaylistVariant, SegmentDescriptor, VideoKind, VideoRef};

/// Fetches and parses the playlists backing a [`VideoRef`].
#[derive(Clone)]
pub struct Resolver {
    client: reqwest::Client,
    api: ApiConfig,
}

impl Resolver {
    /// Build a resolver on top of a shared HTTP client
    pub fn new(client: reqwest::Client, api: ApiConfig) -> Self {
        Self { client, api }
    }

    /// Fetch the variant manifest for `video` and return its quality
    /// variants, best first.
    ///
    /// An unknown or inaccessible identifier, or a manifest with no
    /// variants at all, resolves to [`Error::NotFound`].
    pub async fn resolve(&self, video: &VideoRef) -> Result<Vec<PlaylistVariant>> {
        let url = self.manifest_url(video);
        tracing::info!(video = %video, url = %url, "resolving playlist variants");

        let text = match self.fetch_text(&url).await {
            Ok(text) => text,
            // Unlisted and deleted videos answer 403/404 at this endpoint
            Err(Error::Status { code: 403 | 404, .. }) => {
                return Err(Error::NotFound(video.to_string()));
            }
            Err(err) => return Err(err),
        };

        let variants = playlist::parse_variants(&text)?;
        if variants.is_empty() {
            return Err(Error::NotFound(video.to_string()));
        }

        tracing::debug!(video = %video, variants = variants.len(), "resolved variants");
        Ok(variants)
    }

    /// Fetch the media playlist of `variant` and return its segments in
    /// sequence order. Relative segment URIs resolve against the playlist
    /// URL.
    pub async fn fetch_segments(&self, variant: &PlaylistVariant) -> Result<Vec<SegmentDescriptor>> {
        let base = Url::parse(&variant.url).map_err(|err| {
            Error::MalformedPlaylist(format!("invalid variant URL '{}': {err}", variant.url))
        })?;
        let text = self.fetch_text(&variant.url).await?;
        playlist::parse_segments(&text, &base)
    }

    fn manifest_url(&self, video: &VideoRef) -> String {
        let base = match video.kind {
            VideoKind::Vod => &self.api.vod_playlist_base,
            VideoKind::Clip => &self.api.clip_playlist_base,
        };
        format!("{}/{}.m3u8", base.trim_end_matches('/'), video.id)
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.api.auth_token {
            request = request.header("Authorization", format!("OAuth {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MASTER: &str = "\
#EXTM3U
#EXT-X-MEDIA:TYPE=VIDEO,GROUP-ID=\"chunked\",NAME=\"720p60\",AUTOSELECT=YES,DEFAULT=YES
#EXT-X-STREAM-INF:BANDWIDTH=3442365,RESOLUTION=1280x720,VIDEO=\"chunked\"
chunked/index-dvr.m3u8
";

    fn api(server: &MockServer) -> ApiConfig {
        ApiConfig {
            vod_playlist_base: format!("{}/vod", server.uri()),
            clip_playlist_base: format!("{}/clip", server.uri()),
            auth_token: None,
        }
    }

    #[tokio::test]
    async fn resolves_variants_from_manifest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vod/123.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MASTER))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = Resolver::new(reqwest::Client::new(), api(&server));
        let variants = resolver.resolve(&VideoRef::vod("123")).await.unwrap();

        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].name, "720p60");
        assert!(variants[0].is_source);
    }

    #[tokio::test]
    async fn missing_video_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vod/999.m3u8"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let resolver = Resolver::new(reqwest::Client::new(), api(&server));
        let err = resolver.resolve(&VideoRef::vod("999")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn forbidden_video_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vod/777.m3u8"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let resolver = Resolver::new(reqwest::Client::new(), api(&server));
        let err = resolver.resolve(&VideoRef::vod("777")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn server_errors_surface_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vod/500.m3u8"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let resolver = Resolver::new(reqwest::Client::new(), api(&server));
        let err = resolver.resolve(&VideoRef::vod("500")).await.unwrap_err();
        assert!(matches!(err, Error::Status { code: 503, .. }));
    }

    #[tokio::test]
    async fn auth_token_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vod/123.m3u8"))
            .and(header("Authorization", "OAuth secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MASTER))
            .expect(1)
            .mount(&server)
            .await;

        let mut api = api(&server);
        api.auth_token = Some("secret-token".to_string());

        let resolver = Resolver::new(reqwest::Client::new(), api);
        resolver.resolve(&VideoRef::vod("123")).await.unwrap();
    }

    #[tokio::test]
    async fn clip_uses_the_clip_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip/FunnyPanda.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MASTER))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = Resolver::new(reqwest::Client::new(), api(&server));
        let variants = resolver
            .resolve(&VideoRef::clip("FunnyPanda"))
            .await
            .unwrap();
        assert_eq!(variants.len(), 1);
    }

    #[tokio::test]
    async fn segments_resolve_against_the_variant_url() {
        let server = MockServer::start().await;
        let media = "\
#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXTINF:10.0,
0.ts
#EXTINF:10.0,
1.ts
#EXT-X-ENDLIST
";
        Mock::given(method("GET"))
            .and(path("/vod/chunked/index-dvr.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(media))
            .mount(&server)
            .await;

        let resolver = Resolver::new(reqwest::Client::new(), api(&server));
        let variant = PlaylistVariant {
            name: "720p60".to_string(),
            group_id: "chunked".to_string(),
            resolution: Some("1280x720".to_string()),
            url: format!("{}/vod/chunked/index-dvr.m3u8", server.uri()),
            is_source: true,
        };

        let segments = resolver.fetch_segments(&variant).await.unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(
            segments[0].url,
            format!("{}/vod/chunked/0.ts", server.uri())
        );
    }
}
