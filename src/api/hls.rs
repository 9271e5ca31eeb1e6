//! Twitch Usher HLS playlist handling.
//!
//! Builds the VOD playlist URL from a playback access token, parses the
//! master playlist into quality options and selects a rendition.

use std::time::Duration;

use regex::Regex;

#[derive(thiserror::Error, Debug)]
pub enum HlsError {
    #[error("Request failed")]
    Request(#[from] reqwest::Error),
    #[error("Usher returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("No renditions found in master playlist")]
    NoRenditions,
}

/// One rendition from the master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityOption {
    pub name: String,
    pub resolution: String,
    pub url: String,
    pub bandwidth: u64,
}

/// Builds the usher playlist URL for a VOD.
pub fn playlist_url(vod_id: &str, token: &str, signature: &str) -> String {
    format!(
        "https://usher.ttvnw.net/vod/{}.m3u8?token={}&sig={}&allow_source=true&player=twitchweb",
        vod_id, token, signature
    )
}

/// Parses a master playlist body into quality options.
///
/// Each `#EXT-X-MEDIA` line is paired with the following
/// `#EXT-X-STREAM-INF` line plus the URL on the line after it.
pub fn parse_master_playlist(body: &str) -> Vec<QualityOption> {
    let name_re = Regex::new(r#"NAME="([^"]+)""#).unwrap();
    let bandwidth_re = Regex::new(r"BANDWIDTH=(\d+)").unwrap();
    let resolution_re = Regex::new(r"RESOLUTION=(\d+x\d+)").unwrap();

    let lines: Vec<&str> = body.lines().collect();
    let mut qualities = Vec::new();

    for i in 0..lines.len() {
        let line = lines[i].trim();
        if !line.starts_with("#EXT-X-MEDIA") {
            continue;
        }

        let Some(name) = name_re
            .captures(line)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
        else {
            continue;
        };

        if i + 2 >= lines.len() || !lines[i + 1].starts_with("#EXT-X-STREAM-INF") {
            continue;
        }

        let stream_info = lines[i + 1];
        let url = lines[i + 2].trim().to_string();

        let bandwidth = bandwidth_re
            .captures(stream_info)
            .and_then(|cap| cap.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);

        let resolution = resolution_re
            .captures(stream_info)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        qualities.push(QualityOption {
            name,
            resolution,
            url,
            bandwidth,
        });
    }

    qualities
}

/// Selects a rendition by case-insensitive substring match on the name,
/// falling back to the first (usually highest) rendition.
pub fn select_quality<'a>(
    qualities: &'a [QualityOption],
    preferred: &str,
) -> Option<&'a QualityOption> {
    if qualities.is_empty() {
        return None;
    }

    if !preferred.is_empty() {
        let preferred_lower = preferred.to_lowercase();
        if let Some(q) = qualities
            .iter()
            .find(|q| q.name.to_lowercase().contains(&preferred_lower))
        {
            return Some(q);
        }
    }

    qualities.first()
}

/// Fetches and parses the master playlist for a VOD.
pub async fn fetch_master_playlist(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<QualityOption>, HlsError> {
    let resp = client
        .get(url)
        .timeout(Duration::from_secs(30))
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(HlsError::Status(resp.status()));
    }

    let body = resp.text().await?;
    let qualities = parse_master_playlist(&body);

    if qualities.is_empty() {
        return Err(HlsError::NoRenditions);
    }

    Ok(qualities)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"#EXTM3U
#EXT-X-TWITCH-INFO:ORIGIN="s3"
#EXT-X-MEDIA:TYPE=VIDEO,GROUP-ID="chunked",NAME="1080p60",AUTOSELECT=YES,DEFAULT=YES
#EXT-X-STREAM-INF:BANDWIDTH=6000000,CODECS="avc1.64002A,mp4a.40.2",RESOLUTION=1920x1080,VIDEO="chunked",FRAME-RATE=60.000
https://example.ttvnw.net/chunked/index-dvr.m3u8
#EXT-X-MEDIA:TYPE=VIDEO,GROUP-ID="720p30",NAME="720p",AUTOSELECT=YES,DEFAULT=YES
#EXT-X-STREAM-INF:BANDWIDTH=2000000,CODECS="avc1.4D401F,mp4a.40.2",RESOLUTION=1280x720,VIDEO="720p30"
https://example.ttvnw.net/720p30/index-dvr.m3u8
#EXT-X-MEDIA:TYPE=VIDEO,GROUP-ID="audio_only",NAME="Audio Only",AUTOSELECT=NO,DEFAULT=NO
#EXT-X-STREAM-INF:BANDWIDTH=160000,CODECS="mp4a.40.2",VIDEO="audio_only"
https://example.ttvnw.net/audio_only/index-dvr.m3u8
"#;

    #[test]
    fn test_parse_master_playlist() {
        let qualities = parse_master_playlist(SAMPLE);
        assert_eq!(qualities.len(), 3);

        assert_eq!(qualities[0].name, "1080p60");
        assert_eq!(qualities[0].resolution, "1920x1080");
        assert_eq!(qualities[0].bandwidth, 6000000);
        assert_eq!(
            qualities[0].url,
            "https://example.ttvnw.net/chunked/index-dvr.m3u8"
        );

        // audio-only entries have no RESOLUTION attribute
        assert_eq!(qualities[2].name, "Audio Only");
        assert!(qualities[2].resolution.is_empty());
    }

    #[test]
    fn test_select_quality_substring_match() {
        let qualities = parse_master_playlist(SAMPLE);

        let q = select_quality(&qualities, "720p").unwrap();
        assert_eq!(q.name, "720p");

        let q = select_quality(&qualities, "audio only").unwrap();
        assert_eq!(q.name, "Audio Only");
    }

    #[test]
    fn test_select_quality_falls_back_to_first() {
        let qualities = parse_master_playlist(SAMPLE);

        let q = select_quality(&qualities, "4k").unwrap();
        assert_eq!(q.name, "1080p60");

        let q = select_quality(&qualities, "").unwrap();
        assert_eq!(q.name, "1080p60");
    }

    #[test]
    fn test_select_quality_empty_list() {
        assert!(select_quality(&[], "720p").is_none());
    }

    #[test]
    fn test_playlist_url() {
        let url = playlist_url("123456", "tok", "sig");
        assert_eq!(
            url,
            "https://usher.ttvnw.net/vod/123456.m3u8?token=tok&sig=sig&allow_source=true&player=twitchweb"
        );
    }
}
