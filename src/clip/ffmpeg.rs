//! ffmpeg invocations for clip slicing and audio demuxing.
//!
//! The multiplexer must be discoverable on PATH. Command forms are fixed:
//! clipping uses stream copy with the ADTS bitstream filter, audio demux
//! re-encodes to 192 kbps 44.1 kHz MP3.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum FfmpegError {
    #[error("ffmpeg not found in PATH")]
    NotFound,
    #[error("Failed to spawn ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("ffmpeg exited with {0}")]
    NonZeroExit(std::process::ExitStatus),
}

/// Checks that ffmpeg is available.
pub async fn check_ffmpeg() -> Result<(), FfmpegError> {
    let status = Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|_| FfmpegError::NotFound)?;

    if !status.success() {
        return Err(FfmpegError::NotFound);
    }

    Ok(())
}

/// Builds the clip argument list:
/// `[-ss <start>] -i <url> -c copy -bsf:a aac_adtstoasc [-to <dur>] -y <out>`.
pub fn clip_args(m3u8_url: &str, output: &Path, start_time: f64, end_time: f64) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        m3u8_url.to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-bsf:a".to_string(),
        "aac_adtstoasc".to_string(),
    ];

    if start_time > 0.0 {
        let mut with_seek = vec!["-ss".to_string(), format!("{:.2}", start_time)];
        with_seek.append(&mut args);
        args = with_seek;
    }
    if end_time > 0.0 {
        args.push("-to".to_string());
        args.push(format!("{:.2}", end_time));
    }

    args.push("-y".to_string());
    args.push(output.to_string_lossy().to_string());

    args
}

/// Slices a clip out of an HLS playlist into an mp4.
pub async fn download_clip(
    m3u8_url: &str,
    output: &Path,
    start_time: f64,
    end_time: f64,
) -> Result<(), FfmpegError> {
    let args = clip_args(m3u8_url, output, start_time, end_time);
    debug!("ffmpeg {}", args.join(" "));

    run_ffmpeg(&args).await
}

/// Demuxes audio from a video into an mp3.
pub async fn extract_audio(video: &Path, audio: &Path) -> Result<(), FfmpegError> {
    let args = vec![
        "-i".to_string(),
        video.to_string_lossy().to_string(),
        "-vn".to_string(),
        "-acodec".to_string(),
        "libmp3lame".to_string(),
        "-ab".to_string(),
        "192k".to_string(),
        "-ar".to_string(),
        "44100".to_string(),
        "-y".to_string(),
        audio.to_string_lossy().to_string(),
    ];
    debug!("ffmpeg {}", args.join(" "));

    run_ffmpeg(&args).await
}

async fn run_ffmpeg(args: &[String]) -> Result<(), FfmpegError> {
    let status = Command::new("ffmpeg")
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;

    if !status.success() {
        return Err(FfmpegError::NonZeroExit(status));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_clip_args_with_start_and_end() {
        let args = clip_args(
            "https://example.com/v.m3u8",
            &PathBuf::from("out.mp4"),
            90.0,
            420.0,
        );
        assert_eq!(
            args,
            vec![
                "-ss",
                "90.00",
                "-i",
                "https://example.com/v.m3u8",
                "-c",
                "copy",
                "-bsf:a",
                "aac_adtstoasc",
                "-to",
                "420.00",
                "-y",
                "out.mp4"
            ]
        );
    }

    #[test]
    fn test_clip_args_zero_start_omits_seek() {
        let args = clip_args(
            "https://example.com/v.m3u8",
            &PathBuf::from("out.mp4"),
            0.0,
            420.0,
        );
        assert_eq!(args[0], "-i");
        assert!(!args.contains(&"-ss".to_string()));
        assert!(args.contains(&"-to".to_string()));
    }

    #[test]
    fn test_clip_args_zero_end_omits_to() {
        let args = clip_args(
            "https://example.com/v.m3u8",
            &PathBuf::from("out.mp4"),
            10.0,
            0.0,
        );
        assert!(args.contains(&"-ss".to_string()));
        assert!(!args.contains(&"-to".to_string()));
    }
}
