//! Video transcoding, audio extraction and compression with ffmpeg.

use cf_core::{ConversionOutput, InputFile, VideoFormat, VideoOperation, VideoOptions};

use super::ffmpeg;
use crate::progress::ProgressSender;
use crate::tools::ToolRegistry;
use crate::workspace::Workspace;

/// CRF used by the compress operation regardless of `options.crf`.
const COMPRESS_CRF: u8 = 28;

pub async fn convert_video(
    tools: &ToolRegistry,
    file: &InputFile,
    options: &VideoOptions,
    progress: &ProgressSender,
) -> cf_core::Result<ConversionOutput> {
    let workspace = Workspace::create(file).await?;
    let mut cmd = ffmpeg::base_command(tools, workspace.input())?;
    let duration = ffmpeg::probe_duration(tools, workspace.input()).await;

    let (output_name, scratch_name) = match options.operation {
        VideoOperation::Transcode => {
            let ext = options.format.extension();
            cmd.args(transcode_args(options.format, options.crf));
            (format!("{}.{ext}", file.base_name()), format!("output.{ext}"))
        }
        VideoOperation::ExtractAudio => {
            cmd.args(["-vn", "-acodec", "libmp3lame", "-q:a", "2"]);
            (format!("{}.mp3", file.base_name()), "output.mp3".to_string())
        }
        VideoOperation::Compress => {
            cmd.args(compress_args());
            let ext = file.extension().unwrap_or_else(|| "mp4".to_string());
            (format!("compressed_{}", file.name), format!("output.{ext}"))
        }
    };
    cmd.arg(workspace.temp_file(&scratch_name).to_string_lossy().as_ref());

    tracing::info!(
        file = %file.name,
        operation = ?options.operation,
        format = ?options.format,
        crf = options.crf,
        "video conversion"
    );
    ffmpeg::run_with_progress(&cmd, duration, progress).await?;

    let bytes = workspace.read(&scratch_name).await?;
    Ok(ConversionOutput::new(output_name, bytes))
}

fn transcode_args(format: VideoFormat, crf: u8) -> Vec<String> {
    let crf = crf.to_string();
    let args: &[&str] = match format {
        VideoFormat::Mp4 => &["-c:v", "libx264", "-crf", &crf, "-c:a", "aac", "-movflags", "+faststart"],
        VideoFormat::Webm => &[
            "-c:v",
            "libvpx-vp9",
            "-crf",
            &crf,
            "-b:v",
            "0",
            "-deadline",
            "realtime",
            "-cpu-used",
            "8",
            "-row-mt",
            "1",
            "-c:a",
            "libopus",
        ],
    };
    args.iter().map(|s| s.to_string()).collect()
}

fn compress_args() -> Vec<String> {
    let crf = COMPRESS_CRF.to_string();
    ["-c:v", "libx264", "-crf", &crf, "-preset", "medium", "-c:a", "aac", "-b:a", "128k"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mp4_transcode_uses_x264_and_crf() {
        let args = transcode_args(VideoFormat::Mp4, 23);
        let joined = args.join(" ");
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-crf 23"));
        assert!(joined.contains("-c:a aac"));
    }

    #[test]
    fn webm_transcode_uses_vp9_and_opus() {
        let joined = transcode_args(VideoFormat::Webm, 31).join(" ");
        assert!(joined.contains("-c:v libvpx-vp9"));
        assert!(joined.contains("-crf 31"));
        assert!(joined.contains("-c:a libopus"));
    }

    #[test]
    fn compress_uses_fixed_crf() {
        assert!(compress_args().join(" ").contains("-crf 28"));
    }

    #[tokio::test]
    async fn missing_ffmpeg_is_tool_error() {
        let tools = ToolRegistry::from_tools([]);
        let file = InputFile::new("clip.mov", vec![0u8; 8]);
        let err = convert_video(&tools, &file, &VideoOptions::default(), &ProgressSender::noop())
            .await
            .unwrap_err();
        assert!(matches!(err, cf_core::Error::Tool { ref tool, .. } if tool == "ffmpeg"));
    }
}
