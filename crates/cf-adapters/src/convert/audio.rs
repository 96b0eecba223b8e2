//! Audio transcoding and compression with ffmpeg.

use cf_core::{AudioFormat, AudioOperation, AudioOptions, ConversionOutput, InputFile};

use super::ffmpeg;
use crate::progress::ProgressSender;
use crate::tools::ToolRegistry;
use crate::workspace::Workspace;

pub async fn convert_audio(
    tools: &ToolRegistry,
    file: &InputFile,
    options: &AudioOptions,
    progress: &ProgressSender,
) -> cf_core::Result<ConversionOutput> {
    let workspace = Workspace::create(file).await?;
    let mut cmd = ffmpeg::base_command(tools, workspace.input())?;
    let duration = ffmpeg::probe_duration(tools, workspace.input()).await;

    let (output_name, scratch_name) = match options.operation {
        AudioOperation::Convert => {
            let ext = options.format.extension();
            cmd.arg("-vn");
            cmd.args(codec_args(options.format, options.quality));
            (format!("{}.{ext}", file.base_name()), format!("output.{ext}"))
        }
        AudioOperation::Compress => {
            cmd.args(["-vn", "-c:a", "libmp3lame", "-q:a", "4", "-ar", "44100", "-ac", "2"]);
            (
                format!("compressed_{}.mp3", file.base_name()),
                "output.mp3".to_string(),
            )
        }
    };
    cmd.arg(workspace.temp_file(&scratch_name).to_string_lossy().as_ref());

    tracing::info!(file = %file.name, operation = ?options.operation, format = ?options.format, "audio conversion");
    ffmpeg::run_with_progress(&cmd, duration, progress).await?;

    let bytes = workspace.read(&scratch_name).await?;
    Ok(ConversionOutput::new(output_name, bytes))
}

fn codec_args(format: AudioFormat, quality: u8) -> Vec<String> {
    let q = quality.to_string();
    match format {
        AudioFormat::Mp3 => vec!["-c:a".into(), "libmp3lame".into(), "-q:a".into(), q],
        AudioFormat::Wav => vec!["-c:a".into(), "pcm_s16le".into()],
        // libvorbis quality runs the other way (10 is best).
        AudioFormat::Ogg => vec![
            "-c:a".into(),
            "libvorbis".into(),
            "-q:a".into(),
            (10u8.saturating_sub(quality)).to_string(),
        ],
        AudioFormat::Flac => vec!["-c:a".into(), "flac".into()],
        AudioFormat::Aac => vec!["-c:a".into(), "aac".into(), "-b:a".into(), aac_bitrate(quality).into()],
    }
}

fn aac_bitrate(quality: u8) -> &'static str {
    match quality {
        0..=1 => "256k",
        2..=3 => "192k",
        4..=6 => "128k",
        _ => "96k",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mp3_uses_vbr_quality() {
        assert_eq!(codec_args(AudioFormat::Mp3, 2), vec!["-c:a", "libmp3lame", "-q:a", "2"]);
    }

    #[test]
    fn ogg_quality_is_inverted() {
        assert_eq!(codec_args(AudioFormat::Ogg, 2), vec!["-c:a", "libvorbis", "-q:a", "8"]);
    }

    #[test]
    fn lossless_formats_ignore_quality() {
        assert_eq!(codec_args(AudioFormat::Wav, 9), vec!["-c:a", "pcm_s16le"]);
        assert_eq!(codec_args(AudioFormat::Flac, 0), vec!["-c:a", "flac"]);
    }

    #[test]
    fn aac_bitrate_tiers() {
        assert_eq!(aac_bitrate(0), "256k");
        assert_eq!(aac_bitrate(5), "128k");
        assert_eq!(aac_bitrate(9), "96k");
    }

    #[tokio::test]
    async fn missing_ffmpeg_is_tool_error() {
        let tools = ToolRegistry::from_tools([]);
        let file = InputFile::new("song.wav", vec![0u8; 8]);
        let err = convert_audio(&tools, &file, &AudioOptions::default(), &ProgressSender::noop())
            .await
            .unwrap_err();
        assert!(matches!(err, cf_core::Error::Tool { ref tool, .. } if tool == "ffmpeg"));
    }
}
