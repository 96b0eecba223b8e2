//! Camera RAW development via dcraw, re-encoded with the `image` crate.

use ::image::ImageFormat as Codec;
use cf_core::{
    AdapterKind, ConversionOutput, Error, ImageFormat, InputFile, RawFormat, RawImageOptions,
    WhiteBalance,
};

use crate::progress::ProgressSender;
use crate::tools::ToolRegistry;
use crate::workspace::Workspace;

/// Develop a RAW file and encode it as `options.format`.
///
/// dcraw writes a 16-bit TIFF to stdout (`-c -T`); the TIFF is then decoded
/// and re-encoded in-process.
pub async fn convert_raw(
    tools: &ToolRegistry,
    file: &InputFile,
    options: &RawImageOptions,
    progress: &ProgressSender,
) -> cf_core::Result<ConversionOutput> {
    let dcraw = tools.require("dcraw")?;
    let workspace = Workspace::create(file).await?;

    let mut cmd = dcraw.command();
    cmd.args(dcraw_args(options));
    cmd.arg(workspace.input().to_string_lossy().as_ref());

    tracing::info!(file = %file.name, half_size = options.half_size, "developing raw image");
    let output = cmd.execute().await?;
    if output.stdout.is_empty() {
        return Err(Error::adapter(
            AdapterKind::RawImage,
            format!("dcraw produced no image data for {}", file.name),
        ));
    }
    progress.send(60.0, "developed");

    let format = options.format;
    let quality = options.quality;
    let tiff = output.stdout;
    let encoded = tokio::task::spawn_blocking(move || {
        let img = ::image::load_from_memory_with_format(&tiff, Codec::Tiff).map_err(|e| {
            Error::adapter(AdapterKind::RawImage, format!("failed to decode developed TIFF: {e}"))
        })?;
        super::image::encode(&img, target_format(format), quality)
    })
    .await
    .map_err(|e| Error::Internal(format!("raw encode task failed: {e}")))??;
    progress.send(100.0, "encoded");

    Ok(ConversionOutput::new(
        format!("{}.{}", file.base_name(), format.extension()),
        encoded,
    ))
}

fn dcraw_args(options: &RawImageOptions) -> Vec<&'static str> {
    let mut args = vec!["-c", "-T"];
    if options.white_balance == WhiteBalance::Camera {
        args.push("-w");
    } else {
        args.push("-a");
    }
    if options.half_size {
        args.push("-h");
    }
    args
}

fn target_format(format: RawFormat) -> ImageFormat {
    match format {
        RawFormat::Jpeg => ImageFormat::Jpeg,
        RawFormat::Tiff => ImageFormat::Tiff,
        RawFormat::Png => ImageFormat::Png,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_follow_options() {
        let mut options = RawImageOptions::default();
        assert_eq!(dcraw_args(&options), vec!["-c", "-T", "-a"]);

        options.white_balance = WhiteBalance::Camera;
        options.half_size = true;
        assert_eq!(dcraw_args(&options), vec!["-c", "-T", "-w", "-h"]);
    }

    #[tokio::test]
    async fn missing_dcraw_is_tool_error() {
        let tools = ToolRegistry::from_tools([]);
        let file = InputFile::new("IMG_0001.CR2", vec![0u8; 8]);
        let err = convert_raw(&tools, &file, &RawImageOptions::default(), &ProgressSender::noop())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tool { ref tool, .. } if tool == "dcraw"));
    }
}
