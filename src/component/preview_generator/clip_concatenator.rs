use crate::component::derivative::GenerationError;
use crate::tools::{CancelToken, FfmpegCommand, FrameSize, ToolRunner};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// 寫出 concat demuxer 使用的清單檔
pub fn write_concat_list(list_path: &Path, clips: &[PathBuf]) -> std::io::Result<()> {
    let body: String = clips
        .iter()
        .map(|clip| {
            let escaped = clip.to_string_lossy().replace('\'', r"'\''");
            format!("file '{escaped}'\n")
        })
        .collect();
    fs::write(list_path, body)
}

pub fn concat_clips(
    runner: &dyn ToolRunner,
    command: &FfmpegCommand<'_>,
    list_path: &Path,
    size: FrameSize,
    include_audio: bool,
    output: &Path,
    cancel: &CancelToken,
) -> Result<(), GenerationError> {
    let invocation = command.concat_clips(list_path, size, include_audio, output);
    debug!("串接預覽 ({}): {}", command.capability(), output.display());

    if let Err(e) = runner.run(&invocation, cancel) {
        let _ = fs::remove_file(output);
        return Err(GenerationError::Assembly(e));
    }

    if output.is_file() {
        Ok(())
    } else {
        Err(GenerationError::Io(format!(
            "預覽影片未建立: {}",
            output.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_concat_list_escapes_quotes() {
        let dir = tempdir().unwrap();
        let list = dir.path().join("clips.txt");
        write_concat_list(
            &list,
            &[PathBuf::from("/ws/clip_000.mp4"), PathBuf::from("/ws/it's.mp4")],
        )
        .unwrap();

        let text = fs::read_to_string(&list).unwrap();
        assert_eq!(
            text,
            "file '/ws/clip_000.mp4'\nfile '/ws/it'\\''s.mp4'\n"
        );
    }
}
