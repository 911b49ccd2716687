use crate::component::derivative::{GenerationError, SubTaskResult};
use crate::tools::{CancelToken, FfmpegCommand, FrameSize, MosaicCell, ToolRunner};
use log::debug;
use std::fs;
use std::path::Path;

/// 依索引排列格子，沒有成功結果的位置填入佔位色塊
#[must_use]
pub fn build_cells(results: &[SubTaskResult], count: usize) -> Vec<MosaicCell<'_>> {
    (0..count)
        .map(|index| {
            results
                .iter()
                .find(|r| r.index == index)
                .and_then(SubTaskResult::path)
                .map_or(MosaicCell::Placeholder, |p| MosaicCell::Frame(p.as_path()))
        })
        .collect()
}

/// 合成馬賽克圖
///
/// 使用與擷取相同的 [`FfmpegCommand`]，因此合成路徑一定與傳入的能力一致。
pub fn merge_mosaic(
    runner: &dyn ToolRunner,
    command: &FfmpegCommand<'_>,
    cells: &[MosaicCell<'_>],
    cols: usize,
    cell: FrameSize,
    output: &Path,
    cancel: &CancelToken,
) -> Result<(), GenerationError> {
    let invocation = command.assemble_mosaic(cells, cols, cell, output);
    debug!(
        "合成馬賽克 ({}): {}",
        command.capability(),
        output.display()
    );

    if let Err(e) = runner.run(&invocation, cancel) {
        let _ = fs::remove_file(output);
        return Err(GenerationError::Assembly(e));
    }

    if output.is_file() {
        Ok(())
    } else {
        Err(GenerationError::Io(format!(
            "馬賽克圖未建立: {}",
            output.display()
        )))
    }
}
