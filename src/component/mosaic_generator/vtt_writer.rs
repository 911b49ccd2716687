use crate::tools::FrameSize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// `HH:MM:SS.mmm`
#[must_use]
pub fn format_vtt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{ms:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60
    )
}

/// 產生 WebVTT 索引：每個時間區段對應馬賽克圖中的一格
#[must_use]
pub fn render_sidecar(
    sprite_name: &str,
    duration: f64,
    count: usize,
    cols: usize,
    cell: FrameSize,
) -> String {
    let cols = cols.max(1);
    let interval = if count == 0 { 0.0 } else { duration / count as f64 };
    let mut vtt = String::from("WEBVTT\n\n");

    for index in 0..count {
        let start = index as f64 * interval;
        let x = (index % cols) as u32 * cell.width;
        let y = (index / cols) as u32 * cell.height;
        let _ = write!(
            vtt,
            "{} --> {}\n{sprite_name}#xywh={x},{y},{},{}\n\n",
            format_vtt_time(start),
            format_vtt_time(start + interval),
            cell.width,
            cell.height
        );
    }

    vtt
}

pub fn write_sidecar(
    path: &Path,
    sprite_name: &str,
    duration: f64,
    count: usize,
    cols: usize,
    cell: FrameSize,
) -> std::io::Result<()> {
    fs::write(path, render_sidecar(sprite_name, duration, count, cols, cell))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_vtt_time() {
        assert_eq!(format_vtt_time(0.0), "00:00:00.000");
        assert_eq!(format_vtt_time(61.5), "00:01:01.500");
        assert_eq!(format_vtt_time(3723.042), "01:02:03.042");
    }

    #[test]
    fn test_render_sidecar_regions() {
        let vtt = render_sidecar("k_sprite.jpg", 4.0, 4, 2, FrameSize::new(160, 90));
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:00.000 --> 00:00:01.000\nk_sprite.jpg#xywh=0,0,160,90\n"));
        assert!(vtt.contains("00:00:03.000 --> 00:00:04.000\nk_sprite.jpg#xywh=160,90,160,90\n"));
        assert_eq!(vtt.matches("#xywh=").count(), 4);
    }
}
