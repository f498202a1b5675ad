//! Fixed-size line windows with overlap

use super::{ChunkerConfig, Segment};

/// Split [start, end) into windows of `size` lines overlapping by `overlap`
pub fn line_windows(start: usize, end: usize, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let size = size.max(1);
    let step = size.saturating_sub(overlap).max(1);
    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let window_end = (cursor + size).min(end);
        windows.push((cursor, window_end));
        if window_end >= end {
            break;
        }
        cursor += step;
    }
    windows
}

pub(crate) fn generic_segments(total_lines: usize, config: &ChunkerConfig) -> Vec<Segment> {
    line_windows(0, total_lines, config.line_chunk_size, config.line_overlap)
        .into_iter()
        .map(|(start, end)| Segment::plain(start, end))
        .collect()
}
