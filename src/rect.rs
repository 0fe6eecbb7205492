use crate::engine::{MoveRect, NativeRect};

/// A changed region of a monitor's desktop image, in monitor-local pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DirtyRect {
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Convert a native rectangle, dropping the part that lies left of or
    /// above the origin. Returns `None` for empty or inverted rectangles.
    pub fn from_native(rect: NativeRect) -> Option<Self> {
        let left = rect.left.max(0);
        let top = rect.top.max(0);
        if rect.right <= left || rect.bottom <= top {
            return None;
        }
        Some(Self {
            x: left as u32,
            y: top as u32,
            width: (rect.right - left) as u32,
            height: (rect.bottom - top) as u32,
        })
    }
}

/// Content that moved on screen: `width x height` pixels copied from
/// `(src_x, src_y)` to `destination`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MovedRegion {
    pub src_x: u32,
    pub src_y: u32,
    pub destination: DirtyRect,
}

#[inline]
pub(crate) fn clamp_dirty_rect(rect: DirtyRect, width: u32, height: u32) -> Option<DirtyRect> {
    let x = rect.x.min(width);
    let y = rect.y.min(height);
    if x >= width || y >= height {
        return None;
    }

    let max_w = width - x;
    let max_h = height - y;
    let clamped_w = rect.width.min(max_w);
    let clamped_h = rect.height.min(max_h);
    if clamped_w == 0 || clamped_h == 0 {
        return None;
    }

    Some(DirtyRect {
        x,
        y,
        width: clamped_w,
        height: clamped_h,
    })
}

/// Convert native dirty rectangles to monitor-local ones clipped to
/// `width x height`, skipping anything that ends up empty.
pub fn normalize_dirty_rects(rects: &[NativeRect], width: u32, height: u32) -> Vec<DirtyRect> {
    rects
        .iter()
        .filter_map(|rect| DirtyRect::from_native(*rect))
        .filter_map(|rect| clamp_dirty_rect(rect, width, height))
        .collect()
}

/// Clip move rectangles to the monitor. The source is the destination
/// rectangle shifted to `source_point`; only the part where both lie on
/// the monitor survives, and a move with no such part is dropped.
pub fn normalize_move_rects(rects: &[MoveRect], width: u32, height: u32) -> Vec<MovedRegion> {
    rects
        .iter()
        .filter_map(|rect| {
            let (dx, x, w) = clip_move_span(
                rect.source_point.x,
                rect.destination.left,
                rect.destination.right,
                width,
            )?;
            let (dy, y, h) = clip_move_span(
                rect.source_point.y,
                rect.destination.top,
                rect.destination.bottom,
                height,
            )?;
            Some(MovedRegion {
                src_x: (x + dx) as u32,
                src_y: (y + dy) as u32,
                destination: DirtyRect {
                    x: x as u32,
                    y: y as u32,
                    width: w as u32,
                    height: h as u32,
                },
            })
        })
        .collect()
}

/// One axis of a move: clip `[start, end)` so that it and the span shifted
/// to `source` both fit in `[0, limit)`. Returns `(offset, start, length)`.
fn clip_move_span(source: i32, start: i32, end: i32, limit: u32) -> Option<(i64, i64, i64)> {
    let offset = i64::from(source) - i64::from(start);
    let limit = i64::from(limit);
    let lo = i64::from(start).max(0).max(-offset);
    let hi = i64::from(end).min(limit).min(limit - offset);
    (hi > lo).then_some((offset, lo, hi - lo))
}

/// Total changed pixels. Overlapping rectangles are counted once per rect,
/// which matches how the duplication API reports them (non-overlapping).
pub fn dirty_area(rects: &[DirtyRect]) -> u64 {
    rects.iter().map(DirtyRect::area).sum()
}

/// Smallest rectangle covering every dirty rect.
pub fn bounding_rect(rects: &[DirtyRect]) -> Option<DirtyRect> {
    let first = rects.first()?;
    let (mut left, mut top) = (first.x, first.y);
    let (mut right, mut bottom) = (
        first.x.saturating_add(first.width),
        first.y.saturating_add(first.height),
    );
    for rect in &rects[1..] {
        left = left.min(rect.x);
        top = top.min(rect.y);
        right = right.max(rect.x.saturating_add(rect.width));
        bottom = bottom.max(rect.y.saturating_add(rect.height));
    }
    Some(DirtyRect {
        x: left,
        y: top,
        width: right - left,
        height: bottom - top,
    })
}
