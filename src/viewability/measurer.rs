// src/viewability/measurer.rs

use tokio::time::Instant;

/// 元素在窗口坐标系下的包围盒（只关心纵向）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub top: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// 单次轮询的测量结果，用完即弃
#[derive(Debug, Clone, Copy)]
pub struct VisibilitySample {
    pub element: BoundingBox,
    pub viewport_height: f64,
    pub at: Instant,
}

impl VisibilitySample {
    pub fn new(element: BoundingBox, viewport_height: f64, at: Instant) -> Self {
        Self { element, viewport_height, at }
    }

    pub fn ratio(&self) -> f64 {
        visibility_ratio(self.element, self.viewport_height)
    }
}

/// **计算元素落在可视窗口内的高度占比**
///
/// 结果限定在 `[0, 1]`；高度非正或输入非有限值时返回 0。
pub fn visibility_ratio(element: BoundingBox, viewport_height: f64) -> f64 {
    if !element.top.is_finite() || !element.height.is_finite() || !viewport_height.is_finite() {
        return 0.0;
    }
    if element.height <= 0.0 {
        return 0.0;
    }
    let visible_top = element.top.max(0.0);
    let visible_bottom = element.bottom().min(viewport_height);
    let visible_height = (visible_bottom - visible_top).max(0.0);
    (visible_height / element.height).clamp(0.0, 1.0)
}
