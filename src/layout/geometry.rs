//! Plain 2D geometry for layout results. Y grows downwards.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn add_point(self, other: Point) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    pub fn sub_point(self, other: Point) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Returns a new Size with the maximum width and height of both.
    pub fn max(self, other: Size) -> Self {
        Self {
            width: self.width.max(other.width),
            height: self.height.max(other.height),
        }
    }

    pub fn add_padding(self, insets: Insets) -> Self {
        Self {
            width: self.width + insets.horizontal_sum(),
            height: self.height + insets.vertical_sum(),
        }
    }
}

/// Axis-aligned rectangle anchored at its top-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub origin: Point,
    pub size: Size,
}

impl Bounds {
    pub fn new(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    pub fn min_x(self) -> f32 {
        self.origin.x
    }

    pub fn min_y(self) -> f32 {
        self.origin.y
    }

    pub fn max_x(self) -> f32 {
        self.origin.x + self.size.width
    }

    pub fn max_y(self) -> f32 {
        self.origin.y + self.size.height
    }

    pub fn center_x(self) -> f32 {
        self.origin.x + self.size.width / 2.0
    }

    pub fn top_center(self) -> Point {
        Point::new(self.center_x(), self.min_y())
    }

    pub fn bottom_center(self) -> Point {
        Point::new(self.center_x(), self.max_y())
    }

    /// Smallest bounds covering both.
    pub fn merge(self, other: Self) -> Self {
        let min_x = self.min_x().min(other.min_x());
        let min_y = self.min_y().min(other.min_y());
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Self::new(Point::new(min_x, min_y), Size::new(max_x - min_x, max_y - min_y))
    }

    pub fn contains(self, other: Self) -> bool {
        other.min_x() >= self.min_x()
            && other.min_y() >= self.min_y()
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    pub fn overlaps(self, other: Self) -> bool {
        self.min_x() < other.max_x()
            && other.min_x() < self.max_x()
            && self.min_y() < other.max_y()
            && other.min_y() < self.max_y()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Insets {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Insets {
    pub fn new(top: f32, right: f32, bottom: f32, left: f32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub fn uniform(value: f32) -> Self {
        Self::new(value, value, value, value)
    }

    pub fn horizontal_sum(self) -> f32 {
        self.left + self.right
    }

    pub fn vertical_sum(self) -> f32 {
        self.top + self.bottom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_edges() {
        let b = Bounds::new(Point::new(10.0, 20.0), Size::new(100.0, 40.0));
        assert_eq!(b.max_x(), 110.0);
        assert_eq!(b.max_y(), 60.0);
        assert_eq!(b.top_center(), Point::new(60.0, 20.0));
        assert_eq!(b.bottom_center(), Point::new(60.0, 60.0));
    }

    #[test]
    fn test_merge_and_contains() {
        let a = Bounds::new(Point::new(0.0, 0.0), Size::new(10.0, 10.0));
        let b = Bounds::new(Point::new(20.0, 5.0), Size::new(10.0, 10.0));
        let m = a.merge(b);
        assert_eq!(m, Bounds::new(Point::new(0.0, 0.0), Size::new(30.0, 15.0)));
        assert!(m.contains(a) && m.contains(b));
        assert!(!a.overlaps(b));
        assert!(m.overlaps(a));
    }

    #[test]
    fn test_padding() {
        let s = Size::new(10.0, 10.0).add_padding(Insets::new(28.0, 16.0, 16.0, 16.0));
        assert_eq!(s, Size::new(42.0, 54.0));
    }
}
