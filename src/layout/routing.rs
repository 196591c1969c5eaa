//! Orthogonal edge routes.
//!
//! Every route leaves its source from the bottom and enters its target from
//! the top. Routes between layers bend once in the channel below the source
//! layer; routes that go up or sideways travel around the right-hand
//! perimeter of the group that holds both ends.

use super::geometry::{Bounds, Point};

/// Where a route may run inside the group holding both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    /// Horizontal lane below the source's layer.
    pub below_source: f32,
    /// Horizontal lane above the target's layer.
    pub above_target: f32,
    /// Vertical lane right of the group.
    pub side_x: f32,
    /// The target's layer lies below the source's.
    pub downward: bool,
}

pub fn orthogonal(source: Bounds, target: Bounds, channel: Channel) -> Vec<Point> {
    let start = source.bottom_center();
    let end = target.top_center();

    let points = if channel.downward {
        vec![
            start,
            Point::new(start.x, channel.below_source),
            Point::new(end.x, channel.below_source),
            end,
        ]
    } else {
        vec![
            start,
            Point::new(start.x, channel.below_source),
            Point::new(channel.side_x, channel.below_source),
            Point::new(channel.side_x, channel.above_target),
            Point::new(end.x, channel.above_target),
            end,
        ]
    };
    simplify(points)
}

/// Route between a container and something nested inside it: a straight
/// drop from under the container's header.
pub fn nested(container: Bounds, inner: Bounds, header_height: f32) -> Vec<Point> {
    let x = inner.center_x();
    simplify(vec![
        Point::new(x, container.min_y() + header_height),
        Point::new(x, inner.min_y()),
    ])
}

/// Route for a reference without a target: a short stub out of the
/// source's right side.
pub fn dangling(source: Bounds, length: f32) -> Vec<Point> {
    let start = Point::new(source.max_x(), source.min_y() + source.size.height / 2.0);
    vec![start, Point::new(start.x + length, start.y)]
}

/// Drop repeated points and the middle of collinear runs.
fn simplify(points: Vec<Point>) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        if out.last() == Some(&p) {
            continue;
        }
        if out.len() >= 2 {
            let a = out[out.len() - 2];
            let b = out[out.len() - 1];
            let collinear = (a.x == b.x && b.x == p.x) || (a.y == b.y && b.y == p.y);
            if collinear {
                out.pop();
            }
        }
        out.push(p);
    }
    out
}

/// Every segment is horizontal or vertical.
pub fn is_orthogonal(points: &[Point]) -> bool {
    points
        .windows(2)
        .all(|w| w[0].x == w[1].x || w[0].y == w[1].y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::geometry::Size;

    fn rect(x: f32, y: f32) -> Bounds {
        Bounds::new(Point::new(x, y), Size::new(80.0, 36.0))
    }

    #[test]
    fn test_downward_route_bends_in_channel() {
        let route = orthogonal(
            rect(0.0, 0.0),
            rect(200.0, 96.0),
            Channel {
                below_source: 66.0,
                above_target: 66.0,
                side_x: 400.0,
                downward: true,
            },
        );
        assert_eq!(
            route,
            vec![
                Point::new(40.0, 36.0),
                Point::new(40.0, 66.0),
                Point::new(240.0, 66.0),
                Point::new(240.0, 96.0),
            ]
        );
        assert!(is_orthogonal(&route));
    }

    #[test]
    fn test_upward_route_goes_around_perimeter() {
        let route = orthogonal(
            rect(0.0, 96.0),
            rect(0.0, 0.0),
            Channel {
                below_source: 162.0,
                above_target: -30.0,
                side_x: 300.0,
                downward: false,
            },
        );
        assert_eq!(route.len(), 6);
        assert!(is_orthogonal(&route));
        assert!(route.iter().any(|p| p.x == 300.0));
        assert_eq!(route.first(), Some(&Point::new(40.0, 132.0)));
        assert_eq!(route.last(), Some(&Point::new(40.0, 0.0)));
    }

    #[test]
    fn test_dangling_stub_leaves_right_side() {
        let route = dangling(rect(10.0, 20.0), 16.0);
        assert_eq!(route, vec![Point::new(90.0, 38.0), Point::new(106.0, 38.0)]);
        assert!(is_orthogonal(&route));
    }

    #[test]
    fn test_straight_down_collapses_to_one_segment() {
        let route = orthogonal(
            rect(0.0, 0.0),
            rect(0.0, 96.0),
            Channel {
                below_source: 66.0,
                above_target: 66.0,
                side_x: 400.0,
                downward: true,
            },
        );
        assert_eq!(route, vec![Point::new(40.0, 36.0), Point::new(40.0, 96.0)]);
    }

    #[test]
    fn test_nested_route() {
        let container = Bounds::new(Point::new(0.0, 0.0), Size::new(300.0, 200.0));
        let route = nested(container, rect(16.0, 44.0), 28.0);
        assert_eq!(route, vec![Point::new(56.0, 28.0), Point::new(56.0, 44.0)]);
        assert!(is_orthogonal(&route));
    }
}
