//! Fixed-point triangle rasterization.
//!
//! Vertices snap to 1/256 pixel and are clamped to ±2^32 pixels; edge
//! functions are evaluated in `i128` so far off-target vertices cannot
//! overflow. Pixels are sampled at their centers and
//! a center exactly on an edge belongs to at most one of the two triangles
//! sharing it, so adjacent triangles never double-blend. The tie-break is
//! orientation dependent; callers rasterize in the target's top-down
//! orientation so both origins cover the same logical pixels.

use motif_core::Vec2;

const SUBPIXEL_BITS: u32 = 8;
const SUBPIXEL_ONE: f32 = (1 << SUBPIXEL_BITS) as f32;
const SUBPIXEL_HALF: i64 = 1 << (SUBPIXEL_BITS - 1);
const SUBPIXEL_LIMIT: f32 = (1u64 << 40) as f32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Point {
    x: i64,
    y: i64,
}

fn snap(v: Vec2) -> Point {
    let fixed = |c: f32| (c * SUBPIXEL_ONE).round().clamp(-SUBPIXEL_LIMIT, SUBPIXEL_LIMIT) as i64;
    Point {
        x: fixed(v.x),
        y: fixed(v.y),
    }
}

fn edge(a: Point, b: Point, p: Point) -> i128 {
    let (bx, by) = ((b.x - a.x) as i128, (b.y - a.y) as i128);
    let (px, py) = ((p.x - a.x) as i128, (p.y - a.y) as i128);
    bx * py - by * px
}

/// Tie-break for centers exactly on the edge a→b. Opposite directions of
/// the same edge never both pass.
fn owns_edge(a: Point, b: Point) -> bool {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    dy > 0 || (dy == 0 && dx < 0)
}

fn inside(w: i128, a: Point, b: Point) -> bool {
    w > 0 || (w == 0 && owns_edge(a, b))
}

/// Call `emit(x, y, barycentrics)` for every pixel of a `width`x`height`
/// grid whose center the triangle covers. Positions are in memory-space
/// pixels; barycentrics follow the input vertex order.
pub(crate) fn fill_triangle(
    tri: [Vec2; 3],
    width: u32,
    height: u32,
    mut emit: impl FnMut(u32, u32, [f32; 3]),
) {
    let p = tri.map(snap);
    let signed = edge(p[0], p[1], p[2]);
    if signed == 0 {
        return;
    }
    let (order, area) = if signed > 0 {
        ([0, 1, 2], signed)
    } else {
        ([0, 2, 1], -signed)
    };
    let v = order.map(|i| p[i]);

    let min_x = v.iter().map(|q| q.x).min().unwrap_or(0);
    let max_x = v.iter().map(|q| q.x).max().unwrap_or(0);
    let min_y = v.iter().map(|q| q.y).min().unwrap_or(0);
    let max_y = v.iter().map(|q| q.y).max().unwrap_or(0);
    let x0 = (min_x >> SUBPIXEL_BITS).max(0);
    let y0 = (min_y >> SUBPIXEL_BITS).max(0);
    let x1 = ((max_x >> SUBPIXEL_BITS) + 1).min(width as i64);
    let y1 = ((max_y >> SUBPIXEL_BITS) + 1).min(height as i64);

    let inv_area = 1.0 / area as f64;
    for y in y0..y1 {
        let sy = (y << SUBPIXEL_BITS) + SUBPIXEL_HALF;
        for x in x0..x1 {
            let s = Point {
                x: (x << SUBPIXEL_BITS) + SUBPIXEL_HALF,
                y: sy,
            };
            let w0 = edge(v[1], v[2], s);
            let w1 = edge(v[2], v[0], s);
            let w2 = edge(v[0], v[1], s);
            if inside(w0, v[1], v[2]) && inside(w1, v[2], v[0]) && inside(w2, v[0], v[1]) {
                let mut bary = [0.0f32; 3];
                for (j, w) in [w0, w1, w2].into_iter().enumerate() {
                    bary[order[j]] = (w as f64 * inv_area) as f32;
                }
                emit(x as u32, y as u32, bary);
            }
        }
    }
}
