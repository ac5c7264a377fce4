//! Row-major 2D buffer with a movable logical origin.
//!
//! Physical accessors (`get`, `[(x, y)]`) address the stored pixels directly.
//! Logical accessors (`at`, `contains`) go through the origin: logical pixel
//! `(x, y)` is stored at physical `(x - dx, y - dy)`. Displacing a buffer only
//! moves its origin, never its data.

use std::ops::{Deref, DerefMut, Index, IndexMut};
use std::slice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer2<T> {
    pixels: Vec<T>,
    width: usize,
    height: usize,
    dx: i32,
    dy: i32,
}

impl<T> Buffer2<T> {
    pub fn new(width: usize, height: usize, pixels: Vec<T>) -> Self {
        assert_eq!(
            pixels.len(),
            width * height,
            "pixels length must equal width * height"
        );
        Self {
            pixels,
            width,
            height,
            dx: 0,
            dy: 0,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &T {
        debug_assert!(x < self.width && y < self.height);
        &self.pixels[y * self.width + x]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }

    /// Physical row `y`.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.pixels
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.pixels.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.pixels.iter_mut()
    }

    // ========================================================================
    // Logical origin
    // ========================================================================

    /// Logical position of physical pixel `(0, 0)`.
    #[inline]
    pub fn displacement(&self) -> (i32, i32) {
        (self.dx, self.dy)
    }

    #[inline]
    pub fn set_displacement(&mut self, dx: i32, dy: i32) {
        self.dx = dx;
        self.dy = dy;
    }

    /// Move the logical origin by `(dx, dy)`.
    #[inline]
    pub fn displace(&mut self, dx: i32, dy: i32) {
        self.dx += dx;
        self.dy += dy;
    }

    /// Whether logical pixel `(x, y)` lies inside the displaced footprint.
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.dx
            && y >= self.dy
            && ((x - self.dx) as usize) < self.width
            && ((y - self.dy) as usize) < self.height
    }

    /// Logical accessor. The pixel must be inside the footprint.
    #[inline]
    pub fn at(&self, x: i32, y: i32) -> &T {
        debug_assert!(self.contains(x, y), "({x}, {y}) outside footprint");
        &self.pixels[(y - self.dy) as usize * self.width + (x - self.dx) as usize]
    }

    #[inline]
    pub fn at_mut(&mut self, x: i32, y: i32) -> &mut T {
        debug_assert!(self.contains(x, y), "({x}, {y}) outside footprint");
        &mut self.pixels[(y - self.dy) as usize * self.width + (x - self.dx) as usize]
    }

    /// Calls `f(x, y, pixel)` for every logical pixel with
    /// `(x - cx)² + (y - cy)² <= radius²` that lies inside the footprint.
    pub fn for_each_in_disc<F>(&mut self, cx: i32, cy: i32, radius: i32, mut f: F)
    where
        F: FnMut(i32, i32, &mut T),
    {
        let r2 = radius * radius;
        let (dx, dy) = (self.dx, self.dy);
        let y_min = (cy - radius).max(dy);
        let y_max = (cy + radius).min(dy + self.height as i32 - 1);
        let x_min = (cx - radius).max(dx);
        let x_max = (cx + radius).min(dx + self.width as i32 - 1);
        for y in y_min..=y_max {
            let oy = y - cy;
            for x in x_min..=x_max {
                let ox = x - cx;
                if ox * ox + oy * oy <= r2 {
                    let idx = (y - dy) as usize * self.width + (x - dx) as usize;
                    f(x, y, &mut self.pixels[idx]);
                }
            }
        }
    }
}

/// Empty 0x0 buffer.
impl<T> Default for Buffer2<T> {
    fn default() -> Self {
        Self::new(0, 0, Vec::new())
    }
}

impl<T: Default + Clone> Buffer2<T> {
    pub fn new_default(width: usize, height: usize) -> Self {
        Self::new(width, height, vec![T::default(); width * height])
    }
}

impl<T: Clone> Buffer2<T> {
    pub fn new_filled(width: usize, height: usize, value: T) -> Self {
        Self::new(width, height, vec![value; width * height])
    }

    /// Copy of the physical rectangle `[x, x + width) x [y, y + height)`.
    pub fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> Self {
        assert!(
            x + width <= self.width && y + height <= self.height,
            "crop rectangle exceeds buffer bounds"
        );
        let mut pixels = Vec::with_capacity(width * height);
        for row in y..y + height {
            pixels.extend_from_slice(&self.row(row)[x..x + width]);
        }
        Self::new(width, height, pixels)
    }
}

impl<T> Index<(usize, usize)> for Buffer2<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.pixels[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Buffer2<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        &mut self.pixels[y * self.width + x]
    }
}

impl<T> Deref for Buffer2<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.pixels
    }
}

impl<T> DerefMut for Buffer2<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pixels
    }
}

impl<T> From<Buffer2<T>> for Vec<T> {
    #[inline]
    fn from(buffer: Buffer2<T>) -> Self {
        buffer.pixels
    }
}
