use std::fmt::{Display, Formatter};

use num_enum::TryFromPrimitive;

/// Rectangle in pixel coordinates, contained within its owning source.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PixelArea {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelArea {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub const fn size(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn contains(&self, other: &PixelArea) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }

    pub fn intersect(&self, other: &PixelArea) -> PixelArea {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);

        if x1 <= x0 || y1 <= y0 {
            PixelArea::default()
        } else {
            PixelArea::new(x0, y0, x1 - x0, y1 - y0)
        }
    }

    pub fn offset(&self, dx: u32, dy: u32) -> PixelArea {
        PixelArea::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Expands the rectangle outward to multiples of the subsampling ratios,
    /// clamped to `width x height`.
    pub fn snap_to_grid(&self, ratio_x: u32, ratio_y: u32, width: u32, height: u32) -> PixelArea {
        let x0 = self.x - self.x % ratio_x;
        let y0 = self.y - self.y % ratio_y;
        let x1 = crate::utils::align_to(self.x + self.width, ratio_x).min(width);
        let y1 = crate::utils::align_to(self.y + self.height, ratio_y).min(height);

        PixelArea::new(x0, y0, x1 - x0, y1 - y0)
    }
}

impl Display for PixelArea {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{},{}", self.width, self.height, self.x, self.y)
    }
}

/// The eight Exif orientations. The discriminant matches the Exif tag value.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, TryFromPrimitive)]
pub enum Orientation {
    #[default]
    Normal = 1,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl Orientation {
    /// Maps an Exif tag value, treating anything out of range as `Normal`.
    pub fn from_exif(value: u16) -> Self {
        u8::try_from(value).ok().and_then(|v| Orientation::try_from(v).ok()).unwrap_or_default()
    }

    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Orientation::Transpose | Orientation::Rotate90 | Orientation::Transverse | Orientation::Rotate270)
    }

    pub fn flips_x(&self) -> bool {
        matches!(self, Orientation::FlipHorizontal | Orientation::Rotate180 | Orientation::Rotate90 | Orientation::Transverse)
    }

    pub fn flips_y(&self) -> bool {
        matches!(self, Orientation::Rotate180 | Orientation::FlipVertical | Orientation::Rotate270 | Orientation::Transverse)
    }

    /// Transposing orientations cannot stream line-at-a-time and buffer the
    /// whole frame instead.
    pub fn requires_cache(&self) -> bool {
        self.swaps_dimensions()
    }

    pub fn invert(&self) -> Orientation {
        match self {
            Orientation::Rotate90 => Orientation::Rotate270,
            Orientation::Rotate270 => Orientation::Rotate90,
            o => *o,
        }
    }

    /// Maps a presentation-space rectangle into storage coordinates for a
    /// storage image of `width x height`.
    pub fn de_orient(&self, area: PixelArea, width: u32, height: u32) -> PixelArea {
        let PixelArea {
            x,
            y,
            width: w,
            height: h,
        } = area;

        match self {
            Orientation::Normal => area,
            Orientation::FlipHorizontal => PixelArea::new(width - x - w, y, w, h),
            Orientation::Rotate180 => PixelArea::new(width - x - w, height - y - h, w, h),
            Orientation::FlipVertical => PixelArea::new(x, height - y - h, w, h),
            Orientation::Transpose => PixelArea::new(y, x, h, w),
            Orientation::Rotate90 => PixelArea::new(y, height - x - w, h, w),
            Orientation::Transverse => PixelArea::new(width - y - h, height - x - w, h, w),
            Orientation::Rotate270 => PixelArea::new(width - y - h, x, h, w),
        }
    }

    /// Maps a storage-space rectangle into presentation coordinates. Inverse
    /// of [`Orientation::de_orient`] for the same storage dimensions.
    pub fn re_orient(&self, area: PixelArea, width: u32, height: u32) -> PixelArea {
        let PixelArea {
            x,
            y,
            width: w,
            height: h,
        } = area;

        match self {
            Orientation::Normal => area,
            Orientation::FlipHorizontal => PixelArea::new(width - x - w, y, w, h),
            Orientation::Rotate180 => PixelArea::new(width - x - w, height - y - h, w, h),
            Orientation::FlipVertical => PixelArea::new(x, height - y - h, w, h),
            Orientation::Transpose => PixelArea::new(y, x, h, w),
            Orientation::Rotate90 => PixelArea::new(height - y - h, x, h, w),
            Orientation::Transverse => PixelArea::new(height - y - h, width - x - w, h, w),
            Orientation::Rotate270 => PixelArea::new(y, width - x - w, h, w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIENTATIONS: [Orientation; 8] = [
        Orientation::Normal,
        Orientation::FlipHorizontal,
        Orientation::Rotate180,
        Orientation::FlipVertical,
        Orientation::Transpose,
        Orientation::Rotate90,
        Orientation::Transverse,
        Orientation::Rotate270,
    ];

    #[test]
    fn orient_round_trip() {
        let area = PixelArea::new(1, 2, 3, 4);
        for o in ORIENTATIONS {
            let storage = (7, 9);
            let oriented = o.re_orient(area, storage.0, storage.1);
            assert_eq!(o.de_orient(oriented, storage.0, storage.1), area, "{o:?}");
        }
    }

    #[test]
    fn rotate90_corner() {
        // A 1x1 rect at the storage origin lands in the top-right corner of
        // the presentation after a clockwise rotation.
        let o = Orientation::Rotate90;
        let area = PixelArea::new(0, 0, 1, 1);
        assert_eq!(o.re_orient(area, 4, 2), PixelArea::new(1, 0, 1, 1));
    }

    #[test]
    fn intersect_and_contains() {
        let outer = PixelArea::from_size(10, 10);
        let inner = PixelArea::new(2, 3, 4, 4);
        assert!(outer.contains(&inner));
        assert_eq!(outer.intersect(&inner), inner);

        let disjoint = PixelArea::new(20, 20, 2, 2);
        assert!(outer.intersect(&disjoint).is_empty());
    }

    #[test]
    fn snap_expands_outward() {
        let area = PixelArea::new(1, 1, 2, 2);
        assert_eq!(area.snap_to_grid(2, 2, 8, 8), PixelArea::new(0, 0, 4, 4));
        assert_eq!(area.snap_to_grid(1, 1, 8, 8), area);
    }

    #[test]
    fn exif_mapping() {
        assert_eq!(Orientation::from_exif(6), Orientation::Rotate90);
        assert_eq!(Orientation::from_exif(0), Orientation::Normal);
        assert_eq!(Orientation::from_exif(9), Orientation::Normal);
        assert_eq!(Orientation::Rotate90.invert(), Orientation::Rotate270);
        assert_eq!(Orientation::Transpose.invert(), Orientation::Transpose);
    }
}
