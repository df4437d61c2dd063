use std::fmt::Debug;

use crate::{
    area::PixelArea,
    buffer::{rent_local_aligned, BufferLease},
    color::ChromaSubsampling,
    error::Error,
    invalid_param_error,
    pixel::PixelFormat,
    profiler::SourceProfiler,
    utils::div_ceil,
    Result,
};

/// Pull-model line producer. A consumer asks for a rectangle and supplies the
/// destination buffer and stride; the producer writes exactly
/// `line_bytes(area.width)` bytes per row.
pub trait PixelSource {
    fn format(&self) -> PixelFormat;
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Fills `buf` with the pixels of `area`, one row per `stride` bytes.
    /// Implementations must not assume monotonic-forward row access.
    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()>;

    fn area(&self) -> PixelArea {
        PixelArea::from_size(self.width(), self.height())
    }

    fn profiler(&self) -> Option<&SourceProfiler> {
        None
    }

    fn as_chained_ref(&self) -> Option<&dyn ChainedPixelSource> {
        None
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedPixelSource> {
        None
    }
}

/// Validates a `copy_pixels` request and returns the packed line byte count.
pub fn check_copy_args(source: &dyn PixelSource, area: &PixelArea, stride: usize, buf_len: usize) -> Result<usize> {
    if area.is_empty() || !source.area().contains(area) {
        return Err(invalid_param_error!(area));
    }

    let line_bytes = source.format().line_bytes(area.width);
    if stride < line_bytes {
        return Err(invalid_param_error!(stride));
    }
    if (area.height as usize - 1) * stride + line_bytes > buf_len {
        return Err(invalid_param_error!(buf_len));
    }

    Ok(line_bytes)
}

/// A transform that pulls from a single upstream source it exclusively owns.
///
/// `replace_source` implementations must invalidate any cached lines, since
/// the new upstream may produce different pixels.
pub trait ChainedPixelSource: PixelSource {
    fn source(&self) -> &dyn PixelSource;
    fn source_mut(&mut self) -> &mut dyn PixelSource;

    /// Whether a later re-init may substitute this transform's upstream.
    /// Transforms that buffer derived state keyed to upstream content
    /// return `false`.
    fn passthrough(&self) -> bool {
        true
    }

    fn replace_source(&mut self, source: Box<dyn PixelSource>);

    /// Swaps in a new upstream with identical format and dimensions, or
    /// propagates the request down a passthrough chain.
    fn reinit(&mut self, new_source: Box<dyn PixelSource>) -> Result<()> {
        if !self.passthrough() {
            return Err(Error::Unsupported("source is not passthrough".into()));
        }

        let current = self.source();
        if current.format() == new_source.format()
            && current.width() == new_source.width()
            && current.height() == new_source.height()
        {
            self.replace_source(new_source);
            return Ok(())
        }

        match self.source_mut().as_chained_mut() {
            Some(inner) => inner.reinit(new_source),
            None => Err(Error::Invalid("no compatible source in chain".into())),
        }
    }
}

/// Collects profiler snapshots down a chain, head first.
pub fn collect_profiles(head: &dyn PixelSource, out: &mut Vec<SourceProfiler>) {
    if let Some(profiler) = head.profiler() {
        out.push(profiler.clone());
    }
    if let Some(chained) = head.as_chained_ref() {
        collect_profiles(chained.source(), out);
    }
}

/// Full-canvas bitmap backed by a pooled buffer. The only mutable pixel
/// storage in a pipeline: animation screen buffers and transpose
/// intermediates live here.
pub struct FrameBufferSource {
    format: PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
    buffer: BufferLease,
}

impl FrameBufferSource {
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        let stride = format.line_bytes(width);
        let buffer = rent_local_aligned(stride * height as usize);

        Self {
            format,
            width,
            height,
            stride,
            buffer,
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn line(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.buffer[start..start + self.stride]
    }

    pub fn line_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        &mut self.buffer[start..start + self.stride]
    }

    /// Copies rows from `src` (with `src_stride`) into `area`.
    pub fn write_pixels(&mut self, area: &PixelArea, src_stride: usize, src: &[u8]) -> Result<()> {
        if !self.area().contains(area) {
            return Err(invalid_param_error!(area));
        }

        let line_bytes = self.format.line_bytes(area.width);
        let offset = self.format.line_bytes(area.x);
        for row in 0..area.height as usize {
            let src_row = &src[row * src_stride..row * src_stride + line_bytes];
            let start = (area.y as usize + row) * self.stride + offset;
            self.buffer[start..start + line_bytes].copy_from_slice(src_row);
        }

        Ok(())
    }

    /// Fills `area` with one packed pixel value.
    pub fn fill_area(&mut self, area: &PixelArea, pixel: &[u8]) -> Result<()> {
        if !self.area().contains(area) || pixel.len() != self.format.bytes_per_pixel() {
            return Err(invalid_param_error!(area));
        }

        let offset = self.format.line_bytes(area.x);
        let line_bytes = self.format.line_bytes(area.width);
        for row in area.y..area.y + area.height {
            let start = row as usize * self.stride + offset;
            let line = &mut self.buffer[start..start + line_bytes];
            for chunk in line.chunks_exact_mut(pixel.len()) {
                chunk.copy_from_slice(pixel);
            }
        }

        Ok(())
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0);
    }
}

impl PixelSource for FrameBufferSource {
    fn format(&self) -> PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        let line_bytes = check_copy_args(self, &area, stride, buf.len())?;
        let offset = self.format.line_bytes(area.x);

        for row in 0..area.height as usize {
            let start = (area.y as usize + row) * self.stride + offset;
            buf[row * stride..row * stride + line_bytes].copy_from_slice(&self.buffer[start..start + line_bytes]);
        }

        Ok(())
    }
}

impl Debug for FrameBufferSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBufferSource")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Bundle of Y/Cb/Cr planes with the chroma grid geometry needed to merge
/// them. Used through the `PixelSource` trait for its luma plane.
pub struct PlanarPixelSource {
    pub y: Box<dyn PixelSource>,
    pub cb: Box<dyn PixelSource>,
    pub cr: Box<dyn PixelSource>,
    pub subsampling: ChromaSubsampling,
    /// Half-pixel displacement between the luma and subsampled chroma grids.
    pub chroma_offset_x: f32,
    pub chroma_offset_y: f32,
    /// Half-pixel compensation accumulated from odd crops.
    pub crop_offset_x: f32,
    pub crop_offset_y: f32,
}

impl PlanarPixelSource {
    pub fn new(
        y: Box<dyn PixelSource>,
        cb: Box<dyn PixelSource>,
        cr: Box<dyn PixelSource>,
        subsampling: ChromaSubsampling,
    ) -> Result<Self> {
        let chroma_width = div_ceil(y.width(), subsampling.ratio_x());
        let chroma_height = div_ceil(y.height(), subsampling.ratio_y());
        if cb.width() != chroma_width
            || cb.height() != chroma_height
            || cr.width() != chroma_width
            || cr.height() != chroma_height
        {
            return Err(invalid_param_error!(subsampling));
        }

        Ok(Self {
            y,
            cb,
            cr,
            subsampling,
            chroma_offset_x: 0.0,
            chroma_offset_y: 0.0,
            crop_offset_x: 0.0,
            crop_offset_y: 0.0,
        })
    }

    pub fn chroma_width(&self) -> u32 {
        div_ceil(self.y.width(), self.subsampling.ratio_x())
    }

    pub fn chroma_height(&self) -> u32 {
        div_ceil(self.y.height(), self.subsampling.ratio_y())
    }
}

impl PixelSource for PlanarPixelSource {
    fn format(&self) -> PixelFormat {
        self.y.format()
    }

    fn width(&self) -> u32 {
        self.y.width()
    }

    fn height(&self) -> u32 {
        self.y.height()
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        self.y.copy_pixels(area, stride, buf)
    }
}

/// In-memory pixel source over an owned byte vector; the root adapter for
/// predecoded frames and synthesized test content.
pub struct MemoryPixelSource {
    format: PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl MemoryPixelSource {
    pub fn new(format: PixelFormat, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let stride = format.line_bytes(width);
        if data.len() < stride * height as usize {
            return Err(invalid_param_error!(data.len()));
        }

        Ok(Self {
            format,
            width,
            height,
            stride,
            data,
        })
    }
}

impl PixelSource for MemoryPixelSource {
    fn format(&self) -> PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        let line_bytes = check_copy_args(self, &area, stride, buf.len())?;
        let offset = self.format.line_bytes(area.x);

        for row in 0..area.height as usize {
            let start = (area.y as usize + row) * self.stride + offset;
            buf[row * stride..row * stride + line_bytes].copy_from_slice(&self.data[start..start + line_bytes]);
        }

        Ok(())
    }
}
