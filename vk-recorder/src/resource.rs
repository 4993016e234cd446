//! Resources that can be bound to the recorder.
//!
//! These are thin descriptions of objects created and owned elsewhere. Besides its id, each one
//! carries a cookie, which the recorder compares to detect when a binding really changes and which
//! is hashed into the content hash of descriptor sets. Ids are only unique within a type, cookies
//! are unique across every kind of resource.

use crate::macros::impl_id_counter;
use ash::vk;
use std::{
    num::NonZero,
    sync::atomic::{AtomicU64, Ordering},
};

fn next_cookie() -> NonZero<u64> {
    static COUNTER: AtomicU64 = AtomicU64::new(1);

    NonZero::<u64>::new(COUNTER.fetch_add(1, Ordering::Relaxed)).unwrap_or_else(|| {
        eprintln!("the cookie counter has overflown ...somehow");
        std::process::abort();
    })
}

/// A buffer that can be bound as a uniform, storage, vertex, index or indirect buffer.
#[derive(Debug)]
pub struct Buffer {
    handle: vk::Buffer,
    size: vk::DeviceSize,
    id: NonZero<u64>,
    cookie: NonZero<u64>,
}

impl Buffer {
    /// Wraps an existing buffer of `size` bytes.
    #[inline]
    pub fn new(handle: vk::Buffer, size: vk::DeviceSize) -> Self {
        Buffer {
            handle,
            size,
            id: Self::next_id(),
            cookie: next_cookie(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub(crate) fn cookie(&self) -> u64 {
        self.cookie.get()
    }
}

impl_id_counter!(Buffer);

/// A typed view of a buffer, bound as a uniform or storage texel buffer.
#[derive(Debug)]
pub struct BufferView {
    handle: vk::BufferView,
    id: NonZero<u64>,
    cookie: NonZero<u64>,
}

impl BufferView {
    #[inline]
    pub fn new(handle: vk::BufferView) -> Self {
        BufferView {
            handle,
            id: Self::next_id(),
            cookie: next_cookie(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::BufferView {
        self.handle
    }

    #[inline]
    pub(crate) fn cookie(&self) -> u64 {
        self.cookie.get()
    }
}

impl_id_counter!(BufferView);

/// The layout an image is kept in while it is read by shaders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImageLayoutKind {
    /// The image transitions to the optimal layout of each usage.
    #[default]
    Optimal,

    /// The image always stays in `GENERAL`.
    General,
}

impl ImageLayoutKind {
    /// Returns the layout to use where `optimal` would be the ideal layout.
    #[inline]
    pub fn resolve(self, optimal: vk::ImageLayout) -> vk::ImageLayout {
        match self {
            ImageLayoutKind::Optimal => optimal,
            ImageLayoutKind::General => vk::ImageLayout::GENERAL,
        }
    }
}

/// Parameters to describe an [`ImageView`].
#[derive(Clone, Debug)]
pub struct ImageViewCreateInfo {
    /// The view used for floating-point and normalized access.
    ///
    /// The default value is a null handle, which must be replaced.
    pub float_view: vk::ImageView,

    /// The view used for integer access, if the format is reinterpreted.
    ///
    /// The default value is `None`, which uses `float_view`.
    pub integer_view: Option<vk::ImageView>,

    /// A view with a UNORM format, for images with an sRGB format.
    ///
    /// The default value is `None`, which uses `float_view`.
    pub unorm_view: Option<vk::ImageView>,

    /// A view with an sRGB format, for images with a UNORM format.
    ///
    /// The default value is `None`, which uses `float_view`.
    pub srgb_view: Option<vk::ImageView>,

    /// The default value is `vk::Format::UNDEFINED`.
    pub format: vk::Format,

    /// The default value is `COLOR`.
    pub aspects: vk::ImageAspectFlags,

    /// The default value is [`ImageLayoutKind::Optimal`].
    pub layout: ImageLayoutKind,
}

impl Default for ImageViewCreateInfo {
    #[inline]
    fn default() -> Self {
        ImageViewCreateInfo {
            float_view: vk::ImageView::null(),
            integer_view: None,
            unorm_view: None,
            srgb_view: None,
            format: vk::Format::UNDEFINED,
            aspects: vk::ImageAspectFlags::COLOR,
            layout: ImageLayoutKind::Optimal,
        }
    }
}

/// A set of views of the same image.
#[derive(Debug)]
pub struct ImageView {
    float_view: vk::ImageView,
    integer_view: vk::ImageView,
    unorm_view: vk::ImageView,
    srgb_view: vk::ImageView,
    format: vk::Format,
    aspects: vk::ImageAspectFlags,
    layout: ImageLayoutKind,
    id: NonZero<u64>,
    cookie: NonZero<u64>,
}

impl ImageView {
    /// # Panics
    ///
    /// - Panics if `create_info.float_view` is a null handle.
    pub fn new(create_info: ImageViewCreateInfo) -> Self {
        let ImageViewCreateInfo {
            float_view,
            integer_view,
            unorm_view,
            srgb_view,
            format,
            aspects,
            layout,
        } = create_info;

        assert!(
            float_view != vk::ImageView::null(),
            "an image view needs at least a float view",
        );

        ImageView {
            float_view,
            integer_view: integer_view.unwrap_or(float_view),
            unorm_view: unorm_view.unwrap_or(float_view),
            srgb_view: srgb_view.unwrap_or(float_view),
            format,
            aspects,
            layout,
            id: Self::next_id(),
            cookie: next_cookie(),
        }
    }

    #[inline]
    pub fn float_view(&self) -> vk::ImageView {
        self.float_view
    }

    #[inline]
    pub fn integer_view(&self) -> vk::ImageView {
        self.integer_view
    }

    #[inline]
    pub fn unorm_view(&self) -> vk::ImageView {
        self.unorm_view
    }

    #[inline]
    pub fn srgb_view(&self) -> vk::ImageView {
        self.srgb_view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn aspects(&self) -> vk::ImageAspectFlags {
        self.aspects
    }

    #[inline]
    pub fn layout_kind(&self) -> ImageLayoutKind {
        self.layout
    }

    /// Returns the layout the image has when sampled or read as an input attachment.
    pub fn read_only_layout(&self) -> vk::ImageLayout {
        let optimal = if self
            .aspects
            .intersects(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL)
        {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        } else {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        };

        self.layout.resolve(optimal)
    }

    #[inline]
    pub(crate) fn cookie(&self) -> u64 {
        self.cookie.get()
    }
}

impl_id_counter!(ImageView);

/// A sampler object.
#[derive(Debug)]
pub struct Sampler {
    handle: vk::Sampler,
    id: NonZero<u64>,
    cookie: NonZero<u64>,
}

impl Sampler {
    #[inline]
    pub fn new(handle: vk::Sampler) -> Self {
        Sampler {
            handle,
            id: Self::next_id(),
            cookie: next_cookie(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }

    #[inline]
    pub(crate) fn cookie(&self) -> u64 {
        self.cookie.get()
    }
}

impl_id_counter!(Sampler);

/// A sampler that every device provides.
///
/// Stock samplers can be baked into a descriptor set layout as immutable samplers, which is why
/// their index has to fit in four bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StockSampler {
    NearestClamp = 0,
    LinearClamp = 1,
    TrilinearClamp = 2,
    NearestWrap = 3,
    LinearWrap = 4,
    TrilinearWrap = 5,
    NearestShadow = 6,
    LinearShadow = 7,
}

impl StockSampler {
    pub const COUNT: usize = 8;

    pub const ALL: [StockSampler; Self::COUNT] = [
        StockSampler::NearestClamp,
        StockSampler::LinearClamp,
        StockSampler::TrilinearClamp,
        StockSampler::NearestWrap,
        StockSampler::LinearWrap,
        StockSampler::TrilinearWrap,
        StockSampler::NearestShadow,
        StockSampler::LinearShadow,
    ];

    #[inline]
    pub(crate) fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }
}

const _: () = assert!(StockSampler::COUNT <= 16);

#[cfg(test)]
mod tests {
    use super::{
        Buffer, BufferView, ImageLayoutKind, ImageView, ImageViewCreateInfo, Sampler,
        StockSampler,
    };
    use ash::vk::{self, Handle};

    #[test]
    fn cookies_are_unique() {
        let a = ImageView::new(ImageViewCreateInfo {
            float_view: vk::ImageView::from_raw(1),
            ..Default::default()
        });
        let b = ImageView::new(ImageViewCreateInfo {
            float_view: vk::ImageView::from_raw(1),
            ..Default::default()
        });

        assert_ne!(a.cookie(), b.cookie());
        assert_ne!(a, b);
    }

    #[test]
    fn cookies_are_unique_across_kinds() {
        let view = ImageView::new(ImageViewCreateInfo {
            float_view: vk::ImageView::from_raw(1),
            ..Default::default()
        });
        let buffer_view = BufferView::new(vk::BufferView::from_raw(1));
        let buffer = Buffer::new(vk::Buffer::from_raw(1), 64);
        let sampler = Sampler::new(vk::Sampler::from_raw(1));

        let mut cookies = [
            view.cookie(),
            buffer_view.cookie(),
            buffer.cookie(),
            sampler.cookie(),
        ];
        cookies.sort_unstable();
        assert!(cookies.windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn view_fallbacks() {
        let view = ImageView::new(ImageViewCreateInfo {
            float_view: vk::ImageView::from_raw(1),
            srgb_view: Some(vk::ImageView::from_raw(2)),
            ..Default::default()
        });

        assert_eq!(view.integer_view(), view.float_view());
        assert_eq!(view.unorm_view(), view.float_view());
        assert_eq!(view.srgb_view(), vk::ImageView::from_raw(2));
    }

    #[test]
    fn read_only_layouts() {
        let depth = ImageView::new(ImageViewCreateInfo {
            float_view: vk::ImageView::from_raw(1),
            aspects: vk::ImageAspectFlags::DEPTH,
            ..Default::default()
        });
        let general = ImageView::new(ImageViewCreateInfo {
            float_view: vk::ImageView::from_raw(1),
            layout: ImageLayoutKind::General,
            ..Default::default()
        });

        assert_eq!(
            depth.read_only_layout(),
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        );
        assert_eq!(general.read_only_layout(), vk::ImageLayout::GENERAL);
    }

    #[test]
    fn stock_sampler_index() {
        for (index, &sampler) in StockSampler::ALL.iter().enumerate() {
            assert_eq!(StockSampler::from_index(index as u8), Some(sampler));
        }

        assert_eq!(StockSampler::from_index(StockSampler::COUNT as u8), None);
    }
}
