//! Image view over a linear allocation
//!
//! On devices that can alias, the image shares the buffer's storage and no
//! copies are ever needed. Otherwise the image is a separate object and the
//! projection tracks which side holds the newest contents:
//!
//! - buffer → image before an image bind, only when the buffer is newer and
//!   the kernel does more than write the image
//! - image → buffer before the buffer is used again, only when the image is
//!   newer (a read-only image bind never makes it so)

use crate::domain::{AccessQualifier, ImageDims, ImageHandle, MemHandle};

/// Which representation holds the newest contents
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Buffer,
    Image,
    Both,
}

#[derive(Debug)]
pub struct ImageProjection {
    image: ImageHandle,
    dims: ImageDims,
    aliased: bool,
    /// Buffer created to wrap SVM memory, owned by the projection
    backing: Option<MemHandle>,
    last_access: AccessQualifier,
    fresh: Freshness,
}

impl ImageProjection {
    /// A new image starts empty, so the buffer is newer
    pub fn new(image: ImageHandle, dims: ImageDims, aliased: bool, backing: Option<MemHandle>) -> Self {
        Self {
            image,
            dims,
            aliased,
            backing,
            last_access: AccessQualifier::None,
            fresh: Freshness::Buffer,
        }
    }

    pub fn image(&self) -> ImageHandle {
        self.image
    }

    pub fn dims(&self) -> ImageDims {
        self.dims
    }

    pub fn is_aliased(&self) -> bool {
        self.aliased
    }

    pub fn backing(&self) -> Option<MemHandle> {
        self.backing
    }

    pub fn last_access(&self) -> AccessQualifier {
        self.last_access
    }

    pub fn freshness(&self) -> Freshness {
        self.fresh
    }

    /// Buffer contents must be copied in before binding with `access`
    pub fn needs_upload(&self, access: AccessQualifier) -> bool {
        !self.aliased && self.fresh == Freshness::Buffer && access != AccessQualifier::WriteOnly
    }

    /// Image contents must be copied back before the buffer is used
    pub fn needs_download(&self) -> bool {
        !self.aliased && self.fresh == Freshness::Image
    }

    /// Both sides hold the same contents after a copy
    pub fn record_synced(&mut self) {
        self.fresh = Freshness::Both;
    }

    pub fn record_image_bind(&mut self, access: AccessQualifier) {
        self.last_access = access;
        if access != AccessQualifier::ReadOnly {
            self.fresh = Freshness::Image;
        }
    }

    /// The buffer may have been written by the host or a kernel
    pub fn record_buffer_written(&mut self) {
        self.fresh = Freshness::Buffer;
    }
}
