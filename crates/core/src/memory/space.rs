//! Configurable address space with deterministic access resolution.

#![allow(clippy::cast_possible_truncation, clippy::cast_lossless)]

use super::region::{DeviceBus, MemoryRegion, RegionKind};
use super::{
    is_word_aligned, read_word_le, write_word_le, AccessWidth, MemoryFault, Word,
    ADDRESS_SPACE_BYTES, WORD_BYTES,
};
use crate::fault::ConfigError;

/// Ordered set of non-overlapping memory regions.
///
/// Every access resolves to exactly one region or is classified unmapped.
/// Region configuration is an initialization-time operation performed by the
/// external loader; the simulator never reshapes the map while stepping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AddressSpace {
    regions: Vec<MemoryRegion>,
}

impl AddressSpace {
    /// Creates an empty address space.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Creates an address space with the whole 64 KiB mapped as one fully
    /// accessible RAM region, matching the original machine's flat memory.
    #[must_use]
    pub fn flat() -> Self {
        Self {
            regions: vec![MemoryRegion::ram(0, ADDRESS_SPACE_BYTES)],
        }
    }

    /// Maps a new region, keeping the set sorted by base address.
    ///
    /// # Errors
    ///
    /// Rejects empty, misaligned, out-of-range, and overlapping regions.
    pub fn map_region(&mut self, region: MemoryRegion) -> Result<(), ConfigError> {
        let base = region.base();
        let size = region.size();

        if size == 0 {
            return Err(ConfigError::EmptyRegion { base });
        }
        if !is_word_aligned(base) || size % WORD_BYTES != 0 {
            return Err(ConfigError::MisalignedRegion { base, size });
        }
        if region.limit() > ADDRESS_SPACE_BYTES {
            return Err(ConfigError::RegionOutOfRange { base, size });
        }
        let overlaps = self.regions.iter().any(|mapped| {
            (base as usize) < mapped.limit() && (mapped.base() as usize) < region.limit()
        });
        if overlaps {
            return Err(ConfigError::OverlappingRegion { base });
        }

        let slot = self
            .regions
            .partition_point(|mapped| mapped.base() < base);
        self.regions.insert(slot, region);
        Ok(())
    }

    /// Returns the mapped regions in ascending base order.
    #[must_use]
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    /// Resolves `addr` to its mapped region, if any.
    #[must_use]
    pub fn region_at(&self, addr: Word) -> Option<&MemoryRegion> {
        let slot = self
            .regions
            .partition_point(|mapped| mapped.base() <= addr);
        let candidate = self.regions.get(slot.checked_sub(1)?)?;
        candidate.contains(addr).then_some(candidate)
    }

    fn region_at_mut(&mut self, addr: Word) -> Option<&mut MemoryRegion> {
        let slot = self
            .regions
            .partition_point(|mapped| mapped.base() <= addr);
        let candidate = self.regions.get_mut(slot.checked_sub(1)?)?;
        candidate.contains(addr).then_some(candidate)
    }

    /// Loads `width` bytes from `addr`. Byte loads return the value in the
    /// low byte; word loads are little-endian.
    ///
    /// # Errors
    ///
    /// `AlignmentFault` for an unaligned word access, `AccessFault` for an
    /// unmapped address, a region without read permission, or a failing
    /// device handler.
    pub fn load(
        &self,
        bus: &mut dyn DeviceBus,
        addr: Word,
        width: AccessWidth,
    ) -> Result<Word, MemoryFault> {
        if width == AccessWidth::Word && !is_word_aligned(addr) {
            return Err(MemoryFault::unaligned(addr));
        }

        let region = self.region_at(addr).ok_or(MemoryFault::denied(addr))?;
        if !region.permissions().read {
            return Err(MemoryFault::denied(addr));
        }

        match region.kind() {
            RegionKind::Device => {
                let value = bus.read(addr, width).map_err(|_| MemoryFault::denied(addr))?;
                Ok(match width {
                    AccessWidth::Byte => value & 0x00FF,
                    AccessWidth::Word => value,
                })
            }
            RegionKind::Ram | RegionKind::Rom => {
                let offset = region.offset_of(addr);
                match width {
                    AccessWidth::Byte => Ok(Word::from(region.bytes()[offset])),
                    AccessWidth::Word => read_word_le(region.bytes(), offset)
                        .ok_or(MemoryFault::denied(addr)),
                }
            }
        }
    }

    /// Stores `width` bytes to `addr`. A failed store mutates nothing.
    ///
    /// # Errors
    ///
    /// `AlignmentFault` for an unaligned word access, `AccessFault` for an
    /// unmapped address, a region without write permission, or a failing
    /// device handler.
    pub fn store(
        &mut self,
        bus: &mut dyn DeviceBus,
        addr: Word,
        width: AccessWidth,
        value: Word,
    ) -> Result<(), MemoryFault> {
        if width == AccessWidth::Word && !is_word_aligned(addr) {
            return Err(MemoryFault::unaligned(addr));
        }

        let region = self.region_at_mut(addr).ok_or(MemoryFault::denied(addr))?;
        if !region.permissions().write {
            return Err(MemoryFault::denied(addr));
        }

        match region.kind() {
            RegionKind::Device => bus
                .write(addr, width, value)
                .map_err(|_| MemoryFault::denied(addr)),
            RegionKind::Ram | RegionKind::Rom => {
                let offset = region.offset_of(addr);
                match width {
                    AccessWidth::Byte => {
                        region.bytes_mut()[offset] = (value & 0x00FF) as u8;
                        Ok(())
                    }
                    AccessWidth::Word => {
                        if write_word_le(region.bytes_mut(), offset, value) {
                            Ok(())
                        } else {
                            Err(MemoryFault::denied(addr))
                        }
                    }
                }
            }
        }
    }

    /// Reads one instruction word at `addr` with execute permission.
    ///
    /// Instruction fetch never consults the device bus: device regions are
    /// not executable.
    ///
    /// # Errors
    ///
    /// `AlignmentFault` for an odd PC, `AccessFault` for unmapped,
    /// non-executable, or device-backed addresses.
    pub fn fetch(&self, addr: Word) -> Result<Word, MemoryFault> {
        if !is_word_aligned(addr) {
            return Err(MemoryFault::unaligned(addr));
        }

        let region = self.region_at(addr).ok_or(MemoryFault::denied(addr))?;
        if !region.permissions().execute || region.kind() == RegionKind::Device {
            return Err(MemoryFault::denied(addr));
        }

        read_word_le(region.bytes(), region.offset_of(addr)).ok_or(MemoryFault::denied(addr))
    }

    /// Returns whether `addr` can hold an instruction (mapped, executable,
    /// word-aligned, not device-backed). Used to validate trap vectors.
    #[must_use]
    pub fn is_executable(&self, addr: Word) -> bool {
        self.fetch(addr).is_ok()
    }

    /// Bulk-writes a loader image at `base`, bypassing permissions.
    ///
    /// The image must fall entirely inside one RAM or ROM region.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ImageOutOfBounds`] when the image is not backed by a
    /// single storage-backed region.
    pub fn write_image(&mut self, base: Word, image: &[u8]) -> Result<(), ConfigError> {
        let len = image.len();
        let out_of_bounds = ConfigError::ImageOutOfBounds { base, len };

        let region = self.region_at_mut(base).ok_or(out_of_bounds.clone())?;
        if region.kind() == RegionKind::Device {
            return Err(out_of_bounds);
        }

        let offset = region.offset_of(base);
        let end = offset.checked_add(len).ok_or(out_of_bounds.clone())?;
        if end > region.size() {
            return Err(out_of_bounds);
        }

        region.bytes_mut()[offset..end].copy_from_slice(image);
        Ok(())
    }

    /// Reads memory for inspection, without permission checks.
    ///
    /// `None` for unmapped or device-backed addresses and unaligned word
    /// reads.
    #[must_use]
    pub fn peek(&self, addr: Word, width: AccessWidth) -> Option<Word> {
        if width == AccessWidth::Word && !is_word_aligned(addr) {
            return None;
        }

        let region = self.region_at(addr)?;
        if region.kind() == RegionKind::Device {
            return None;
        }

        let offset = region.offset_of(addr);
        match width {
            AccessWidth::Byte => Some(Word::from(region.bytes()[offset])),
            AccessWidth::Word => read_word_le(region.bytes(), offset),
        }
    }
}
