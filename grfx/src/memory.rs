//! Device memory glue: usage to gpu-allocator location, allocator errors, and host mappings.
//! Buffers and images of both backends are sub-allocated through `gpu_allocator`.

use crate::error::GrfxError;
use crate::types::MemoryUsage;
use gpu_allocator::{AllocationError, MemoryLocation};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

pub fn memory_location(usage: MemoryUsage) -> MemoryLocation {
    match usage {
        MemoryUsage::GpuOnly => MemoryLocation::GpuOnly,
        MemoryUsage::CpuOnly | MemoryUsage::CpuToGpu => MemoryLocation::CpuToGpu,
        MemoryUsage::GpuToCpu => MemoryLocation::GpuToCpu,
    }
}

pub(crate) fn allocation_error(error: AllocationError) -> GrfxError {
    log::error!("gpu-allocator: {}", error);
    match error {
        AllocationError::OutOfMemory => GrfxError::OutOfMemory,
        AllocationError::InvalidAllocationCreateDesc | AllocationError::InvalidAllocatorCreateDesc(_) => {
            GrfxError::InvalidCreateArgument
        }
        _ => GrfxError::AllocationFailed,
    }
}

/// Persistent host pointer of a mapped allocation.
#[derive(Debug)]
pub(crate) struct HostPointer {
    ptr: NonNull<u8>,
    len: usize,
}

// The pointer stays valid for the lifetime of the owning allocation and is only reached
// through the `Mutex` that holds it.
unsafe impl Send for HostPointer {}
unsafe impl Sync for HostPointer {}

impl HostPointer {
    /// # Safety
    /// `ptr` must address `len` writable bytes that outlive the returned value.
    pub(crate) unsafe fn new(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }
}

/// Locks a host pointer for mapped access. `None` marks memory the host cannot see.
pub(crate) fn map_host(pointer: &Mutex<Option<HostPointer>>) -> crate::error::Result<MappedMemory<'_>> {
    MutexGuard::try_map(pointer.lock(), |host| {
        host.as_mut().map(|host| unsafe { std::slice::from_raw_parts_mut(host.ptr.as_ptr(), host.len) })
    })
    .map(MappedMemory::new)
    .map_err(|_| {
        log::error!("memory is not host visible");
        GrfxError::Failed
    })
}

/// A mapped view of an allocation; the lock is released on drop.
pub struct MappedMemory<'a> {
    guard: MappedMutexGuard<'a, [u8]>,
}

impl<'a> MappedMemory<'a> {
    pub(crate) fn new(guard: MappedMutexGuard<'a, [u8]>) -> Self {
        Self { guard }
    }
}

impl Deref for MappedMemory<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard
    }
}

impl DerefMut for MappedMemory<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_visible_usages_land_in_mappable_heaps() {
        assert_eq!(memory_location(MemoryUsage::GpuOnly), MemoryLocation::GpuOnly);
        assert_eq!(memory_location(MemoryUsage::CpuOnly), MemoryLocation::CpuToGpu);
        assert_eq!(memory_location(MemoryUsage::CpuToGpu), MemoryLocation::CpuToGpu);
        assert_eq!(memory_location(MemoryUsage::GpuToCpu), MemoryLocation::GpuToCpu);
    }

    #[test]
    fn allocator_errors_keep_out_of_memory() {
        assert_eq!(allocation_error(AllocationError::OutOfMemory), GrfxError::OutOfMemory);
        assert_eq!(allocation_error(AllocationError::NoCompatibleMemoryTypeFound), GrfxError::AllocationFailed);
    }

    #[test]
    fn mapping_writes_through_to_the_pointer() {
        let mut storage = vec![0u8; 8];
        let host = unsafe { HostPointer::new(NonNull::new(storage.as_mut_ptr()).unwrap(), storage.len()) };
        let pointer = Mutex::new(Some(host));
        map_host(&pointer).unwrap()[2..4].copy_from_slice(&[7, 9]);
        drop(pointer);
        assert_eq!(storage, [0, 0, 7, 9, 0, 0, 0, 0]);
    }

    #[test]
    fn unmapped_memory_fails_to_map() {
        let pointer: Mutex<Option<HostPointer>> = Mutex::new(None);
        assert_eq!(map_host(&pointer).err(), Some(GrfxError::Failed));
    }
}
