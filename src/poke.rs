//! The one place the bridge writes to memory it does not own.

/// Store `value` at `base + offset` with a single volatile byte write.
/// No bounds, alignment or mapping checks are made.
///
/// # Safety
///
/// `base + offset` must be a writable byte for the duration of the call and
/// no live Rust reference may alias it.
pub unsafe fn write_byte(base: u64, offset: i32, value: u8) {
    let target = (base as usize as *mut u8).wrapping_offset(offset as isize);
    unsafe { target.write_volatile(value) };
}
