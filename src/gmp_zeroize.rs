// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Wiping GMP-managed limb buffers.
//!
//! The crate's heaviest secrets — Paillier prime factors, φ(N), VSS
//! coefficients in [`BigNumber`](libpaillier::unknown_order::BigNumber)
//! form, MtA masks — live in limb buffers that GMP allocates, grows, and
//! discards on the C heap, outside the reach of the `zeroize` traits on
//! the Rust wrappers. GMP supports swapping its allocator
//! (<https://gmplib.org/manual/Custom-Allocation>), so this module
//! captures the stock functions once and replaces release and
//! reallocation with wiping variants: no limb buffer is handed back to
//! the heap with its contents intact.
//!
//! Installation is lazy: the Paillier key paths call
//! [`ensure_enabled`] before the first secret limbs exist, and
//! [`enable_zeroize`] is exported for callers that want coverage from
//! process start (e.g. before deserializing a stored
//! [`Config`](crate::keygen::Config) on another thread). Because the
//! wiping functions delegate allocation and the final release to the
//! stock allocator, buffers created before the swap remain safe to free
//! after it.

use gmp_mpfr_sys::gmp;
use std::{ffi::c_void, ptr, slice, sync::OnceLock};
use zeroize::Zeroize;

/// GMP's own allocation entry points, captured before the swap so the
/// wiping wrappers can delegate to them.
#[derive(Clone, Copy)]
struct StockAllocator {
    alloc: gmp::allocate_function,
    free: gmp::free_function,
}

static STOCK: OnceLock<StockAllocator> = OnceLock::new();

/// Install the wiping allocator hooks into GMP. Idempotent.
///
/// Runs automatically before the crate creates Paillier secrets; call it
/// directly to also cover big integers built earlier in the process.
pub fn enable_zeroize() {
    let _ = STOCK.get_or_init(|| {
        let mut alloc: gmp::allocate_function = None;
        let mut realloc: gmp::reallocate_function = None;
        let mut free: gmp::free_function = None;
        unsafe {
            // SAFETY: documented C API with no failure modes; the
            // pointers receive GMP's current function table.
            gmp::get_memory_functions(&mut alloc, &mut realloc, &mut free);
            // Allocation stays stock; only the paths where limbs leave a
            // buffer are replaced.
            gmp::set_memory_functions(None, Some(wiping_realloc), Some(wiping_free));
        }
        StockAllocator { alloc, free }
    });
}

/// Crate-internal alias making the lazy-installation call sites read as
/// the precondition they are.
pub(crate) fn ensure_enabled() {
    enable_zeroize();
}

fn stock() -> StockAllocator {
    // The wrappers can only run after `enable_zeroize` stored the table.
    *STOCK
        .get()
        .expect("GMP wiping hooks ran before installation")
}

/// Erase `size` bytes behind `ptr`.
///
/// SAFETY: `ptr` must point to a live allocation of at least `size`
/// bytes; GMP guarantees this for every pointer it passes to its
/// allocator hooks.
unsafe fn wipe(ptr: *mut c_void, size: usize) {
    slice::from_raw_parts_mut(ptr as *mut u8, size).zeroize();
}

extern "C" fn wiping_free(ptr: *mut c_void, size: usize) {
    unsafe {
        wipe(ptr, size);
        (stock().free).expect("GMP reported no free function")(ptr, size);
    }
}

extern "C" fn wiping_realloc(ptr: *mut c_void, old_size: usize, new_size: usize) -> *mut c_void {
    // Delegating to the stock realloc would let it discard a moved
    // buffer with the limbs intact, so the move is done by hand: fresh
    // buffer, copy, wipe-and-release the old one.
    unsafe {
        let fresh = (stock().alloc).expect("GMP reported no alloc function")(new_size);
        ptr::copy_nonoverlapping(ptr as *const u8, fresh as *mut u8, old_size.min(new_size));
        wiping_free(ptr, old_size);
        fresh
    }
}
