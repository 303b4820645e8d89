//! Provides the macros that stamp out vtable trampolines.
//!
//! A native caller invokes a slot with `this` plus a fixed list of argument
//! words and no way to say which slot it used. Each trampoline is therefore
//! instantiated once per `(arity, slot index)` pair: the arity fixes the
//! native signature, the const generic slot index tells the shared dispatcher
//! which handler to run.

/// Expands to an array holding `$thunk::<0>` through `$thunk::<31>`.
///
/// The length must match [`crate::vtable::MAX_SLOTS`].
macro_rules! slot_table {
    ($thunk:ident) => {
        slot_table!(@expand $thunk;
            0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
            16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31)
    };
    (@expand $thunk:ident; $($slot:literal)*) => {
        [$($thunk::<$slot>),*]
    };
}

/// Defines the trampoline for one arity and its per-slot table.
///
/// Every argument arrives as a pointer-sized word; the dispatcher decodes
/// each word according to the slot's declared signature.
///
/// # Examples
///
/// ```ignore
/// define_thunks!(thunk2, THUNKS_2, (a0, a1));
///
/// // THUNKS_2[5] is `thunk2::<5>`, an
/// // `unsafe extern "system" fn(*mut c_void, usize, usize) -> u32`
/// // that dispatches to slot 5 of whatever object it is called on.
/// ```
macro_rules! define_thunks {
    ($thunk:ident, $table:ident, ($($arg:ident),*)) => {
        unsafe extern "system" fn $thunk<const SLOT: usize>(
            this: *mut std::ffi::c_void
            $(, $arg: usize)*
        ) -> u32 {
            dispatch(this, SLOT, &[$($arg),*])
        }

        const $table: [unsafe extern "system" fn(*mut std::ffi::c_void $(, $arg: usize)*) -> u32; MAX_SLOTS] =
            slot_table!($thunk);
    };
}
