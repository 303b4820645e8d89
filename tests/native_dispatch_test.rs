//! Native dispatch tests - builds objects from descriptors and drives them
//! only through their vtables, as foreign code would.
//!
//! Run with: cargo test --test native_dispatch_test -- --nocapture

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dyncom::client::ComPtr;
use dyncom::descriptor::Method;
use dyncom::error::Error;
use dyncom::guid::Guid;
use dyncom::hresult::HResult;
use dyncom::object::{ComObject, ObjectBase, ObjectPolicy, OverRelease};

const IID_CALC: Guid = Guid::from_u128(0x5b1d7a10_3e0c_4f4e_a1c2_77e0d2a4c901);

type CountFn = unsafe extern "system" fn(*mut c_void) -> u32;
type AddFn = unsafe extern "system" fn(*mut c_void, i32, i32, *mut i32) -> HResult;
type StoreFn = unsafe extern "system" fn(*mut c_void, u64, u8) -> HResult;

unsafe fn slot<T: Copy>(this: *mut c_void, index: usize) -> T {
    let vtbl = *(this as *const *const *const c_void);
    let entry = *vtbl.add(index);
    std::mem::transmute_copy(&entry)
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// `Add(a, b, *sum)` and `Store(value, tag)` over a shared accumulator.
fn calculator(policy: ObjectPolicy, stored: &Arc<AtomicU64>, dropped: &Arc<AtomicBool>) -> ComObject {
    let stored = Arc::clone(stored);
    let flag = DropFlag(Arc::clone(dropped));
    let base = ObjectBase::new("Calculator", [IID_CALC], policy);
    ComObject::build(
        base,
        [
            Method::new("Add", "void *This, int a, int b, int *sum", move |call| {
                let _ = &flag;
                let out = call.pointer(2)? as *mut i32;
                if out.is_null() {
                    return Err(Error::NullPointer("sum"));
                }
                let sum = call.i32(0)?.checked_add(call.i32(1)?).ok_or(Error::Argument {
                    index: 1,
                    reason: "overflow".into(),
                })?;
                unsafe { *out = sum };
                Ok(HResult::S_OK)
            }),
            Method::new("Store", "void *This, unsigned long long value, unsigned char tag", move |call| {
                let tag = match call.arg(1)? {
                    dyncom::descriptor::Arg::U8(tag) => tag,
                    other => panic!("unexpected {other:?}"),
                };
                stored.store(call.u64(0)? ^ u64::from(tag), Ordering::SeqCst);
                Ok(())
            }),
        ],
    )
    .expect("calculator descriptor")
}

#[test]
fn test_scalar_and_pointer_arguments() {
    println!("\n=== Test: Scalar And Pointer Arguments ===");

    let stored = Arc::new(AtomicU64::new(0));
    let dropped = Arc::new(AtomicBool::new(false));
    let object = calculator(ObjectPolicy::destroy_at_zero(), &stored, &dropped);
    let ptr = unsafe { ComPtr::from_raw(object.into_raw()) }.unwrap();

    unsafe {
        let this = ptr.as_ptr();
        let add: AddFn = slot(this, 3);
        let mut sum = 0i32;
        assert_eq!(add(this, 40, 2, &mut sum), HResult::S_OK);
        assert_eq!(sum, 42);
        assert_eq!(add(this, -7, -8, &mut sum), HResult::S_OK);
        assert_eq!(sum, -15);
        assert_eq!(add(this, i32::MAX, 1, &mut sum), HResult::E_INVALIDARG);
        assert_eq!(add(this, 1, 1, std::ptr::null_mut()), HResult::E_POINTER);

        let store: StoreFn = slot(this, 4);
        assert_eq!(store(this, 0xffff_0000_0000_0000, 0x0f), HResult::S_OK);
    }
    assert_eq!(stored.load(Ordering::SeqCst), 0xffff_0000_0000_000f);
    println!("  [OK] Arguments decoded per declared type");

    drop(ptr);
    assert!(dropped.load(Ordering::SeqCst));
    println!("  [OK] Handlers dropped when the count reached zero");
}

#[test]
fn test_destroy_at_zero_waits_for_last_reference() {
    println!("\n=== Test: Destroy At Zero ===");

    let stored = Arc::new(AtomicU64::new(0));
    let dropped = Arc::new(AtomicBool::new(false));
    let object = calculator(ObjectPolicy::destroy_at_zero(), &stored, &dropped);
    let first = unsafe { ComPtr::from_raw(object.into_raw()) }.unwrap();
    let second = first.query_interface(&IID_CALC).unwrap();
    let third = second.clone();

    drop(first);
    drop(second);
    assert!(!dropped.load(Ordering::SeqCst));
    drop(third);
    assert!(dropped.load(Ordering::SeqCst));
}

#[test]
fn test_process_lifetime_survives_zero() {
    println!("\n=== Test: Process Lifetime ===");

    let stored = Arc::new(AtomicU64::new(0));
    let dropped = Arc::new(AtomicBool::new(false));
    let object = calculator(ObjectPolicy::default(), &stored, &dropped);
    let this = object.into_raw();

    unsafe {
        let release: CountFn = slot(this, 2);
        assert_eq!(release(this), 0);
        assert!(!dropped.load(Ordering::SeqCst));

        // Slots still answer after the count reached zero.
        let add: AddFn = slot(this, 3);
        let mut sum = 0;
        assert_eq!(add(this, 2, 3, &mut sum), HResult::S_OK);
        assert_eq!(sum, 5);

        // Over-release traps: the count stays at zero.
        assert_eq!(release(this), 0);
        let add_ref: CountFn = slot(this, 1);
        assert_eq!(add_ref(this), 1);
        assert_eq!(release(this), 0);

        drop(dyncom::handle::ObjectHandle::from_raw(this));
    }
    assert!(dropped.load(Ordering::SeqCst));
}

#[test]
fn test_saturating_over_release() {
    println!("\n=== Test: Saturating Over-Release ===");

    let policy = ObjectPolicy {
        over_release: OverRelease::Saturate,
        ..ObjectPolicy::default()
    };
    let base = ObjectBase::new("Saturating", [], policy);
    let object = ComObject::build(Arc::clone(&base), []).unwrap();
    let this = object.into_raw();

    unsafe {
        let release: CountFn = slot(this, 2);
        for _ in 0..3 {
            assert_eq!(release(this), 0);
        }
        assert_eq!(base.count(), 0);
        drop(dyncom::handle::ObjectHandle::from_raw(this));
    }
}

#[test]
fn test_guid_text_forms() {
    println!("\n=== Test: GUID Text Forms ===");

    let canonical = "6531d857-c22f-4add-b2d5-e9785e39fc46";
    for text in [
        canonical,
        "6531D857-C22F-4ADD-B2D5-E9785E39FC46",
        "{6531d857-c22f-4add-b2d5-e9785e39fc46}",
        "6531d857c22f4addb2d5e9785e39fc46",
    ] {
        let guid: Guid = text.parse().unwrap();
        assert_eq!(guid.to_string(), canonical, "{text}");
    }

    for bad in ["", "6531d857", "6531d857-c22f-4add-b2d5-e9785e39fc4g", "6531d857-c22f-4add-b2d5-e9785e39fc46aa"] {
        assert!(matches!(Guid::parse(bad), Err(Error::Format { .. })), "{bad}");
    }
}
