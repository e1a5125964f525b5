use std::{
    ops::{Deref, DerefMut},
    ptr,
};

pub(crate) trait NullCheck {
    fn is_null(&self) -> bool;
    fn null() -> Self;
}

impl<T> NullCheck for *mut T {
    fn is_null(&self) -> bool {
        (*self as *const T).is_null()
    }
    fn null() -> Self {
        ptr::null_mut()
    }
}

/// Owner of a sqlite handle, `dealloc` runs on drop unless the handle is null.
#[derive(Debug)]
pub(crate) struct CBox<T: NullCheck> {
    pub(crate) ptr: T,
    dealloc: fn(T),
}

impl<T: NullCheck> CBox<T> {
    pub fn new(ptr: T, dealloc: fn(T)) -> Self {
        Self { ptr, dealloc }
    }

    /// Give up ownership, the box is left holding a null handle.
    pub fn take(&mut self) -> T {
        std::mem::replace(&mut self.ptr, T::null())
    }
}

impl<T: NullCheck> Drop for CBox<T> {
    fn drop(&mut self) {
        if !self.is_null() {
            (self.dealloc)(self.take());
        }
    }
}

impl<T: NullCheck> Deref for CBox<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.ptr
    }
}

impl<T: NullCheck> DerefMut for CBox<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ptr
    }
}

unsafe impl<T: NullCheck> Send for CBox<T> {}

#[cfg(test)]
mod tests {
    use crate::cbox::CBox;
    use std::{
        ptr,
        sync::atomic::{AtomicBool, Ordering},
    };

    #[test]
    fn cbox_raw_pointer() {
        static DESTROYED: AtomicBool = AtomicBool::new(false);
        let mut v = 123;
        let pointer: *mut i32 = &mut v;
        {
            let boxed = CBox::new(ptr::null_mut::<i32>(), |_| {
                DESTROYED.store(true, Ordering::Relaxed)
            });
            assert!(boxed.is_null());
        }
        assert!(!DESTROYED.load(Ordering::Relaxed));
        {
            let boxed = CBox::new(pointer, |_| DESTROYED.store(true, Ordering::Relaxed));
            assert_eq!(unsafe { **boxed }, 123);
            assert!(!DESTROYED.load(Ordering::Relaxed));
        }
        assert!(DESTROYED.load(Ordering::Relaxed));
        {
            let mut boxed = CBox::new(pointer, |_| panic!("released after take"));
            assert_eq!(boxed.take(), pointer);
        }
    }
}
