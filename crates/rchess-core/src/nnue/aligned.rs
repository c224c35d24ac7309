//! 64バイト整列メモリ
//!
//! SIMD ロードとキャッシュライン境界のために、重みテーブルと
//! アキュムレータは64バイト整列で確保する。

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::marker::PhantomData;
use std::ptr::NonNull;

/// キャッシュライン整列
pub const CACHE_LINE_SIZE: usize = 64;

/// スタック/静的配置用の64バイト整列ラッパ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct Aligned<T>(pub T);

impl<T> std::ops::Deref for Aligned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> std::ops::DerefMut for Aligned<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// 64バイト整列のヒープ配列
///
/// ゼロ初期化で確保し、以後は固定長スライスとして扱う。
/// 要素型はゼロビットパターンが有効な数値型に限る。
pub struct AlignedBox<T> {
    ptr: NonNull<T>,
    len: usize,
    _marker: PhantomData<T>,
}

/// ゼロビットパターンが有効値であることの印
///
/// # Safety
///
/// 全ビット0がその型の有効な値であること。
pub unsafe trait Pod: Copy {}

// SAFETY: 整数プリミティブはゼロビットで有効
unsafe impl Pod for i8 {}
// SAFETY: 同上
unsafe impl Pod for u8 {}
// SAFETY: 同上
unsafe impl Pod for i16 {}
// SAFETY: 同上
unsafe impl Pod for u16 {}
// SAFETY: 同上
unsafe impl Pod for i32 {}
// SAFETY: 同上
unsafe impl Pod for u32 {}

impl<T: Pod> AlignedBox<T> {
    /// ゼロ初期化で確保
    pub fn new_zeroed(len: usize) -> AlignedBox<T> {
        if len == 0 {
            return AlignedBox {
                ptr: NonNull::dangling(),
                len: 0,
                _marker: PhantomData,
            };
        }
        let layout = Self::layout(len);
        // SAFETY: layout のサイズは非ゼロ。T: Pod によりゼロ初期化は有効値
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw.cast::<T>()) else {
            handle_alloc_error(layout);
        };
        AlignedBox { ptr, len, _marker: PhantomData }
    }

    fn layout(len: usize) -> Layout {
        match Layout::from_size_align(len * std::mem::size_of::<T>(), CACHE_LINE_SIZE) {
            Ok(layout) => layout,
            Err(_) => alloc_overflow(),
        }
    }
}

impl<T> std::ops::Deref for AlignedBox<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        // SAFETY: ptr は len 要素の確保済み領域を指す
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> std::ops::DerefMut for AlignedBox<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: ptr は len 要素の確保済み領域を指し、&mut self で独占
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Pod> Clone for AlignedBox<T> {
    fn clone(&self) -> AlignedBox<T> {
        let mut new = AlignedBox::new_zeroed(self.len);
        new.copy_from_slice(self);
        new
    }
}

impl<T> Drop for AlignedBox<T> {
    fn drop(&mut self) {
        if self.len != 0 {
            let layout = match Layout::from_size_align(
                self.len * std::mem::size_of::<T>(),
                CACHE_LINE_SIZE,
            ) {
                Ok(layout) => layout,
                Err(_) => return,
            };
            // SAFETY: new_zeroed で同じ layout で確保した領域
            unsafe { dealloc(self.ptr.as_ptr().cast::<u8>(), layout) };
        }
    }
}

// SAFETY: 指す領域は AlignedBox が所有しており、T が Send/Sync なら共有可能
unsafe impl<T: Send> Send for AlignedBox<T> {}
// SAFETY: 同上
unsafe impl<T: Sync> Sync for AlignedBox<T> {}

impl<T: std::fmt::Debug> std::fmt::Debug for AlignedBox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBox").field("len", &self.len).finish()
    }
}

#[cold]
#[inline(never)]
fn alloc_overflow() -> ! {
    panic!("allocation size overflow");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_box_zeroed() {
        let b: AlignedBox<i16> = AlignedBox::new_zeroed(1000);
        assert_eq!(b.len(), 1000);
        assert!(b.iter().all(|&v| v == 0));
        assert_eq!(b.as_ptr() as usize % CACHE_LINE_SIZE, 0);
    }

    #[test]
    fn test_aligned_box_write_and_clone() {
        let mut b: AlignedBox<i32> = AlignedBox::new_zeroed(64);
        b[0] = 42;
        b[63] = -7;
        let c = b.clone();
        assert_eq!(c[0], 42);
        assert_eq!(c[63], -7);
        assert_eq!(c.as_ptr() as usize % CACHE_LINE_SIZE, 0);
    }

    #[test]
    fn test_aligned_box_empty() {
        let b: AlignedBox<u8> = AlignedBox::new_zeroed(0);
        assert!(b.is_empty());
    }

    #[test]
    fn test_aligned_wrapper() {
        let a = Aligned([1u8; 128]);
        assert_eq!(&raw const a.0 as usize % CACHE_LINE_SIZE, 0);
        assert_eq!(a[0], 1);
    }
}
