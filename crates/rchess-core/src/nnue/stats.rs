//! アキュムレータ更新の統計収集（`nnue-stats` フィーチャー）
//!
//! 差分更新と全計算の比率を計測するためのカウンタ。
//! 探索のチューニング時に refresh が多すぎないかを確認する用途で、
//! 通常ビルドにはコンパイルされない。

use std::sync::atomic::{AtomicU64, Ordering};

static FORWARD_UPDATES: AtomicU64 = AtomicU64::new(0);
static BACKWARD_UPDATES: AtomicU64 = AtomicU64::new(0);
static REFRESHES: AtomicU64 = AtomicU64::new(0);

#[inline]
pub fn record_forward_update() {
    FORWARD_UPDATES.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_backward_update() {
    BACKWARD_UPDATES.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_refresh() {
    REFRESHES.fetch_add(1, Ordering::Relaxed);
}

/// カウンタのスナップショット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub forward_updates: u64,
    pub backward_updates: u64,
    pub refreshes: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        forward_updates: FORWARD_UPDATES.load(Ordering::Relaxed),
        backward_updates: BACKWARD_UPDATES.load(Ordering::Relaxed),
        refreshes: REFRESHES.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    FORWARD_UPDATES.store(0, Ordering::Relaxed);
    BACKWARD_UPDATES.store(0, Ordering::Relaxed);
    REFRESHES.store(0, Ordering::Relaxed);
}
