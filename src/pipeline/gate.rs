//! 懒加载闸门：每发现一个资源计数加一，超过阈值的资源延迟优化

use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct LazyLoadGate {
    admitted: AtomicU32,
    threshold: u32,
}

impl LazyLoadGate {
    pub fn new(threshold: u32) -> Self {
        Self {
            admitted: AtomicU32::new(0),
            threshold,
        }
    }

    /// 计数加一，返回新资源是否应当懒加载
    pub fn admit(&self) -> bool {
        let count = self.admitted.fetch_add(1, Ordering::AcqRel) + 1;
        count > self.threshold
    }

    /// 已计数的资源数
    pub fn admitted(&self) -> u32 {
        self.admitted.load(Ordering::Acquire)
    }
}
