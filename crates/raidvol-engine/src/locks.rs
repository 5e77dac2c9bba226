//! Volume-wide locks
//!
//! Lock order, outermost first:
//!
//! ```text
//! repair -> rebuild gate -> target disk health -> other disk health -> row
//! ```
//!
//! Writers share the rebuild gate; a rebuild holds it exclusively so no data
//! or parity block changes underneath it. Row locks are striped over the
//! physical block index and serialize the read-modify-write of a parity row.

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default number of row lock stripes
pub const DEFAULT_STRIPE_LOCKS: usize = 64;

/// Repair mutex, rebuild gate and striped row locks of one volume
pub struct VolumeLocks {
    repair: Mutex<()>,
    rebuild: RwLock<()>,
    rows: Vec<Mutex<()>>,
}

impl VolumeLocks {
    /// Create the locks with `stripes` row lock stripes
    ///
    /// Configuration rejects zero stripes; a zero here still yields one
    /// stripe so row lookups never divide by zero.
    pub fn new(stripes: usize) -> Self {
        Self {
            repair: Mutex::new(()),
            rebuild: RwLock::new(()),
            rows: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Serialize repairs and whole-volume administration
    pub fn repair(&self) -> MutexGuard<'_, ()> {
        self.repair.lock()
    }

    /// Shared access taken by every data write
    pub fn write_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.rebuild.read()
    }

    /// Exclusive access taken while a disk is rebuilt
    pub fn rebuild_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.rebuild.write()
    }

    /// Lock the parity row at physical `block`
    #[allow(clippy::cast_possible_truncation)]
    pub fn row(&self, block: u64) -> MutexGuard<'_, ()> {
        self.rows[(block % self.rows.len() as u64) as usize].lock()
    }

    /// Number of row lock stripes
    pub fn stripes(&self) -> usize {
        self.rows.len()
    }
}

impl Default for VolumeLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPE_LOCKS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripe_count() {
        assert_eq!(VolumeLocks::new(0).stripes(), 1);
        assert_eq!(VolumeLocks::default().stripes(), DEFAULT_STRIPE_LOCKS);
        assert_eq!(VolumeLocks::new(3).stripes(), 3);
    }

    #[test]
    fn test_rows_share_stripes() {
        let locks = VolumeLocks::new(4);
        let _row = locks.row(1);
        assert!(locks.rows[5 % 4].try_lock().is_none());
        assert!(locks.rows[2].try_lock().is_some());
    }

    #[test]
    fn test_rebuild_excludes_writers() {
        let locks = VolumeLocks::default();
        let gate = locks.rebuild_gate();
        assert!(locks.rebuild.try_read().is_none());
        drop(gate);

        let _w1 = locks.write_gate();
        let _w2 = locks.write_gate();
        assert!(locks.rebuild.try_write().is_none());
    }
}
