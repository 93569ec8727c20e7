//! Watchpoints: guest expressions re-evaluated after every retired
//! instruction.
//!
//! A fixed slab of slots with two index lists, `free` and `active`. A
//! watchpoint's number is its slab index and never changes. Activation is
//! LIFO, matching the order the active list is reported in.

use intel_386::Cpu386;

use crate::expr;

/// Slab capacity.
pub const POOL_SIZE: usize = 32;

#[derive(Debug, Default, Clone)]
struct Slot {
    expr: String,
    old_value: u32,
}

/// The watchpoint pool.
pub struct WatchpointPool {
    slots: Vec<Slot>,
    /// Free slab indices; the next allocation takes the lowest.
    free: Vec<usize>,
    /// Active slab indices, most recently added first.
    active: Vec<usize>,
}

impl Default for WatchpointPool {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchpointPool {
    /// Create a pool with every slot free.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![Slot::default(); POOL_SIZE],
            free: (0..POOL_SIZE).rev().collect(),
            active: Vec::new(),
        }
    }

    /// Allocate a watchpoint seeded with the expression's current value.
    /// Returns its number, or `None` when the pool is exhausted.
    pub fn add(&mut self, expr: String, value: u32) -> Option<usize> {
        let no = self.free.pop()?;
        self.slots[no] = Slot {
            expr,
            old_value: value,
        };
        self.active.insert(0, no);
        Some(no)
    }

    /// Delete a watchpoint by number. Returns false if it is not active.
    pub fn remove(&mut self, no: usize) -> bool {
        let Some(pos) = self.active.iter().position(|&i| i == no) else {
            return false;
        };
        self.active.remove(pos);
        self.slots[no] = Slot::default();
        self.free.push(no);
        true
    }

    /// True when nothing is being watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Active watchpoints as (number, expression), most recent first.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.active
            .iter()
            .map(|&no| (no, self.slots[no].expr.as_str()))
    }

    /// Re-evaluate every active watchpoint against the CPU state. Prints a
    /// diagnostic for each changed value and returns true if any changed,
    /// so the execution loop can pause. Expressions that fail to evaluate
    /// are skipped silently.
    pub fn check(&mut self, cpu: &Cpu386) -> bool {
        let mut hit = false;
        for idx in 0..self.active.len() {
            let no = self.active[idx];
            let slot = &self.slots[no];
            let Ok(new_value) = expr::eval(&slot.expr, cpu) else {
                continue;
            };
            if new_value != slot.old_value {
                println!("Watchpoint {no}: {}", slot.expr);
                println!("Old value = {:#010x}", slot.old_value);
                println!("New value = {new_value:#010x}");
                println!("Stopped at {:#010x}", cpu.regs.eip);
                self.slots[no].old_value = new_value;
                hit = true;
            }
        }
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intel_386::registers::EAX;

    #[test]
    fn numbers_are_stable_slab_indices() {
        let mut pool = WatchpointPool::new();
        let a = pool.add("1".into(), 1).unwrap();
        let b = pool.add("2".into(), 2).unwrap();
        let c = pool.add("3".into(), 3).unwrap();
        assert_eq!((a, b, c), (0, 1, 2));

        assert!(pool.remove(b));
        // The freed number is reused before fresh ones.
        assert_eq!(pool.add("4".into(), 4), Some(1));
    }

    #[test]
    fn active_list_is_lifo() {
        let mut pool = WatchpointPool::new();
        pool.add("1".into(), 0).unwrap();
        pool.add("2".into(), 0).unwrap();
        let order: Vec<usize> = pool.iter().map(|(no, _)| no).collect();
        assert_eq!(order, [1, 0]);
    }

    #[test]
    fn pool_exhaustion_and_unknown_deletes() {
        let mut pool = WatchpointPool::new();
        for i in 0..POOL_SIZE {
            assert_eq!(pool.add(format!("{i}"), 0), Some(i));
        }
        assert_eq!(pool.add("overflow".into(), 0), None);
        assert!(!pool.remove(99));

        assert!(pool.remove(7));
        assert_eq!(pool.add("again".into(), 0), Some(7));
    }

    #[test]
    fn check_reports_changes_and_updates_the_seed() {
        let mut cpu = Cpu386::new();
        let mut pool = WatchpointPool::new();
        pool.add("$eax".into(), 0).unwrap();

        assert!(!pool.check(&cpu), "unchanged value: no hit");

        cpu.regs.set_reg32(EAX, 0x42);
        assert!(pool.check(&cpu), "changed value trips the watchpoint");
        assert!(!pool.check(&cpu), "seed updated: no re-trigger");
    }

    #[test]
    fn failing_expressions_are_silent() {
        let cpu = Cpu386::new();
        let mut pool = WatchpointPool::new();
        // Divides by zero every evaluation; never trips, never errors out.
        pool.add("1/0".into(), 0).unwrap();
        assert!(!pool.check(&cpu));
    }
}
