//! The machine: CPU, memory and watchpoints under one execution loop.

use emu_core::Cpu;
use intel_386::Cpu386;
use intel_386::registers::EAX;

use crate::memory::MemoryBus;
use crate::watchpoint::WatchpointPool;

/// Whether the guest program is still runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Stepping is allowed.
    Running,
    /// The CPU halted; only a fresh image makes it run again.
    Ended,
}

/// A complete emulated machine.
pub struct Machine {
    pub cpu: Cpu386,
    pub mem: MemoryBus,
    pub watchpoints: WatchpointPool,
    state: RunState,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    /// A machine with the default 128 MiB of DRAM.
    #[must_use]
    pub fn new() -> Self {
        Self::with_memory(MemoryBus::new())
    }

    /// A machine over a caller-provided memory (tests use small DRAMs).
    #[must_use]
    pub fn with_memory(mem: MemoryBus) -> Self {
        Self {
            cpu: Cpu386::new(),
            mem,
            watchpoints: WatchpointPool::new(),
            state: RunState::Running,
        }
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute up to `n` instructions.
    ///
    /// Stops early when a watchpoint value changes (CPU state rests at the
    /// retirement boundary of the instruction that changed it) or when the
    /// CPU halts. Stepping an ended program just prints a notice.
    pub fn cpu_exec(&mut self, n: u64) {
        if self.state == RunState::Ended {
            println!("The program has ended. Load it again to restart.");
            return;
        }

        for _ in 0..n {
            self.cpu.step(&mut self.mem);

            let hit = !self.watchpoints.is_empty() && self.watchpoints.check(&self.cpu);

            if self.cpu.is_halted() {
                self.state = RunState::Ended;
                log::debug!("{} instructions retired", self.cpu.retired());
                println!(
                    "Program halted at {:#010x}, exit status {}",
                    self.cpu.regs.eip,
                    self.cpu.regs.reg32(EAX)
                );
                break;
            }

            if hit {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr;

    fn machine_with_program(program: &[u8]) -> Machine {
        let mut machine = Machine::with_memory(MemoryBus::with_size(1024 * 1024));
        machine.mem.load_image(0x100, program);
        machine.cpu.regs.eip = 0x100;
        machine.cpu.regs.set_reg32(intel_386::registers::ESP, 0x8000);
        machine
    }

    #[test]
    fn halt_ends_the_run() {
        // mov eax, 7; hlt; (unreached) inc eax
        let mut machine = machine_with_program(&[0xB8, 0x07, 0x00, 0x00, 0x00, 0xF4, 0x40]);
        machine.cpu_exec(u64::MAX);
        assert_eq!(machine.state(), RunState::Ended);
        assert_eq!(machine.cpu.regs.reg32(EAX), 7);

        // Stepping an ended program is a no-op.
        machine.cpu_exec(5);
        assert_eq!(machine.cpu.regs.reg32(EAX), 7);
    }

    #[test]
    fn watchpoint_hit_pauses_the_loop() {
        // nop; nop; mov eax, 0x42; nop; hlt
        let mut machine =
            machine_with_program(&[0x90, 0x90, 0xB8, 0x42, 0x00, 0x00, 0x00, 0x90, 0xF4]);
        let seed = expr::eval("$eax == 0x42", &machine.cpu).unwrap();
        machine.watchpoints.add("$eax == 0x42".into(), seed);

        machine.cpu_exec(u64::MAX);
        // Stopped right after the mov retired, before the trailing nop.
        assert_eq!(machine.cpu.regs.eip, 0x107);
        assert_eq!(machine.state(), RunState::Running);

        // No further change: continuing runs to the hlt.
        machine.cpu_exec(u64::MAX);
        assert_eq!(machine.state(), RunState::Ended);
    }

    #[test]
    fn si_steps_exactly_n_instructions() {
        let mut machine = machine_with_program(&[0x40, 0x40, 0x40, 0x40]); // inc eax x4
        machine.cpu_exec(3);
        assert_eq!(machine.cpu.regs.reg32(EAX), 3);
        assert_eq!(machine.cpu.regs.eip, 0x103);
    }
}
