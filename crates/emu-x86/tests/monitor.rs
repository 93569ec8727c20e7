//! End-to-end tests: programs running on the full machine (fetch and data
//! through the cache hierarchy) driven by monitor commands.

use emu_core::Bus;
use emu_x86::machine::{Machine, RunState};
use emu_x86::memory::MemoryBus;
use emu_x86::monitor::{CmdResult, Monitor};
use intel_386::registers::{EAX, EBX, ESP};

const CODE: u32 = 0x10_0000;

fn machine_with_program(program: &[u8]) -> Machine {
    let mut machine = Machine::with_memory(MemoryBus::with_size(4 * 1024 * 1024));
    machine.mem.load_image(CODE, program);
    machine.cpu.regs.eip = CODE;
    machine.cpu.regs.set_reg32(ESP, 0x2_0000);
    machine
}

#[test]
fn call_ret_scenario_through_the_cache() {
    // call +5; nop x5; ret; hlt
    let mut machine = machine_with_program(&[
        0xE8, 0x05, 0x00, 0x00, 0x00, // call
        0x90, 0x90, 0x90, 0x90, 0x90, // skipped pad
        0xC3, // ret target of the call
        0xF4, // unreachable
    ]);
    machine.cpu_exec(1);
    assert_eq!(machine.cpu.regs.eip, CODE + 10);
    // return address on the stack, little-endian, through the cache
    assert_eq!(machine.mem.read(0x2_0000 - 4, 4), CODE + 5);

    machine.cpu_exec(1);
    assert_eq!(machine.cpu.regs.eip, CODE + 5);
    assert_eq!(machine.cpu.regs.reg32(ESP), 0x2_0000);
}

#[test]
fn guest_stores_land_in_cached_memory() {
    // mov ebx, 0x3004; mov dword [ebx], 0xCAFE; mov eax, [ebx]; hlt
    let mut machine = machine_with_program(&[
        0xBB, 0x04, 0x30, 0x00, 0x00, // mov ebx, 0x3004
        0xC7, 0x03, 0xFE, 0xCA, 0x00, 0x00, // mov dword [ebx], 0xCAFE
        0x8B, 0x03, // mov eax, [ebx]
        0xF4, // hlt
    ]);
    machine.cpu_exec(u64::MAX);
    assert_eq!(machine.state(), RunState::Ended);
    assert_eq!(machine.cpu.regs.reg32(EAX), 0xCAFE);
    assert_eq!(machine.mem.read(0x3004, 4), 0xCAFE);
}

#[test]
fn monitor_si_and_watchpoint_flow() {
    // inc eax x3; mov eax, 0x42; nop; hlt
    let mut monitor = Monitor::new(machine_with_program(&[
        0x40, 0x40, 0x40, // inc eax
        0xB8, 0x42, 0x00, 0x00, 0x00, // mov eax, 0x42
        0x90, // nop
        0xF4, // hlt
    ]));

    assert_eq!(monitor.dispatch("si 2"), CmdResult::Continue);
    assert_eq!(monitor.machine_mut().cpu.regs.reg32(EAX), 2);

    // Watch for the transition to 0x42, then continue.
    monitor.dispatch("w $eax == 0x42");
    monitor.dispatch("c");
    let machine = monitor.machine_mut();
    assert_eq!(machine.cpu.regs.reg32(EAX), 0x42);
    assert_eq!(machine.cpu.regs.eip, CODE + 8, "paused after the mov");
    assert_eq!(machine.state(), RunState::Running);

    // Delete the watchpoint; the program then runs to the halt.
    monitor.dispatch("d 0");
    monitor.dispatch("c");
    assert_eq!(monitor.machine_mut().state(), RunState::Ended);
}

#[test]
fn watchpoint_on_a_plain_register_reports_each_change() {
    // inc eax; inc eax; hlt
    let mut monitor = Monitor::new(machine_with_program(&[0x40, 0x40, 0xF4]));
    monitor.dispatch("w $eax");

    monitor.dispatch("c");
    assert_eq!(monitor.machine_mut().cpu.regs.reg32(EAX), 1, "first change");
    monitor.dispatch("c");
    assert_eq!(monitor.machine_mut().cpu.regs.reg32(EAX), 2, "second change");
    monitor.dispatch("c");
    assert_eq!(monitor.machine_mut().state(), RunState::Ended);
}

#[test]
fn quit_and_unknown_commands() {
    let mut monitor = Monitor::new(machine_with_program(&[0xF4]));
    assert_eq!(monitor.dispatch("q"), CmdResult::Quit);
    assert_eq!(monitor.dispatch("bogus"), CmdResult::Continue);
    assert_eq!(monitor.dispatch(""), CmdResult::Continue);
    assert_eq!(monitor.dispatch("si nope"), CmdResult::Continue);
    assert_eq!(monitor.dispatch("x 4"), CmdResult::Continue);
    assert_eq!(monitor.dispatch("p"), CmdResult::Continue);
    assert_eq!(monitor.dispatch("d 5"), CmdResult::Continue);
    assert_eq!(monitor.dispatch("help"), CmdResult::Continue);
    assert_eq!(monitor.dispatch("info r"), CmdResult::Continue);
    assert_eq!(monitor.dispatch("info w"), CmdResult::Continue);
}

#[test]
fn rejected_watchpoint_expressions_do_not_allocate() {
    let mut monitor = Monitor::new(machine_with_program(&[0xF4]));
    monitor.dispatch("w $nosuchreg");
    assert!(monitor.machine_mut().watchpoints.is_empty());
}

#[test]
fn cached_byte_survives_an_l1_sweep() {
    let mut machine = machine_with_program(&[0xF4]);
    machine.mem.write(0x10_0000 + 0x8000, 1, 0xAB);
    assert_eq!(machine.mem.read(0x10_0000 + 0x8000, 1), 0xAB);

    // Read a span larger than L1 to force eviction of the line.
    for addr in (0x20_0000..0x21_0400).step_by(64) {
        let _ = machine.mem.read(addr, 1);
    }
    assert_eq!(machine.mem.read(0x10_0000 + 0x8000, 1), 0xAB, "served by L2");
}

#[test]
fn sixteen_bit_programs_use_the_word_views() {
    // 66 b8 34 12: mov ax, 0x1234; 66 01 c3: add bx, ax; hlt
    let mut machine = machine_with_program(&[
        0x66, 0xB8, 0x34, 0x12, // mov ax, 0x1234
        0x66, 0x01, 0xC3, // add bx, ax
        0xF4,
    ]);
    machine.cpu.regs.set_reg32(EBX, 0xFFFF_0001);
    machine.cpu_exec(u64::MAX);
    assert_eq!(machine.cpu.regs.reg32(EBX), 0xFFFF_1235, "high word intact");
}
