//! emu-x86 binary: load an ELF32 image and hand control to the monitor.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use emu_x86::machine::Machine;
use emu_x86::monitor::Monitor;
use emu_x86::{loader, machine::RunState};

#[derive(Parser)]
#[command(name = "emu-x86", about = "User-space IA-32 subset emulator", version)]
struct Args {
    /// ELF32 i386 executable to load
    image: PathBuf,

    /// Run the program to completion instead of entering the monitor
    #[arg(short, long)]
    batch: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();

    let data = std::fs::read(&args.image)
        .with_context(|| format!("reading {}", args.image.display()))?;

    let mut machine = Machine::new();
    let entry = loader::load(&data, &mut machine.mem)
        .with_context(|| format!("loading {}", args.image.display()))?;
    machine.cpu.regs.eip = entry;
    log::info!("loaded {} ({} bytes)", args.image.display(), data.len());

    if args.batch {
        machine.cpu_exec(u64::MAX);
        let ok = machine.state() == RunState::Ended;
        return Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    let mut monitor = Monitor::new(machine);
    monitor.run().context("monitor terminal failure")?;
    Ok(ExitCode::SUCCESS)
}
